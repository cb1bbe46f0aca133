use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::RelationalConnection;
use crate::diagnostics::DiagnosticEvent;
use crate::error::{DriverError, RelationalDbError};
use crate::types::ConnectionState;

impl RelationalConnection {
    /// Take a lease, physically opening the native connection if it is not open.
    ///
    /// Returns whether a physical open happened. With `errors_expected` a failure is logged at
    /// debug level instead of error.
    ///
    /// # Errors
    /// Returns the native open failure, or the errors of [`RelationalConnection::db_connection`].
    pub fn open(&mut self, errors_expected: bool) -> Result<bool, RelationalDbError> {
        let logger = self.logger.clone();
        let opening = self.connection_data(false, None);
        let connection = self.db_connection()?;
        if connection.state() == ConnectionState::Broken {
            connection.close()?;
        }

        let mut was_opened = false;
        if connection.state() != ConnectionState::Open {
            logger.emit(DiagnosticEvent::ConnectionOpening(opening.clone()));
            let start = Instant::now();
            if let Err(err) = connection.open() {
                logger.emit(DiagnosticEvent::ConnectionError {
                    connection: opening,
                    error: err.to_string(),
                    errors_expected,
                });
                return Err(err.into());
            }
            logger.emit(DiagnosticEvent::ConnectionOpened(
                self.connection_data(false, Some(start.elapsed())),
            ));
            was_opened = true;
        }

        if was_opened {
            self.after_physical_open()?;
        }
        self.open_count += 1;
        Ok(was_opened)
    }

    /// Async twin of [`RelationalConnection::open`]; `cancel` is handed to the driver.
    ///
    /// # Errors
    /// See [`RelationalConnection::open`]; cancellation surfaces as `Canceled`.
    pub async fn open_async(
        &mut self,
        cancel: &CancellationToken,
        errors_expected: bool,
    ) -> Result<bool, RelationalDbError> {
        let logger = self.logger.clone();
        let opening = self.connection_data(true, None);
        let connection = self.db_connection()?;
        if connection.state() == ConnectionState::Broken {
            connection.close_async().await?;
        }

        let mut was_opened = false;
        if connection.state() != ConnectionState::Open {
            logger.emit(DiagnosticEvent::ConnectionOpening(opening.clone()));
            let start = Instant::now();
            if let Err(err) = connection.open_async(cancel).await {
                logger.emit(DiagnosticEvent::ConnectionError {
                    connection: opening,
                    error: err.to_string(),
                    errors_expected,
                });
                return Err(RelationalDbError::from_driver(err, cancel.is_cancelled()));
            }
            logger.emit(DiagnosticEvent::ConnectionOpened(
                self.connection_data(true, Some(start.elapsed())),
            ));
            was_opened = true;
        }

        if was_opened {
            self.after_physical_open()?;
        }
        self.open_count += 1;
        Ok(was_opened)
    }

    /// Return a lease. The native connection is physically closed only when no lease is left
    /// and it was opened by this wrapper.
    ///
    /// Returns whether a physical close happened.
    ///
    /// # Errors
    /// Returns the native close failure.
    pub fn close(&mut self) -> Result<bool, RelationalDbError> {
        if !self.release_lease() {
            return Ok(false);
        }
        let logger = self.logger.clone();
        let closing = self.connection_data(false, None);
        let Some(connection) = self.connection.as_deref_mut() else {
            self.opened_internally = false;
            return Ok(false);
        };
        if connection.state() == ConnectionState::Closed {
            self.opened_internally = false;
            return Ok(false);
        }

        logger.emit(DiagnosticEvent::ConnectionClosing(closing.clone()));
        let start = Instant::now();
        if let Err(err) = connection.close() {
            logger.emit(DiagnosticEvent::ConnectionError {
                connection: closing,
                error: err.to_string(),
                errors_expected: false,
            });
            return Err(err.into());
        }
        self.opened_internally = false;
        logger.emit(DiagnosticEvent::ConnectionClosed(
            self.connection_data(false, Some(start.elapsed())),
        ));
        Ok(true)
    }

    /// Async twin of [`RelationalConnection::close`].
    ///
    /// # Errors
    /// Returns the native close failure.
    pub async fn close_async(&mut self) -> Result<bool, RelationalDbError> {
        if !self.release_lease() {
            return Ok(false);
        }
        let logger = self.logger.clone();
        let closing = self.connection_data(true, None);
        let Some(connection) = self.connection.as_deref_mut() else {
            self.opened_internally = false;
            return Ok(false);
        };
        if connection.state() == ConnectionState::Closed {
            self.opened_internally = false;
            return Ok(false);
        }

        logger.emit(DiagnosticEvent::ConnectionClosing(closing.clone()));
        let start = Instant::now();
        if let Err(err) = connection.close_async().await {
            logger.emit(DiagnosticEvent::ConnectionError {
                connection: closing,
                error: err.to_string(),
                errors_expected: false,
            });
            return Err(err.into());
        }
        self.opened_internally = false;
        logger.emit(DiagnosticEvent::ConnectionClosed(
            self.connection_data(true, Some(start.elapsed())),
        ));
        Ok(true)
    }

    /// Dispose the connection: the current transaction first, then an owned native handle.
    /// External handles are left as they are. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.logger.emit(DiagnosticEvent::ConnectionDisposing(
            self.connection_data(false, None),
        ));
        let start = Instant::now();
        self.dispose_current_transaction();
        self.enlisted_transaction = None;
        if self.connection_owned {
            if let Some(connection) = self.connection.as_deref_mut() {
                if connection.state() != ConnectionState::Closed {
                    log_close_failure(connection.close());
                }
            }
        }
        self.dispose_db_connection();
        self.disposed = true;
        self.logger.emit(DiagnosticEvent::ConnectionDisposed(
            self.connection_data(false, Some(start.elapsed())),
        ));
    }

    /// Async twin of [`RelationalConnection::dispose`].
    pub async fn dispose_async(&mut self) {
        if self.disposed {
            return;
        }
        self.logger.emit(DiagnosticEvent::ConnectionDisposing(
            self.connection_data(true, None),
        ));
        let start = Instant::now();
        self.dispose_current_transaction();
        self.enlisted_transaction = None;
        if self.connection_owned {
            if let Some(connection) = self.connection.as_deref_mut() {
                if connection.state() != ConnectionState::Closed {
                    log_close_failure(connection.close_async().await);
                }
            }
        }
        self.dispose_db_connection();
        self.disposed = true;
        self.logger.emit(DiagnosticEvent::ConnectionDisposed(
            self.connection_data(true, Some(start.elapsed())),
        ));
    }

    /// Decrement the lease count. Returns `true` when the caller should physically close.
    fn release_lease(&mut self) -> bool {
        if self.open_count > 0 {
            self.open_count -= 1;
        }
        self.open_count == 0 && self.opened_internally
    }

    /// A fresh physical connection cannot still be inside a transaction begun on a previous
    /// one, but it does rejoin the ambient transaction. The stale transaction's lease goes
    /// with it.
    fn after_physical_open(&mut self) -> Result<(), RelationalDbError> {
        self.opened_internally = true;
        if let Some(mut stale) = self.current_transaction.take() {
            stale.dispose();
            self.open_count = self.open_count.saturating_sub(1);
        }
        if let (Some(ambient), Some(connection)) = (
            self.enlisted_transaction.as_ref(),
            self.connection.as_deref_mut(),
        ) {
            connection.enlist_transaction(Some(ambient))?;
        }
        Ok(())
    }
}

fn log_close_failure(result: Result<(), DriverError>) {
    if let Err(err) = result {
        tracing::warn!("closing the connection during dispose failed: {err}");
    }
}
