use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::RelationalConnection;
use crate::diagnostics::{DiagnosticEvent, TransactionEventData};
use crate::driver::DbTransaction;
use crate::error::RelationalDbError;
use crate::transaction::{RelationalTransaction, TransactionState};
use crate::types::{AmbientTransaction, ConnectionState, IsolationLevel};

impl RelationalConnection {
    /// Begin a transaction on the native connection, taking a lease for its lifetime.
    ///
    /// # Errors
    /// Returns `TransactionAlreadyStarted` if a transaction is current,
    /// `ConflictingEnlistedTransaction` while enlisted in an ambient transaction, or the native
    /// failure (after releasing the lease).
    pub fn begin_transaction(
        &mut self,
        isolation_level: Option<IsolationLevel>,
    ) -> Result<&RelationalTransaction, RelationalDbError> {
        self.ensure_can_begin()?;
        self.open(false)?;

        let level = isolation_level.unwrap_or_default();
        let transaction_id = Uuid::new_v4();
        let starting = self.transaction_data(transaction_id, level, false, None);
        let logger = self.logger.clone();
        logger.emit(DiagnosticEvent::TransactionStarting(starting.clone()));
        let start = Instant::now();
        let began = self
            .db_connection()
            .and_then(|connection| connection.begin_transaction(level).map_err(Into::into));
        match began {
            Ok(native) => {
                let transaction = RelationalTransaction::new(native, transaction_id, true);
                logger.emit(DiagnosticEvent::TransactionStarted(self.transaction_data(
                    transaction_id,
                    transaction.isolation_level(),
                    false,
                    Some(start.elapsed()),
                )));
                Ok(&*self.current_transaction.insert(transaction))
            }
            Err(err) => {
                logger.emit(DiagnosticEvent::TransactionError {
                    transaction: starting,
                    action: "begin",
                    error: err.to_string(),
                });
                self.close()?;
                Err(err)
            }
        }
    }

    /// Async twin of [`RelationalConnection::begin_transaction`].
    ///
    /// # Errors
    /// See [`RelationalConnection::begin_transaction`]; cancellation surfaces as `Canceled`.
    pub async fn begin_transaction_async(
        &mut self,
        isolation_level: Option<IsolationLevel>,
        cancel: &CancellationToken,
    ) -> Result<&RelationalTransaction, RelationalDbError> {
        self.ensure_can_begin()?;
        self.open_async(cancel, false).await?;

        let level = isolation_level.unwrap_or_default();
        let transaction_id = Uuid::new_v4();
        let starting = self.transaction_data(transaction_id, level, true, None);
        let logger = self.logger.clone();
        logger.emit(DiagnosticEvent::TransactionStarting(starting.clone()));
        let start = Instant::now();
        let began = match self.db_connection() {
            Ok(connection) => connection
                .begin_transaction_async(level, cancel)
                .await
                .map_err(|err| RelationalDbError::from_driver(err, cancel.is_cancelled())),
            Err(err) => Err(err),
        };
        match began {
            Ok(native) => {
                let transaction = RelationalTransaction::new(native, transaction_id, true);
                logger.emit(DiagnosticEvent::TransactionStarted(self.transaction_data(
                    transaction_id,
                    transaction.isolation_level(),
                    true,
                    Some(start.elapsed()),
                )));
                Ok(&*self.current_transaction.insert(transaction))
            }
            Err(err) => {
                logger.emit(DiagnosticEvent::TransactionError {
                    transaction: starting,
                    action: "begin",
                    error: err.to_string(),
                });
                self.close_async().await?;
                Err(err)
            }
        }
    }

    /// Commit the current transaction and release its lease.
    ///
    /// # Errors
    /// Returns `NoActiveTransaction` without a current transaction, or the native failure, in
    /// which case the transaction stays current.
    pub fn commit_transaction(&mut self) -> Result<(), RelationalDbError> {
        let (native, data) = self.active_transaction(false)?;
        self.logger
            .emit(DiagnosticEvent::TransactionCommitting(data.clone()));
        let start = Instant::now();
        if let Err(err) = native.commit() {
            self.emit_transaction_error(data, "commit", &err.to_string());
            return Err(err.into());
        }
        self.logger.emit(DiagnosticEvent::TransactionCommitted(
            with_duration(data, start.elapsed()),
        ));
        self.complete_transaction(TransactionState::Committed);
        self.close().map(|_| ())
    }

    /// Async twin of [`RelationalConnection::commit_transaction`].
    ///
    /// # Errors
    /// See [`RelationalConnection::commit_transaction`].
    pub async fn commit_transaction_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), RelationalDbError> {
        let (native, data) = self.active_transaction(true)?;
        self.logger
            .emit(DiagnosticEvent::TransactionCommitting(data.clone()));
        let start = Instant::now();
        if let Err(err) = native.commit_async(cancel).await {
            self.emit_transaction_error(data, "commit", &err.to_string());
            return Err(RelationalDbError::from_driver(err, cancel.is_cancelled()));
        }
        self.logger.emit(DiagnosticEvent::TransactionCommitted(
            with_duration(data, start.elapsed()),
        ));
        self.complete_transaction(TransactionState::Committed);
        self.close_async().await.map(|_| ())
    }

    /// Roll back the current transaction and release its lease.
    ///
    /// # Errors
    /// Returns `NoActiveTransaction` without a current transaction, or the native failure, in
    /// which case the transaction stays current.
    pub fn rollback_transaction(&mut self) -> Result<(), RelationalDbError> {
        let (native, data) = self.active_transaction(false)?;
        self.logger
            .emit(DiagnosticEvent::TransactionRollingBack(data.clone()));
        let start = Instant::now();
        if let Err(err) = native.rollback() {
            self.emit_transaction_error(data, "rollback", &err.to_string());
            return Err(err.into());
        }
        self.logger.emit(DiagnosticEvent::TransactionRolledBack(
            with_duration(data, start.elapsed()),
        ));
        self.complete_transaction(TransactionState::RolledBack);
        self.close().map(|_| ())
    }

    /// Async twin of [`RelationalConnection::rollback_transaction`].
    ///
    /// # Errors
    /// See [`RelationalConnection::rollback_transaction`].
    pub async fn rollback_transaction_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), RelationalDbError> {
        let (native, data) = self.active_transaction(true)?;
        self.logger
            .emit(DiagnosticEvent::TransactionRollingBack(data.clone()));
        let start = Instant::now();
        if let Err(err) = native.rollback_async(cancel).await {
            self.emit_transaction_error(data, "rollback", &err.to_string());
            return Err(RelationalDbError::from_driver(err, cancel.is_cancelled()));
        }
        self.logger.emit(DiagnosticEvent::TransactionRolledBack(
            with_duration(data, start.elapsed()),
        ));
        self.complete_transaction(TransactionState::RolledBack);
        self.close_async().await.map(|_| ())
    }

    /// Adopt a transaction begun outside this wrapper, or with `None` let go of the current one.
    ///
    /// Adopting the handle that is already current is a no-op. Adopted handles are never
    /// disposed here; letting go releases the lease without touching the native handle.
    ///
    /// # Errors
    /// Returns `TransactionAlreadyStarted` if a different transaction is current and
    /// `ConflictingEnlistedTransaction` while enlisted in an ambient transaction.
    pub fn use_transaction(
        &mut self,
        transaction: Option<Arc<dyn DbTransaction>>,
        transaction_id: Option<Uuid>,
    ) -> Result<Option<&RelationalTransaction>, RelationalDbError> {
        let Some(native) = transaction else {
            if self.current_transaction.take().is_some() {
                self.close()?;
            }
            return Ok(None);
        };
        if self.is_current(&native)? {
            return Ok(self.current_transaction.as_ref());
        }
        self.open(false)?;
        Ok(Some(self.adopt(native, transaction_id, false)))
    }

    /// Async twin of [`RelationalConnection::use_transaction`].
    ///
    /// # Errors
    /// See [`RelationalConnection::use_transaction`].
    pub async fn use_transaction_async(
        &mut self,
        transaction: Option<Arc<dyn DbTransaction>>,
        transaction_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Option<&RelationalTransaction>, RelationalDbError> {
        let Some(native) = transaction else {
            if self.current_transaction.take().is_some() {
                self.close_async().await?;
            }
            return Ok(None);
        };
        if self.is_current(&native)? {
            return Ok(self.current_transaction.as_ref());
        }
        self.open_async(cancel, false).await?;
        Ok(Some(self.adopt(native, transaction_id, true)))
    }

    /// Dispose the current transaction, if any, and release its lease. The driver rolls back
    /// an uncompleted native transaction on dispose.
    ///
    /// # Errors
    /// Returns the native close failure when the released lease was the last one.
    pub fn dispose_transaction(&mut self) -> Result<(), RelationalDbError> {
        if self.dispose_current_transaction() {
            self.close()?;
        }
        Ok(())
    }

    /// Enlist in an ambient transaction, or leave it with `None`. A closed native connection
    /// enlists the next time it is physically opened.
    ///
    /// # Errors
    /// Returns `ConflictingAmbientTransaction` while a local transaction is current, or the
    /// driver's enlistment failure.
    pub fn enlist_transaction(
        &mut self,
        transaction: Option<AmbientTransaction>,
    ) -> Result<(), RelationalDbError> {
        if self.current_transaction.is_some() {
            return Err(RelationalDbError::ConflictingAmbientTransaction);
        }
        if let Some(connection) = self.connection.as_deref_mut() {
            if connection.state() == ConnectionState::Open {
                connection.enlist_transaction(transaction.as_ref())?;
            }
        }
        self.enlisted_transaction = transaction;
        Ok(())
    }

    /// Dispose the current transaction without touching the lease. Returns whether there
    /// was one.
    pub(super) fn dispose_current_transaction(&mut self) -> bool {
        let Some(mut transaction) = self.current_transaction.take() else {
            return false;
        };
        if transaction.state() != TransactionState::Disposed {
            let data = self.transaction_data(
                transaction.transaction_id(),
                transaction.isolation_level(),
                false,
                None,
            );
            transaction.dispose();
            self.logger.emit(DiagnosticEvent::TransactionDisposed(data));
        }
        true
    }

    fn ensure_can_begin(&self) -> Result<(), RelationalDbError> {
        if self.current_transaction.is_some() {
            return Err(RelationalDbError::TransactionAlreadyStarted);
        }
        if self.enlisted_transaction.is_some() {
            return Err(RelationalDbError::ConflictingEnlistedTransaction);
        }
        Ok(())
    }

    /// `Ok(true)` when `native` is already current; an error when another transaction is
    /// current or the connection is enlisted.
    fn is_current(&self, native: &Arc<dyn DbTransaction>) -> Result<bool, RelationalDbError> {
        match &self.current_transaction {
            Some(current) if current.wraps(native) => Ok(true),
            Some(_) => Err(RelationalDbError::TransactionAlreadyStarted),
            None if self.enlisted_transaction.is_some() => {
                Err(RelationalDbError::ConflictingEnlistedTransaction)
            }
            None => Ok(false),
        }
    }

    fn adopt(
        &mut self,
        native: Arc<dyn DbTransaction>,
        transaction_id: Option<Uuid>,
        is_async: bool,
    ) -> &RelationalTransaction {
        let transaction =
            RelationalTransaction::new(native, transaction_id.unwrap_or_else(Uuid::new_v4), false);
        self.logger
            .emit(DiagnosticEvent::TransactionUsed(self.transaction_data(
                transaction.transaction_id(),
                transaction.isolation_level(),
                is_async,
                None,
            )));
        self.current_transaction.insert(transaction)
    }

    fn active_transaction(
        &self,
        is_async: bool,
    ) -> Result<(Arc<dyn DbTransaction>, TransactionEventData), RelationalDbError> {
        let transaction = self
            .current_transaction
            .as_ref()
            .filter(|t| t.state() == TransactionState::Active)
            .ok_or(RelationalDbError::NoActiveTransaction)?;
        let data = self.transaction_data(
            transaction.transaction_id(),
            transaction.isolation_level(),
            is_async,
            None,
        );
        Ok((Arc::clone(transaction.db_transaction()), data))
    }

    fn complete_transaction(&mut self, state: TransactionState) {
        if let Some(mut transaction) = self.current_transaction.take() {
            transaction.set_state(state);
            transaction.dispose();
        }
    }

    fn emit_transaction_error(
        &self,
        data: TransactionEventData,
        action: &'static str,
        error: &str,
    ) {
        self.logger.emit(DiagnosticEvent::TransactionError {
            transaction: data,
            action,
            error: error.to_owned(),
        });
    }

    fn transaction_data(
        &self,
        transaction_id: Uuid,
        isolation_level: IsolationLevel,
        is_async: bool,
        duration: Option<Duration>,
    ) -> TransactionEventData {
        TransactionEventData {
            connection_id: self.id,
            transaction_id,
            isolation_level,
            is_async,
            duration,
        }
    }
}

fn with_duration(mut data: TransactionEventData, duration: Duration) -> TransactionEventData {
    data.duration = Some(duration);
    data
}
