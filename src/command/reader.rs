use std::fmt;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::executor::release_command;
use crate::connection::RelationalConnection;
use crate::diagnostics::{CommandEventData, DiagnosticEvent, DiagnosticsLogger};
use crate::driver::{DbCommand, DbDataReader};
use crate::error::RelationalDbError;
use crate::types::DbValue;

/// Rows produced by [`crate::RelationalCommand::execute_reader`].
///
/// Holds the native command, the native cursor and a connection lease until it is disposed;
/// dropping an undisposed reader disposes it.
pub struct RelationalDataReader<'c> {
    connection: &'c mut RelationalConnection,
    command: Option<Box<dyn DbCommand>>,
    reader: Option<Box<dyn DbDataReader>>,
    logger: DiagnosticsLogger,
    connection_id: Uuid,
    command_id: Uuid,
    read_count: u64,
    started: Instant,
    disposed: bool,
}

impl<'c> RelationalDataReader<'c> {
    pub(crate) fn new(
        connection: &'c mut RelationalConnection,
        command: Box<dyn DbCommand>,
        reader: Box<dyn DbDataReader>,
        data: &CommandEventData,
        logger: DiagnosticsLogger,
    ) -> Self {
        Self {
            connection,
            command: Some(command),
            reader: Some(reader),
            logger,
            connection_id: data.connection_id,
            command_id: data.command_id,
            read_count: 0,
            started: Instant::now(),
            disposed: false,
        }
    }

    #[must_use]
    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    /// The native cursor; `None` once disposed.
    #[must_use]
    pub fn db_data_reader(&self) -> Option<&dyn DbDataReader> {
        self.reader.as_deref()
    }

    /// The native command; `None` once disposed.
    #[must_use]
    pub fn db_command(&self) -> Option<&dyn DbCommand> {
        self.command.as_deref()
    }

    /// Rows read so far.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Advance to the next row.
    ///
    /// # Errors
    /// Returns `ReaderDisposed` after disposal, or the native read failure.
    pub fn read(&mut self) -> Result<bool, RelationalDbError> {
        let reader = self
            .reader
            .as_deref_mut()
            .ok_or(RelationalDbError::ReaderDisposed)?;
        let has_row = reader.read()?;
        if has_row {
            self.read_count += 1;
        }
        Ok(has_row)
    }

    /// Async twin of [`RelationalDataReader::read`].
    ///
    /// # Errors
    /// Returns `ReaderDisposed` after disposal, `Canceled` on cancellation, or the native read
    /// failure.
    pub async fn read_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<bool, RelationalDbError> {
        let reader = self
            .reader
            .as_deref_mut()
            .ok_or(RelationalDbError::ReaderDisposed)?;
        let has_row = reader
            .read_async(cancel)
            .await
            .map_err(|err| RelationalDbError::from_driver(err, cancel.is_cancelled()))?;
        if has_row {
            self.read_count += 1;
        }
        Ok(has_row)
    }

    /// Value of a column in the current row.
    ///
    /// # Errors
    /// Returns `ReaderDisposed` after disposal, or the native failure for a bad ordinal.
    pub fn get_value(&self, ordinal: usize) -> Result<DbValue, RelationalDbError> {
        let reader = self
            .reader
            .as_deref()
            .ok_or(RelationalDbError::ReaderDisposed)?;
        Ok(reader.get_value(ordinal)?)
    }

    /// # Errors
    /// Returns `ReaderDisposed` after disposal.
    pub fn field_count(&self) -> Result<usize, RelationalDbError> {
        self.reader
            .as_deref()
            .map(DbDataReader::field_count)
            .ok_or(RelationalDbError::ReaderDisposed)
    }

    /// # Errors
    /// Returns `ReaderDisposed` after disposal.
    pub fn column_name(&self, ordinal: usize) -> Result<Option<String>, RelationalDbError> {
        self.reader
            .as_deref()
            .map(|reader| reader.column_name(ordinal))
            .ok_or(RelationalDbError::ReaderDisposed)
    }

    /// Close and dispose the cursor, dispose the command and return the lease. Idempotent.
    ///
    /// # Errors
    /// Returns the native close failure when the returned lease was the last one.
    pub fn dispose(&mut self) -> Result<(), RelationalDbError> {
        if !self.release_native() {
            return Ok(());
        }
        self.connection.close()?;
        Ok(())
    }

    /// Async twin of [`RelationalDataReader::dispose`].
    ///
    /// # Errors
    /// See [`RelationalDataReader::dispose`].
    pub async fn dispose_async(&mut self) -> Result<(), RelationalDbError> {
        if !self.release_native() {
            return Ok(());
        }
        self.connection.close_async().await?;
        Ok(())
    }

    /// Release the cursor and command. Returns `false` when already disposed.
    fn release_native(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        if let Some(mut reader) = self.reader.take() {
            let records_affected = reader.records_affected();
            self.logger.emit(DiagnosticEvent::DataReaderClosing {
                connection_id: self.connection_id,
                command_id: self.command_id,
                read_count: self.read_count,
                records_affected,
            });
            reader.close();
            self.logger.emit(DiagnosticEvent::DataReaderDisposing {
                connection_id: self.connection_id,
                command_id: self.command_id,
                read_count: self.read_count,
                records_affected,
                duration: self.started.elapsed(),
            });
            reader.dispose();
        }
        if let Some(mut command) = self.command.take() {
            release_command(command.as_mut());
        }
        true
    }
}

impl fmt::Debug for RelationalDataReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalDataReader")
            .field("connection_id", &self.connection_id)
            .field("command_id", &self.command_id)
            .field("read_count", &self.read_count)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Drop for RelationalDataReader<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!("disposing a dropped data reader failed: {err}");
        }
    }
}
