//! Logical connection: lease counting over a native connection, plus the
//! transaction it is currently running in.

mod core;
mod tx;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::{RelationalOptions, validate_command_timeout};
use crate::diagnostics::{ConnectionEventData, DiagnosticsLogger};
use crate::driver::{DbConnection, DbProvider};
use crate::error::RelationalDbError;
use crate::parameters::TypeMappingSource;
use crate::transaction::RelationalTransaction;
use crate::types::AmbientTransaction;

/// A logical connection shared by the commands executed against it.
///
/// Every operation that needs the database takes a lease with [`RelationalConnection::open`]
/// and returns it with [`RelationalConnection::close`]; the native connection is only
/// physically closed once the last lease is returned, and only if this wrapper opened it.
///
/// ```rust
/// use relational_command::prelude::*;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), RelationalDbError> {
/// let options = RelationalOptions::builder()
///     .use_provider(Arc::new(SqliteProvider::new()))
///     .connection_string("Data Source=:memory:")
///     .build()?;
/// let mut connection = RelationalConnection::new(&options);
/// assert!(connection.open(false)?);
/// assert!(!connection.open(false)?);
/// assert!(!connection.close()?);
/// assert!(connection.close()?);
/// # Ok(())
/// # }
/// ```
pub struct RelationalConnection {
    id: Uuid,
    provider: Arc<dyn DbProvider>,
    type_mappings: Arc<dyn TypeMappingSource>,
    connection_string: Option<String>,
    connection: Option<Box<dyn DbConnection>>,
    connection_owned: bool,
    open_count: usize,
    opened_internally: bool,
    current_transaction: Option<RelationalTransaction>,
    enlisted_transaction: Option<AmbientTransaction>,
    command_timeout: Option<Duration>,
    max_batch_size: Option<usize>,
    logger: DiagnosticsLogger,
    disposed: bool,
}

impl RelationalConnection {
    /// Connection whose native handle is created lazily from the configured connection string.
    #[must_use]
    pub fn new(options: &RelationalOptions) -> Self {
        let provider = Arc::clone(options.provider());
        Self {
            id: Uuid::new_v4(),
            type_mappings: provider.type_mapping_source(),
            provider,
            connection_string: options.connection_string().map(str::to_owned),
            connection: None,
            connection_owned: true,
            open_count: 0,
            opened_internally: false,
            current_transaction: None,
            enlisted_transaction: None,
            command_timeout: options.command_timeout(),
            max_batch_size: options.max_batch_size(),
            logger: options.logger().clone(),
            disposed: false,
        }
    }

    /// Connection over a caller-supplied native handle. With `owned` set to `false` the handle
    /// is never disposed by this wrapper.
    #[must_use]
    pub fn with_connection(
        options: &RelationalOptions,
        connection: Box<dyn DbConnection>,
        owned: bool,
    ) -> Self {
        let mut relational = Self::new(options);
        relational.connection = Some(connection);
        relational.connection_owned = owned;
        relational
    }

    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.id
    }

    /// The explicit native handle's connection string when there is one, otherwise the
    /// configured string.
    #[must_use]
    pub fn connection_string(&self) -> Option<String> {
        match &self.connection {
            Some(connection) => Some(connection.connection_string()),
            None => self.connection_string.clone(),
        }
    }

    /// Replace the connection string.
    ///
    /// An owned native handle is disposed so the next access recreates it from the new string;
    /// an external handle has the string applied to it.
    ///
    /// # Errors
    /// Returns `CannotChangeWhenOpen` while leases are held.
    pub fn set_connection_string(
        &mut self,
        connection_string: Option<String>,
    ) -> Result<(), RelationalDbError> {
        if self.open_count > 0 {
            return Err(RelationalDbError::CannotChangeWhenOpen);
        }
        if self.connection_owned {
            self.dispose_db_connection();
        } else if let (Some(connection), Some(value)) =
            (self.connection.as_deref_mut(), connection_string.as_deref())
        {
            connection.set_connection_string(value);
        }
        self.connection_string = connection_string;
        Ok(())
    }

    /// The native connection, created through the provider on first access.
    ///
    /// # Errors
    /// Returns `NoConnectionOrConnectionString` when neither a handle nor a connection string
    /// is configured, `ConnectionDisposed` after disposal, or the provider's error.
    pub fn db_connection(
        &mut self,
    ) -> Result<&mut (dyn DbConnection + 'static), RelationalDbError> {
        if self.disposed {
            return Err(RelationalDbError::ConnectionDisposed);
        }
        if self.connection.is_none() {
            let connection_string = self
                .connection_string
                .as_deref()
                .ok_or(RelationalDbError::NoConnectionOrConnectionString)?;
            let connection = self.provider.create_connection(connection_string)?;
            self.connection = Some(connection);
            self.connection_owned = true;
        }
        self.connection
            .as_deref_mut()
            .ok_or(RelationalDbError::NoConnectionOrConnectionString)
    }

    /// Swap the native handle.
    ///
    /// # Errors
    /// Returns `CannotChangeWhenOpen` while leases are held.
    pub fn set_db_connection(
        &mut self,
        connection: Option<Box<dyn DbConnection>>,
        owned: bool,
    ) -> Result<(), RelationalDbError> {
        if self.open_count > 0 {
            return Err(RelationalDbError::CannotChangeWhenOpen);
        }
        self.dispose_db_connection();
        self.connection_owned = connection.is_none() || owned;
        self.connection = connection;
        self.opened_internally = false;
        Ok(())
    }

    /// Number of outstanding leases.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    #[must_use]
    pub fn is_opened_internally(&self) -> bool {
        self.opened_internally
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Set the timeout applied to every command, in seconds. `None` keeps driver defaults.
    ///
    /// # Errors
    /// Returns `InvalidCommandTimeout` for negative values.
    pub fn set_command_timeout(&mut self, seconds: Option<i64>) -> Result<(), RelationalDbError> {
        self.command_timeout = seconds.map(validate_command_timeout).transpose()?;
        Ok(())
    }

    #[must_use]
    pub fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    #[must_use]
    pub fn current_transaction(&self) -> Option<&RelationalTransaction> {
        self.current_transaction.as_ref()
    }

    #[must_use]
    pub fn enlisted_transaction(&self) -> Option<&AmbientTransaction> {
        self.enlisted_transaction.as_ref()
    }

    #[must_use]
    pub fn logger(&self) -> &DiagnosticsLogger {
        &self.logger
    }

    pub(crate) fn type_mappings(&self) -> Arc<dyn TypeMappingSource> {
        Arc::clone(&self.type_mappings)
    }

    fn connection_data(&self, is_async: bool, duration: Option<Duration>) -> ConnectionEventData {
        ConnectionEventData {
            connection_id: self.id,
            is_async,
            duration,
        }
    }

    fn dispose_db_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if self.connection_owned {
                connection.dispose();
            }
        }
        self.open_count = 0;
        self.opened_internally = false;
    }
}

impl fmt::Debug for RelationalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalConnection")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("has_connection", &self.connection.is_some())
            .field("connection_owned", &self.connection_owned)
            .field("open_count", &self.open_count)
            .field("opened_internally", &self.opened_internally)
            .field("current_transaction", &self.current_transaction)
            .field("command_timeout", &self.command_timeout)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Drop for RelationalConnection {
    fn drop(&mut self) {
        self.dispose();
    }
}
