//! Native driver abstraction.
//!
//! These traits describe the connection, transaction, command and cursor primitives a
//! backend exposes. The runtime in this crate orchestrates them but never implements
//! database access itself; see [`crate::sqlite`] for a backend and
//! [`crate::test_utils`] for the fake driver used in tests.

mod parameter;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;
use crate::parameters::{DefaultTypeMappingSource, TypeMappingSource};
use crate::types::{AmbientTransaction, ConnectionState, DbValue, IsolationLevel};

pub use parameter::DbParameter;

/// Factory for native connections of one backend.
pub trait DbProvider: Send + Sync + fmt::Debug {
    /// Stable provider name used in configuration diagnostics.
    fn name(&self) -> &str;

    /// Create a closed native connection for the given connection string.
    ///
    /// # Errors
    /// Returns `DriverError` if the connection string is not understood by the backend.
    fn create_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DbConnection>, DriverError>;

    /// Type mappings used for parameters whose store type is inferred from their value.
    fn type_mapping_source(&self) -> Arc<dyn TypeMappingSource> {
        Arc::new(DefaultTypeMappingSource)
    }
}

/// A physical database connection.
#[async_trait]
pub trait DbConnection: Send {
    fn connection_string(&self) -> String;

    fn set_connection_string(&mut self, connection_string: &str);

    fn state(&self) -> ConnectionState;

    /// # Errors
    /// Returns `DriverError` if the backend cannot open the connection.
    fn open(&mut self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the backend cannot open the connection or observes cancellation.
    async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if closing fails.
    fn close(&mut self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if closing fails.
    async fn close_async(&mut self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the backend cannot start a transaction.
    fn begin_transaction(
        &mut self,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<dyn DbTransaction>, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the backend cannot start a transaction.
    async fn begin_transaction_async(
        &mut self,
        isolation_level: IsolationLevel,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn DbTransaction>, DriverError>;

    /// Create a command bound to this connection.
    fn create_command(&mut self) -> Box<dyn DbCommand>;

    /// Enlist in (or, with `None`, leave) an ambient transaction.
    ///
    /// # Errors
    /// Returns `DriverError` if the backend has no ambient transaction support.
    fn enlist_transaction(
        &mut self,
        _transaction: Option<&AmbientTransaction>,
    ) -> Result<(), DriverError> {
        Err(DriverError::unsupported(
            "this driver does not support ambient transactions",
        ))
    }

    /// Release every resource held by the connection. Must be safe to call twice.
    fn dispose(&mut self);
}

/// A native transaction handle. Shared between the owning connection wrapper and the
/// commands that run inside it, so every operation takes `&self`.
#[async_trait]
pub trait DbTransaction: Send + Sync {
    fn isolation_level(&self) -> IsolationLevel;

    /// # Errors
    /// Returns `DriverError` if the commit fails.
    fn commit(&self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the commit fails or observes cancellation.
    async fn commit_async(&self, cancel: &CancellationToken) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the rollback fails.
    fn rollback(&self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the rollback fails or observes cancellation.
    async fn rollback_async(&self, cancel: &CancellationToken) -> Result<(), DriverError>;

    /// Release the transaction; an uncompleted transaction is rolled back by the driver.
    fn dispose(&self);
}

/// A native command object.
#[async_trait]
pub trait DbCommand: Send {
    fn command_text(&self) -> String;

    fn set_command_text(&mut self, text: &str);

    fn command_timeout(&self) -> Duration;

    fn set_command_timeout(&mut self, timeout: Duration);

    fn set_transaction(&mut self, transaction: Option<Arc<dyn DbTransaction>>);

    fn add_parameter(&mut self, parameter: DbParameter);

    fn parameters(&self) -> Vec<DbParameter>;

    fn clear_parameters(&mut self);

    /// # Errors
    /// Returns `DriverError` if the statement fails.
    fn execute_non_query(&mut self) -> Result<i64, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the statement fails.
    fn execute_scalar(&mut self) -> Result<DbValue, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the statement fails.
    fn execute_reader(&mut self) -> Result<Box<dyn DbDataReader>, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the statement fails or observes cancellation.
    async fn execute_non_query_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<i64, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the statement fails or observes cancellation.
    async fn execute_scalar_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<DbValue, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the statement fails or observes cancellation.
    async fn execute_reader_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DbDataReader>, DriverError>;

    fn dispose(&mut self);
}

/// A forward-only result cursor.
#[async_trait]
pub trait DbDataReader: Send {
    fn field_count(&self) -> usize;

    fn column_name(&self, ordinal: usize) -> Option<String>;

    /// Advance to the next row. Returns `false` once the cursor is exhausted.
    ///
    /// # Errors
    /// Returns `DriverError` if fetching the row fails.
    fn read(&mut self) -> Result<bool, DriverError>;

    /// # Errors
    /// Returns `DriverError` if fetching the row fails or observes cancellation.
    async fn read_async(&mut self, cancel: &CancellationToken) -> Result<bool, DriverError>;

    /// Value of a column in the current row.
    ///
    /// # Errors
    /// Returns `DriverError` if there is no current row or the ordinal is out of range.
    fn get_value(&self, ordinal: usize) -> Result<DbValue, DriverError>;

    /// Rows changed by the statement, `-1` for pure queries.
    fn records_affected(&self) -> i64;

    fn is_closed(&self) -> bool;

    fn close(&mut self);

    fn dispose(&mut self);
}
