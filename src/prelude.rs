//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so that a single
//! `use relational_command::prelude::*;` is enough to configure a connection and run commands.

pub use crate::command::{
    CommandParameterObject, RelationalCommand, RelationalCommandBuilder, RelationalDataReader,
};
pub use crate::config::{RelationalOptions, RelationalOptionsBuilder, RelationalSettings};
pub use crate::connection::RelationalConnection;
pub use crate::diagnostics::{
    CommandInterceptor, CommandResult, DiagnosticEvent, DiagnosticSink, DiagnosticsLogger, EventId,
    MemorySink,
};
pub use crate::driver::{
    DbCommand, DbConnection, DbDataReader, DbParameter, DbProvider, DbTransaction,
};
pub use crate::error::{DriverError, RelationalDbError};
pub use crate::execution_strategy::{ExecutionStrategy, NonRetryingExecutionStrategy};
pub use crate::parameters::{
    ParameterValue, ParameterValues, RelationalParameter, TypeMapping, TypeMappingSource,
};
pub use crate::transaction::{RelationalTransaction, TransactionState};
pub use crate::types::{
    AmbientTransaction, ConnectionState, DbCommandMethod, DbType, DbValue, IsolationLevel,
    ParameterDirection,
};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteProvider;

pub use tokio_util::sync::CancellationToken;
