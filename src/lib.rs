//! Relational command execution and connection lifecycle over a pluggable native driver.
//!
//! A [`RelationalConnection`] leases its native connection to commands and transactions,
//! opening it on first use and closing it when the last lease is returned. A
//! [`RelationalCommand`] binds parameters, runs in one of three modes and reports every step
//! through [`diagnostics`].

pub mod command;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod execution_strategy;
pub mod parameters;
pub mod prelude;
pub mod transaction;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use command::{
    CommandParameterObject, RelationalCommand, RelationalCommandBuilder, RelationalDataReader,
};
pub use config::{RelationalOptions, RelationalOptionsBuilder, RelationalSettings};
pub use connection::RelationalConnection;
pub use error::{DriverError, DriverErrorKind, RelationalDbError};
pub use execution_strategy::{ExecutionStrategy, NonRetryingExecutionStrategy};
pub use transaction::{RelationalTransaction, TransactionState};
