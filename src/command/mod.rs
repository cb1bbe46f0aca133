//! Immutable command definitions and their execution against a [`RelationalConnection`].

mod builder;
mod executor;
mod reader;

use tokio_util::sync::CancellationToken;

use crate::connection::RelationalConnection;
use crate::diagnostics::{CommandResult, DiagnosticsLogger};
use crate::error::RelationalDbError;
use crate::parameters::{ParameterValues, RelationalParameter};
use crate::types::{DbCommandMethod, DbValue};

pub use builder::RelationalCommandBuilder;
pub use reader::RelationalDataReader;

/// Everything an execution needs besides the command itself.
pub struct CommandParameterObject<'a> {
    pub connection: &'a mut RelationalConnection,
    pub parameter_values: Option<&'a ParameterValues>,
    /// Overrides the connection's logger for this execution.
    pub logger: Option<&'a DiagnosticsLogger>,
}

impl<'a> CommandParameterObject<'a> {
    #[must_use]
    pub fn new(
        connection: &'a mut RelationalConnection,
        parameter_values: Option<&'a ParameterValues>,
        logger: Option<&'a DiagnosticsLogger>,
    ) -> Self {
        Self {
            connection,
            parameter_values,
            logger,
        }
    }
}

/// SQL text plus its declared parameters. Immutable and reusable across executions.
///
/// ```rust
/// use relational_command::prelude::*;
///
/// let command = RelationalCommandBuilder::new()
///     .append("SELECT * FROM users WHERE id = @p0")
///     .add_parameter("p0", "@p0", TypeMapping::int(), Some(false))
///     .build();
/// assert_eq!(command.parameters().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalCommand {
    command_text: String,
    parameters: Vec<RelationalParameter>,
}

impl RelationalCommand {
    #[must_use]
    pub fn new(command_text: impl Into<String>, parameters: Vec<RelationalParameter>) -> Self {
        Self {
            command_text: command_text.into(),
            parameters,
        }
    }

    #[must_use]
    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    #[must_use]
    pub fn parameters(&self) -> &[RelationalParameter] {
        &self.parameters
    }

    /// Execute a statement and return the number of rows affected.
    ///
    /// # Errors
    /// Returns binding errors before touching the connection, connection open failures, or
    /// the native execution failure.
    pub fn execute_non_query(
        &self,
        parameter_object: CommandParameterObject<'_>,
    ) -> Result<i64, RelationalDbError> {
        let executed = self.execute_native(DbCommandMethod::ExecuteNonQuery, parameter_object)?;
        match executed.finish()? {
            CommandResult::RowsAffected(rows) => Ok(rows),
            other => Err(unexpected(DbCommandMethod::ExecuteNonQuery, &other)),
        }
    }

    /// Execute a statement and return the first column of the first row.
    ///
    /// # Errors
    /// See [`RelationalCommand::execute_non_query`].
    pub fn execute_scalar(
        &self,
        parameter_object: CommandParameterObject<'_>,
    ) -> Result<DbValue, RelationalDbError> {
        let executed = self.execute_native(DbCommandMethod::ExecuteScalar, parameter_object)?;
        match executed.finish()? {
            CommandResult::Scalar(value) => Ok(value),
            other => Err(unexpected(DbCommandMethod::ExecuteScalar, &other)),
        }
    }

    /// Execute a query and return a reader over its rows. The native command, the cursor and
    /// a connection lease stay alive until the reader is disposed or dropped.
    ///
    /// # Errors
    /// See [`RelationalCommand::execute_non_query`].
    pub fn execute_reader<'c>(
        &self,
        parameter_object: CommandParameterObject<'c>,
    ) -> Result<RelationalDataReader<'c>, RelationalDbError> {
        self.execute_native(DbCommandMethod::ExecuteReader, parameter_object)?
            .into_reader()
    }

    /// Async twin of [`RelationalCommand::execute_non_query`].
    ///
    /// # Errors
    /// See [`RelationalCommand::execute_non_query`]; cancellation surfaces as `Canceled`.
    pub async fn execute_non_query_async(
        &self,
        parameter_object: CommandParameterObject<'_>,
        cancel: &CancellationToken,
    ) -> Result<i64, RelationalDbError> {
        let executed = self
            .execute_native_async(DbCommandMethod::ExecuteNonQuery, parameter_object, cancel)
            .await?;
        match executed.finish_async().await? {
            CommandResult::RowsAffected(rows) => Ok(rows),
            other => Err(unexpected(DbCommandMethod::ExecuteNonQuery, &other)),
        }
    }

    /// Async twin of [`RelationalCommand::execute_scalar`].
    ///
    /// # Errors
    /// See [`RelationalCommand::execute_non_query`]; cancellation surfaces as `Canceled`.
    pub async fn execute_scalar_async(
        &self,
        parameter_object: CommandParameterObject<'_>,
        cancel: &CancellationToken,
    ) -> Result<DbValue, RelationalDbError> {
        let executed = self
            .execute_native_async(DbCommandMethod::ExecuteScalar, parameter_object, cancel)
            .await?;
        match executed.finish_async().await? {
            CommandResult::Scalar(value) => Ok(value),
            other => Err(unexpected(DbCommandMethod::ExecuteScalar, &other)),
        }
    }

    /// Async twin of [`RelationalCommand::execute_reader`].
    ///
    /// # Errors
    /// See [`RelationalCommand::execute_non_query`]; cancellation surfaces as `Canceled`.
    pub async fn execute_reader_async<'c>(
        &self,
        parameter_object: CommandParameterObject<'c>,
        cancel: &CancellationToken,
    ) -> Result<RelationalDataReader<'c>, RelationalDbError> {
        self.execute_native_async(DbCommandMethod::ExecuteReader, parameter_object, cancel)
            .await?
            .into_reader()
    }
}

fn unexpected(method: DbCommandMethod, result: &CommandResult) -> RelationalDbError {
    RelationalDbError::ExecutionError(format!(
        "{method} produced an unexpected {} result",
        result.kind()
    ))
}
