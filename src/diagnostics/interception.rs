use std::fmt;

use uuid::Uuid;

use super::events::{CommandEventData, ExecutionSummary};
use crate::driver::{DbCommand, DbDataReader};
use crate::error::RelationalDbError;
use crate::types::{DbCommandMethod, DbValue};

/// Outcome of a command execution, as produced by the driver or supplied by an interceptor.
pub enum CommandResult {
    RowsAffected(i64),
    Scalar(DbValue),
    Reader(Box<dyn DbDataReader>),
}

impl CommandResult {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            CommandResult::RowsAffected(_) => "row count",
            CommandResult::Scalar(_) => "scalar",
            CommandResult::Reader(_) => "reader",
        }
    }

    pub(crate) fn summary(&self) -> ExecutionSummary {
        match self {
            CommandResult::RowsAffected(rows) => ExecutionSummary::RowsAffected(*rows),
            CommandResult::Scalar(value) => ExecutionSummary::Scalar(value.clone()),
            CommandResult::Reader(_) => ExecutionSummary::Reader,
        }
    }
}

impl fmt::Debug for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::RowsAffected(rows) => f.debug_tuple("RowsAffected").field(rows).finish(),
            CommandResult::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            CommandResult::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// Identifies an execution before its native command exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCorrelation {
    pub connection_id: Uuid,
    pub command_id: Uuid,
    pub method: DbCommandMethod,
    pub is_async: bool,
}

/// Hooks around every command execution, registered with
/// [`crate::RelationalOptionsBuilder::add_interceptor`].
///
/// Interceptors run in registration order and each one sees the result left by the previous
/// one. The same hooks serve sync and async executions. Every method has a pass-through
/// default, so implementors override only what they need.
///
/// ```rust
/// use relational_command::diagnostics::{CommandEventData, CommandInterceptor, CommandResult};
/// use relational_command::prelude::*;
///
/// /// Answers every scalar query with 42 without reaching the database.
/// struct FortyTwo;
///
/// impl CommandInterceptor for FortyTwo {
///     fn command_executing(
///         &self,
///         _command: &mut dyn DbCommand,
///         data: &CommandEventData,
///         result: Option<CommandResult>,
///     ) -> Option<CommandResult> {
///         match data.method {
///             DbCommandMethod::ExecuteScalar => Some(CommandResult::Scalar(DbValue::Int(42))),
///             _ => result,
///         }
///     }
/// }
/// ```
pub trait CommandInterceptor: Send + Sync {
    /// Return a command to use instead of asking the driver for one.
    fn command_creating(
        &self,
        _correlation: &CommandCorrelation,
        result: Option<Box<dyn DbCommand>>,
    ) -> Option<Box<dyn DbCommand>> {
        result
    }

    /// Called after `CommandExecuting`. The command may be changed here; returning `Some`
    /// suppresses the native execution and uses that result instead.
    fn command_executing(
        &self,
        _command: &mut dyn DbCommand,
        _data: &CommandEventData,
        result: Option<CommandResult>,
    ) -> Option<CommandResult> {
        result
    }

    /// Called with the result of a successful (or suppressed) execution; the returned result
    /// is what the caller receives.
    fn command_executed(
        &self,
        _command: &dyn DbCommand,
        _data: &CommandEventData,
        result: CommandResult,
    ) -> CommandResult {
        result
    }

    fn command_failed(
        &self,
        _command: &dyn DbCommand,
        _data: &CommandEventData,
        _error: &RelationalDbError,
    ) {
    }

    fn command_canceled(&self, _command: &dyn DbCommand, _data: &CommandEventData) {}
}
