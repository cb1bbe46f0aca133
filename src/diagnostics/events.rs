use std::fmt;
use std::time::Duration;

use tracing::Level;
use uuid::Uuid;

use crate::driver::DbParameter;
use crate::types::{DbCommandMethod, DbValue, IsolationLevel};

/// Identifier of every diagnostic event the runtime can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    CommandCreating,
    CommandCreated,
    CommandInitialized,
    CommandExecuting,
    CommandExecuted,
    CommandError,
    CommandCanceled,
    DataReaderClosing,
    DataReaderDisposing,
    ConnectionOpening,
    ConnectionOpened,
    ConnectionClosing,
    ConnectionClosed,
    ConnectionError,
    ConnectionDisposing,
    ConnectionDisposed,
    TransactionStarting,
    TransactionStarted,
    TransactionUsed,
    TransactionCommitting,
    TransactionCommitted,
    TransactionRollingBack,
    TransactionRolledBack,
    TransactionError,
    TransactionDisposed,
    SensitiveDataLoggingEnabled,
}

impl EventId {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EventId::CommandCreating => "CommandCreating",
            EventId::CommandCreated => "CommandCreated",
            EventId::CommandInitialized => "CommandInitialized",
            EventId::CommandExecuting => "CommandExecuting",
            EventId::CommandExecuted => "CommandExecuted",
            EventId::CommandError => "CommandError",
            EventId::CommandCanceled => "CommandCanceled",
            EventId::DataReaderClosing => "DataReaderClosing",
            EventId::DataReaderDisposing => "DataReaderDisposing",
            EventId::ConnectionOpening => "ConnectionOpening",
            EventId::ConnectionOpened => "ConnectionOpened",
            EventId::ConnectionClosing => "ConnectionClosing",
            EventId::ConnectionClosed => "ConnectionClosed",
            EventId::ConnectionError => "ConnectionError",
            EventId::ConnectionDisposing => "ConnectionDisposing",
            EventId::ConnectionDisposed => "ConnectionDisposed",
            EventId::TransactionStarting => "TransactionStarting",
            EventId::TransactionStarted => "TransactionStarted",
            EventId::TransactionUsed => "TransactionUsed",
            EventId::TransactionCommitting => "TransactionCommitting",
            EventId::TransactionCommitted => "TransactionCommitted",
            EventId::TransactionRollingBack => "TransactionRollingBack",
            EventId::TransactionRolledBack => "TransactionRolledBack",
            EventId::TransactionError => "TransactionError",
            EventId::TransactionDisposed => "TransactionDisposed",
            EventId::SensitiveDataLoggingEnabled => "SensitiveDataLoggingEnabled",
        }
    }

    /// Default log level for the event.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            EventId::CommandExecuted => Level::INFO,
            EventId::CommandError | EventId::ConnectionError | EventId::TransactionError => {
                Level::ERROR
            }
            EventId::SensitiveDataLoggingEnabled => Level::WARN,
            _ => Level::DEBUG,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload shared by command events once the native command exists.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEventData {
    pub connection_id: Uuid,
    pub command_id: Uuid,
    pub method: DbCommandMethod,
    pub is_async: bool,
    pub command_text: String,
    pub parameters: Vec<DbParameter>,
    pub command_timeout: Duration,
}

/// What a successful execution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionSummary {
    RowsAffected(i64),
    Scalar(DbValue),
    Reader,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEventData {
    pub connection_id: Uuid,
    pub is_async: bool,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEventData {
    pub connection_id: Uuid,
    pub transaction_id: Uuid,
    pub isolation_level: IsolationLevel,
    pub is_async: bool,
    pub duration: Option<Duration>,
}

/// A diagnostic event, delivered to the configured sink and logged through `tracing`.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    CommandCreating {
        connection_id: Uuid,
        command_id: Uuid,
        method: DbCommandMethod,
        is_async: bool,
    },
    CommandCreated {
        connection_id: Uuid,
        command_id: Uuid,
        method: DbCommandMethod,
        is_async: bool,
        duration: Duration,
    },
    CommandInitialized(CommandEventData),
    CommandExecuting(CommandEventData),
    CommandExecuted {
        command: CommandEventData,
        result: ExecutionSummary,
        duration: Duration,
    },
    CommandError {
        command: CommandEventData,
        error: String,
        duration: Duration,
    },
    CommandCanceled {
        command: CommandEventData,
        duration: Duration,
    },
    DataReaderClosing {
        connection_id: Uuid,
        command_id: Uuid,
        read_count: u64,
        records_affected: i64,
    },
    DataReaderDisposing {
        connection_id: Uuid,
        command_id: Uuid,
        read_count: u64,
        records_affected: i64,
        duration: Duration,
    },
    ConnectionOpening(ConnectionEventData),
    ConnectionOpened(ConnectionEventData),
    ConnectionClosing(ConnectionEventData),
    ConnectionClosed(ConnectionEventData),
    ConnectionError {
        connection: ConnectionEventData,
        error: String,
        errors_expected: bool,
    },
    ConnectionDisposing(ConnectionEventData),
    ConnectionDisposed(ConnectionEventData),
    TransactionStarting(TransactionEventData),
    TransactionStarted(TransactionEventData),
    TransactionUsed(TransactionEventData),
    TransactionCommitting(TransactionEventData),
    TransactionCommitted(TransactionEventData),
    TransactionRollingBack(TransactionEventData),
    TransactionRolledBack(TransactionEventData),
    TransactionError {
        transaction: TransactionEventData,
        action: &'static str,
        error: String,
    },
    TransactionDisposed(TransactionEventData),
    SensitiveDataLoggingEnabled,
}

impl DiagnosticEvent {
    #[must_use]
    pub fn event_id(&self) -> EventId {
        match self {
            DiagnosticEvent::CommandCreating { .. } => EventId::CommandCreating,
            DiagnosticEvent::CommandCreated { .. } => EventId::CommandCreated,
            DiagnosticEvent::CommandInitialized(_) => EventId::CommandInitialized,
            DiagnosticEvent::CommandExecuting(_) => EventId::CommandExecuting,
            DiagnosticEvent::CommandExecuted { .. } => EventId::CommandExecuted,
            DiagnosticEvent::CommandError { .. } => EventId::CommandError,
            DiagnosticEvent::CommandCanceled { .. } => EventId::CommandCanceled,
            DiagnosticEvent::DataReaderClosing { .. } => EventId::DataReaderClosing,
            DiagnosticEvent::DataReaderDisposing { .. } => EventId::DataReaderDisposing,
            DiagnosticEvent::ConnectionOpening(_) => EventId::ConnectionOpening,
            DiagnosticEvent::ConnectionOpened(_) => EventId::ConnectionOpened,
            DiagnosticEvent::ConnectionClosing(_) => EventId::ConnectionClosing,
            DiagnosticEvent::ConnectionClosed(_) => EventId::ConnectionClosed,
            DiagnosticEvent::ConnectionError { .. } => EventId::ConnectionError,
            DiagnosticEvent::ConnectionDisposing(_) => EventId::ConnectionDisposing,
            DiagnosticEvent::ConnectionDisposed(_) => EventId::ConnectionDisposed,
            DiagnosticEvent::TransactionStarting(_) => EventId::TransactionStarting,
            DiagnosticEvent::TransactionStarted(_) => EventId::TransactionStarted,
            DiagnosticEvent::TransactionUsed(_) => EventId::TransactionUsed,
            DiagnosticEvent::TransactionCommitting(_) => EventId::TransactionCommitting,
            DiagnosticEvent::TransactionCommitted(_) => EventId::TransactionCommitted,
            DiagnosticEvent::TransactionRollingBack(_) => EventId::TransactionRollingBack,
            DiagnosticEvent::TransactionRolledBack(_) => EventId::TransactionRolledBack,
            DiagnosticEvent::TransactionError { .. } => EventId::TransactionError,
            DiagnosticEvent::TransactionDisposed(_) => EventId::TransactionDisposed,
            DiagnosticEvent::SensitiveDataLoggingEnabled => EventId::SensitiveDataLoggingEnabled,
        }
    }

    /// Level the event is logged at; expected connection errors are demoted to debug.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            DiagnosticEvent::ConnectionError {
                errors_expected: true,
                ..
            } => Level::DEBUG,
            _ => self.event_id().level(),
        }
    }

    /// Command payload for command lifecycle events after creation.
    #[must_use]
    pub fn command_data(&self) -> Option<&CommandEventData> {
        match self {
            DiagnosticEvent::CommandInitialized(data) | DiagnosticEvent::CommandExecuting(data) => {
                Some(data)
            }
            DiagnosticEvent::CommandExecuted { command, .. }
            | DiagnosticEvent::CommandError { command, .. }
            | DiagnosticEvent::CommandCanceled { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Human readable log message. Parameter values are only rendered when
    /// `sensitive_data_logging` is set.
    #[must_use]
    pub fn message(&self, sensitive_data_logging: bool) -> String {
        match self {
            DiagnosticEvent::CommandCreating { method, .. } => {
                format!("Creating DbCommand for '{method}'.")
            }
            DiagnosticEvent::CommandCreated {
                method, duration, ..
            } => format!(
                "Created DbCommand for '{method}' ({}ms).",
                duration.as_millis()
            ),
            DiagnosticEvent::CommandInitialized(data) => {
                format!("Initialized DbCommand for '{}'.", data.method)
            }
            DiagnosticEvent::CommandExecuting(data) => format!(
                "Executing DbCommand {}",
                format_command(data, sensitive_data_logging)
            ),
            DiagnosticEvent::CommandExecuted {
                command, duration, ..
            } => format!(
                "Executed DbCommand ({}ms) {}",
                duration.as_millis(),
                format_command(command, sensitive_data_logging)
            ),
            DiagnosticEvent::CommandError {
                command,
                error,
                duration,
            } => format!(
                "Failed executing DbCommand ({}ms) {}\n{error}",
                duration.as_millis(),
                format_command(command, sensitive_data_logging)
            ),
            DiagnosticEvent::CommandCanceled { command, duration } => format!(
                "Canceled execution of DbCommand ({}ms) {}",
                duration.as_millis(),
                format_command(command, sensitive_data_logging)
            ),
            DiagnosticEvent::DataReaderClosing { command_id, .. } => {
                format!("Closing data reader for command '{command_id}'.")
            }
            DiagnosticEvent::DataReaderDisposing {
                command_id,
                read_count,
                duration,
                ..
            } => format!(
                "A data reader for command '{command_id}' was disposed after reading {read_count} rows ({}ms).",
                duration.as_millis()
            ),
            DiagnosticEvent::ConnectionOpening(c) => {
                format!("Opening connection '{}'.", c.connection_id)
            }
            DiagnosticEvent::ConnectionOpened(c) => {
                format!("Opened connection '{}'.", c.connection_id)
            }
            DiagnosticEvent::ConnectionClosing(c) => {
                format!("Closing connection '{}'.", c.connection_id)
            }
            DiagnosticEvent::ConnectionClosed(c) => {
                format!("Closed connection '{}'.", c.connection_id)
            }
            DiagnosticEvent::ConnectionError {
                connection, error, ..
            } => format!(
                "An error occurred using the connection '{}': {error}",
                connection.connection_id
            ),
            DiagnosticEvent::ConnectionDisposing(c) => {
                format!("Disposing connection '{}'.", c.connection_id)
            }
            DiagnosticEvent::ConnectionDisposed(c) => {
                format!("Disposed connection '{}'.", c.connection_id)
            }
            DiagnosticEvent::TransactionStarting(t) => format!(
                "Beginning transaction with isolation level '{:?}'.",
                t.isolation_level
            ),
            DiagnosticEvent::TransactionStarted(t) => format!(
                "Began transaction '{}' with isolation level '{:?}'.",
                t.transaction_id, t.isolation_level
            ),
            DiagnosticEvent::TransactionUsed(t) => format!(
                "Using an existing transaction '{}' with isolation level '{:?}'.",
                t.transaction_id, t.isolation_level
            ),
            DiagnosticEvent::TransactionCommitting(t) => {
                format!("Committing transaction '{}'.", t.transaction_id)
            }
            DiagnosticEvent::TransactionCommitted(t) => {
                format!("Committed transaction '{}'.", t.transaction_id)
            }
            DiagnosticEvent::TransactionRollingBack(t) => {
                format!("Rolling back transaction '{}'.", t.transaction_id)
            }
            DiagnosticEvent::TransactionRolledBack(t) => {
                format!("Rolled back transaction '{}'.", t.transaction_id)
            }
            DiagnosticEvent::TransactionError {
                transaction,
                action,
                error,
            } => format!(
                "An error occurred using transaction '{}' during '{action}': {error}",
                transaction.transaction_id
            ),
            DiagnosticEvent::TransactionDisposed(t) => {
                format!("Disposing transaction '{}'.", t.transaction_id)
            }
            DiagnosticEvent::SensitiveDataLoggingEnabled => "Sensitive data logging is enabled. Log entries and exception messages may include sensitive application data; this mode should only be enabled during development.".to_string(),
        }
    }
}

/// `[Parameters=[...], CommandType='Text', CommandTimeout='30']` followed by the command text
/// on its own line.
#[must_use]
pub fn format_command(data: &CommandEventData, sensitive_data_logging: bool) -> String {
    format!(
        "[Parameters=[{}], CommandType='Text', CommandTimeout='{}']\n{}",
        format_parameters(&data.parameters, sensitive_data_logging),
        data.command_timeout.as_secs(),
        data.command_text
    )
}

#[must_use]
pub fn format_parameters(parameters: &[DbParameter], sensitive_data_logging: bool) -> String {
    parameters
        .iter()
        .map(|p| format_parameter(p, sensitive_data_logging))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_parameter(parameter: &DbParameter, sensitive_data_logging: bool) -> String {
    let mut out = if !sensitive_data_logging {
        format!("{}='?'", parameter.name)
    } else if parameter.value.is_null() {
        format!("{}=NULL", parameter.name)
    } else {
        format!("{}='{}'", parameter.name, parameter.value)
    };

    if let Some(db_type) = parameter.db_type {
        // With values visible, the store type is only noise when it is the obvious one.
        if !sensitive_data_logging || parameter.value.natural_db_type() != Some(db_type) {
            out.push_str(&format!(" (DbType = {db_type})"));
        }
    }
    if parameter.is_nullable {
        out.push_str(" (Nullable = true)");
    }
    if let Some(size) = parameter.size {
        out.push_str(&format!(" (Size = {size})"));
    }
    out
}
