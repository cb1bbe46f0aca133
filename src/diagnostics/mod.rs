//! Diagnostic events for connection, transaction, command and reader lifecycles.
//!
//! Every event goes to `tracing` at its level and, when configured, to a
//! [`DiagnosticSink`] as a typed [`DiagnosticEvent`]. Command executions also pass through
//! the registered [`CommandInterceptor`]s.

mod events;
mod interception;
mod logger;
mod sink;

pub use events::{
    CommandEventData, ConnectionEventData, DiagnosticEvent, EventId, ExecutionSummary,
    TransactionEventData, format_command, format_parameters,
};
pub use interception::{CommandCorrelation, CommandInterceptor, CommandResult};
pub use logger::DiagnosticsLogger;
pub use sink::{ChannelSink, DiagnosticSink, MemorySink};
