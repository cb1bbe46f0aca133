use thiserror::Error;

/// Broad classification of a native driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The driver observed cancellation of the in-flight operation.
    Canceled,
    /// The driver refused an operation in its current state.
    InvalidOperation,
    /// The operation is not supported by this driver.
    Unsupported,
    /// Any other failure reported by the database or the driver.
    Other,
}

/// Error surfaced by a native driver implementation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    pub code: Option<i32>,
}

impl DriverError {
    #[must_use]
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Other, message)
    }

    #[must_use]
    pub fn canceled() -> Self {
        Self::new(DriverErrorKind::Canceled, "The operation was canceled.")
    }

    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::InvalidOperation, message)
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Unsupported, message)
    }

    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.kind == DriverErrorKind::Canceled
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        let code = err.sqlite_error().map(|e| e.extended_code);
        let kind = if err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) {
            DriverErrorKind::Canceled
        } else {
            DriverErrorKind::Other
        };
        let mut driver_err = DriverError::new(kind, err.to_string());
        driver_err.code = code;
        driver_err
    }
}

#[derive(Debug, Error)]
pub enum RelationalDbError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("No database provider has been configured.")]
    NoProviderConfigured,

    #[error("Multiple database providers have been configured: {0}. Only a single provider can be used.")]
    MultipleProvidersConfigured(String),

    #[error("A relational connection was used without a native connection or connection string being configured.")]
    NoConnectionOrConnectionString,

    #[error("The specified command timeout value {0} is not valid. It must be a non-negative number of seconds.")]
    InvalidCommandTimeout(i64),

    #[error("The specified maximum batch size {0} is not valid. It must be a positive number.")]
    InvalidMaxBatchSize(i64),

    #[error("No value provided for required parameter '{0}'.")]
    MissingParameterValue(String),

    #[error("The value provided for parameter '{0}' cannot be used because it is not an array of values.")]
    ParameterNotArray(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("The connection or connection string cannot be changed while the connection is open.")]
    CannotChangeWhenOpen,

    #[error("No transaction is in progress.")]
    NoActiveTransaction,

    #[error("The connection is already in a transaction and cannot participate in another transaction.")]
    TransactionAlreadyStarted,

    #[error("The connection is currently enlisted in an ambient transaction. The enlisted transaction needs to be completed before starting a new transaction.")]
    ConflictingEnlistedTransaction,

    #[error("A local transaction is active on the connection. It needs to be completed before enlisting in an ambient transaction.")]
    ConflictingAmbientTransaction,

    #[error("The data reader has already been disposed.")]
    ReaderDisposed,

    #[error("The relational connection has been disposed.")]
    ConnectionDisposed,

    #[error("The operation was canceled.")]
    Canceled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl RelationalDbError {
    /// Maps a driver failure observed during execution, folding driver-level
    /// cancellation into [`RelationalDbError::Canceled`].
    #[must_use]
    pub fn from_driver(err: DriverError, token_canceled: bool) -> Self {
        if err.is_canceled() || token_canceled {
            RelationalDbError::Canceled
        } else {
            RelationalDbError::Driver(err)
        }
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, RelationalDbError::Canceled)
    }
}
