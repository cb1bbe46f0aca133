use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{CommandInterceptor, DiagnosticSink, DiagnosticsLogger};
use crate::driver::DbProvider;
use crate::error::RelationalDbError;

/// Plain settings for a relational connection, typically loaded from JSON.
///
/// ```rust
/// use relational_command::prelude::*;
///
/// let settings = RelationalSettings::from_json(
///     r#"{ "connection_string": "Data Source=:memory:", "command_timeout": 30 }"#,
/// )
/// .unwrap();
/// assert_eq!(settings.command_timeout, Some(30));
/// assert!(!settings.sensitive_data_logging);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalSettings {
    pub connection_string: Option<String>,
    /// Seconds; `None` keeps the driver default.
    pub command_timeout: Option<i64>,
    pub max_batch_size: Option<i64>,
    pub sensitive_data_logging: bool,
}

impl RelationalSettings {
    /// Parse settings from a JSON document.
    ///
    /// # Errors
    /// Returns `RelationalDbError::ConfigError` if the document is not valid settings JSON.
    pub fn from_json(json: &str) -> Result<Self, RelationalDbError> {
        serde_json::from_str(json)
            .map_err(|e| RelationalDbError::ConfigError(format!("invalid settings: {e}")))
    }

    /// Check the numeric settings.
    ///
    /// # Errors
    /// Returns `InvalidCommandTimeout` for a negative timeout and `InvalidMaxBatchSize` for a
    /// batch size below one.
    pub fn validate(&self) -> Result<(), RelationalDbError> {
        if let Some(timeout) = self.command_timeout {
            validate_command_timeout(timeout)?;
        }
        if let Some(size) = self.max_batch_size {
            if size < 1 {
                return Err(RelationalDbError::InvalidMaxBatchSize(size));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_command_timeout(seconds: i64) -> Result<Duration, RelationalDbError> {
    u64::try_from(seconds)
        .map(Duration::from_secs)
        .map_err(|_| RelationalDbError::InvalidCommandTimeout(seconds))
}

/// Validated, immutable configuration shared by the connections created from it.
#[derive(Clone)]
pub struct RelationalOptions {
    provider: Arc<dyn DbProvider>,
    settings: RelationalSettings,
    logger: DiagnosticsLogger,
}

impl RelationalOptions {
    #[must_use]
    pub fn builder() -> RelationalOptionsBuilder {
        RelationalOptionsBuilder::new()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn DbProvider> {
        &self.provider
    }

    #[must_use]
    pub fn settings(&self) -> &RelationalSettings {
        &self.settings
    }

    #[must_use]
    pub fn connection_string(&self) -> Option<&str> {
        self.settings.connection_string.as_deref()
    }

    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.settings
            .command_timeout
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }

    #[must_use]
    pub fn max_batch_size(&self) -> Option<usize> {
        self.settings
            .max_batch_size
            .and_then(|size| usize::try_from(size).ok())
    }

    #[must_use]
    pub fn logger(&self) -> &DiagnosticsLogger {
        &self.logger
    }
}

impl fmt::Debug for RelationalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalOptions")
            .field("provider", &self.provider.name())
            .field("settings", &self.settings)
            .field("logger", &self.logger)
            .finish()
    }
}

/// Fluent builder for [`RelationalOptions`].
#[derive(Default)]
pub struct RelationalOptionsBuilder {
    providers: Vec<Arc<dyn DbProvider>>,
    settings: RelationalSettings,
    sink: Option<Arc<dyn DiagnosticSink>>,
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
}

impl RelationalOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from already loaded settings.
    #[must_use]
    pub fn from_settings(settings: RelationalSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Register the provider. Registering more than one is a configuration error
    /// reported by [`RelationalOptionsBuilder::build`].
    #[must_use]
    pub fn use_provider(mut self, provider: Arc<dyn DbProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    #[must_use]
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.settings.connection_string = Some(connection_string.into());
        self
    }

    #[must_use]
    pub fn command_timeout(mut self, seconds: i64) -> Self {
        self.settings.command_timeout = Some(seconds);
        self
    }

    #[must_use]
    pub fn max_batch_size(mut self, size: i64) -> Self {
        self.settings.max_batch_size = Some(size);
        self
    }

    #[must_use]
    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.settings.sensitive_data_logging = enabled;
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register a command interceptor. Interceptors run in registration order.
    #[must_use]
    pub fn add_interceptor(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    /// Returns `NoProviderConfigured` or `MultipleProvidersConfigured` unless exactly one
    /// provider was registered, and the errors of [`RelationalSettings::validate`].
    pub fn build(self) -> Result<RelationalOptions, RelationalDbError> {
        let provider = match self.providers.as_slice() {
            [] => return Err(RelationalDbError::NoProviderConfigured),
            [provider] => Arc::clone(provider),
            many => {
                let names = many
                    .iter()
                    .map(|p| p.name().to_owned())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(RelationalDbError::MultipleProvidersConfigured(names));
            }
        };
        self.settings.validate()?;
        let logger = DiagnosticsLogger::with_interceptors(
            self.sink,
            self.settings.sensitive_data_logging,
            self.interceptors,
        );
        Ok(RelationalOptions {
            provider,
            settings: self.settings,
            logger,
        })
    }
}
