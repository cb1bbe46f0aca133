use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::lock;
use super::reader::FakeDbDataReader;
use crate::driver::{DbCommand, DbDataReader, DbParameter, DbTransaction};
use crate::error::DriverError;
use crate::types::DbValue;

type SyncHandler<T> = Arc<dyn Fn(&FakeDbCommand) -> Result<T, DriverError> + Send + Sync>;
type AsyncHandler<T> =
    Arc<dyn Fn(&FakeDbCommand, &CancellationToken) -> Result<T, DriverError> + Send + Sync>;

/// Scripted behavior for the commands of a fake connection. Unscripted calls succeed with
/// zero rows, a NULL scalar or an empty reader.
#[derive(Clone)]
pub struct FakeCommandExecutor {
    execute_non_query: SyncHandler<i64>,
    execute_scalar: SyncHandler<DbValue>,
    execute_reader: SyncHandler<FakeDbDataReader>,
    execute_non_query_async: AsyncHandler<i64>,
    execute_scalar_async: AsyncHandler<DbValue>,
    execute_reader_async: AsyncHandler<FakeDbDataReader>,
}

impl FakeCommandExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            execute_non_query: Arc::new(|_: &FakeDbCommand| Ok(0)),
            execute_scalar: Arc::new(|_: &FakeDbCommand| Ok(DbValue::Null)),
            execute_reader: Arc::new(|_: &FakeDbCommand| Ok(FakeDbDataReader::empty())),
            execute_non_query_async: Arc::new(|_: &FakeDbCommand, cancel: &CancellationToken| {
                canceled_or(cancel, 0)
            }),
            execute_scalar_async: Arc::new(|_: &FakeDbCommand, cancel: &CancellationToken| {
                canceled_or(cancel, DbValue::Null)
            }),
            execute_reader_async: Arc::new(|_: &FakeDbCommand, cancel: &CancellationToken| {
                canceled_or(cancel, FakeDbDataReader::empty())
            }),
        }
    }

    #[must_use]
    pub fn with_execute_non_query(
        mut self,
        handler: impl Fn(&FakeDbCommand) -> Result<i64, DriverError> + Send + Sync + 'static,
    ) -> Self {
        self.execute_non_query = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn with_execute_scalar(
        mut self,
        handler: impl Fn(&FakeDbCommand) -> Result<DbValue, DriverError> + Send + Sync + 'static,
    ) -> Self {
        self.execute_scalar = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn with_execute_reader(
        mut self,
        handler: impl Fn(&FakeDbCommand) -> Result<FakeDbDataReader, DriverError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.execute_reader = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn with_execute_non_query_async(
        mut self,
        handler: impl Fn(&FakeDbCommand, &CancellationToken) -> Result<i64, DriverError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.execute_non_query_async = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn with_execute_scalar_async(
        mut self,
        handler: impl Fn(&FakeDbCommand, &CancellationToken) -> Result<DbValue, DriverError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.execute_scalar_async = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn with_execute_reader_async(
        mut self,
        handler: impl Fn(
            &FakeDbCommand,
            &CancellationToken,
        ) -> Result<FakeDbDataReader, DriverError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.execute_reader_async = Arc::new(handler);
        self
    }

    /// Every execution mode, sync and async, fails with `err`.
    #[must_use]
    pub fn failing(err: DriverError) -> Self {
        let (a, b, c, d, e) = (err.clone(), err.clone(), err.clone(), err.clone(), err.clone());
        Self::new()
            .with_execute_non_query(move |_| Err(a.clone()))
            .with_execute_scalar(move |_| Err(b.clone()))
            .with_execute_reader(move |_| Err(c.clone()))
            .with_execute_non_query_async(move |_, _| Err(d.clone()))
            .with_execute_scalar_async(move |_, _| Err(e.clone()))
            .with_execute_reader_async(move |_, _| Err(err.clone()))
    }
}

impl Default for FakeCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FakeCommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeCommandExecutor").finish_non_exhaustive()
    }
}

fn canceled_or<T>(cancel: &CancellationToken, value: T) -> Result<T, DriverError> {
    if cancel.is_cancelled() {
        Err(DriverError::canceled())
    } else {
        Ok(value)
    }
}

struct CommandState {
    command_text: String,
    command_timeout: Duration,
    transaction: Option<Arc<dyn DbTransaction>>,
    parameters: Vec<DbParameter>,
    /// Parameters as they were when the command last executed.
    executed_parameters: Vec<DbParameter>,
    execute_count: usize,
    dispose_count: usize,
}

/// Fake native command that delegates execution to a [`FakeCommandExecutor`].
#[derive(Clone)]
pub struct FakeDbCommand {
    state: Arc<Mutex<CommandState>>,
    executor: FakeCommandExecutor,
}

impl FakeDbCommand {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(executor: FakeCommandExecutor) -> Self {
        Self {
            state: Arc::new(Mutex::new(CommandState {
                command_text: String::new(),
                command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
                transaction: None,
                parameters: Vec::new(),
                executed_parameters: Vec::new(),
                execute_count: 0,
                dispose_count: 0,
            })),
            executor,
        }
    }

    #[must_use]
    pub fn transaction(&self) -> Option<Arc<dyn DbTransaction>> {
        lock(&self.state).transaction.clone()
    }

    /// Parameters present at the last execution.
    #[must_use]
    pub fn executed_parameters(&self) -> Vec<DbParameter> {
        lock(&self.state).executed_parameters.clone()
    }

    #[must_use]
    pub fn execute_count(&self) -> usize {
        lock(&self.state).execute_count
    }

    #[must_use]
    pub fn dispose_count(&self) -> usize {
        lock(&self.state).dispose_count
    }

    fn record_execution(&self) {
        let mut state = lock(&self.state);
        state.execute_count += 1;
        state.executed_parameters = state.parameters.clone();
    }
}

impl fmt::Debug for FakeDbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("FakeDbCommand")
            .field("command_text", &state.command_text)
            .field("command_timeout", &state.command_timeout)
            .field("parameters", &state.parameters)
            .field("dispose_count", &state.dispose_count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DbCommand for FakeDbCommand {
    fn command_text(&self) -> String {
        lock(&self.state).command_text.clone()
    }

    fn set_command_text(&mut self, text: &str) {
        lock(&self.state).command_text = text.to_owned();
    }

    fn command_timeout(&self) -> Duration {
        lock(&self.state).command_timeout
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        lock(&self.state).command_timeout = timeout;
    }

    fn set_transaction(&mut self, transaction: Option<Arc<dyn DbTransaction>>) {
        lock(&self.state).transaction = transaction;
    }

    fn add_parameter(&mut self, parameter: DbParameter) {
        lock(&self.state).parameters.push(parameter);
    }

    fn parameters(&self) -> Vec<DbParameter> {
        lock(&self.state).parameters.clone()
    }

    fn clear_parameters(&mut self) {
        lock(&self.state).parameters.clear();
    }

    fn execute_non_query(&mut self) -> Result<i64, DriverError> {
        self.record_execution();
        (self.executor.execute_non_query)(&*self)
    }

    fn execute_scalar(&mut self) -> Result<DbValue, DriverError> {
        self.record_execution();
        (self.executor.execute_scalar)(&*self)
    }

    fn execute_reader(&mut self) -> Result<Box<dyn DbDataReader>, DriverError> {
        self.record_execution();
        let reader = (self.executor.execute_reader)(&*self)?;
        Ok(Box::new(reader))
    }

    async fn execute_non_query_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<i64, DriverError> {
        self.record_execution();
        (self.executor.execute_non_query_async)(&*self, cancel)
    }

    async fn execute_scalar_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<DbValue, DriverError> {
        self.record_execution();
        (self.executor.execute_scalar_async)(&*self, cancel)
    }

    async fn execute_reader_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DbDataReader>, DriverError> {
        self.record_execution();
        let reader = (self.executor.execute_reader_async)(&*self, cancel)?;
        Ok(Box::new(reader))
    }

    fn dispose(&mut self) {
        lock(&self.state).dispose_count += 1;
    }
}
