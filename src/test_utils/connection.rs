use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::command::{FakeCommandExecutor, FakeDbCommand};
use super::lock;
use super::transaction::FakeDbTransaction;
use crate::driver::{DbCommand, DbConnection, DbProvider, DbTransaction};
use crate::error::DriverError;
use crate::types::{AmbientTransaction, ConnectionState, IsolationLevel};

#[derive(Debug, Default)]
struct ConnectionInner {
    connection_string: String,
    state: ConnectionState,
    open_count: usize,
    open_async_count: usize,
    close_count: usize,
    dispose_count: usize,
    commands: Vec<FakeDbCommand>,
    transactions: Vec<FakeDbTransaction>,
    enlisted: Option<AmbientTransaction>,
    fail_open: Option<DriverError>,
    fail_begin: Option<DriverError>,
}

/// Fake native connection recording every call made on it.
#[derive(Debug, Clone)]
pub struct FakeDbConnection {
    inner: Arc<Mutex<ConnectionInner>>,
    executor: FakeCommandExecutor,
}

impl FakeDbConnection {
    #[must_use]
    pub fn new(connection_string: &str) -> Self {
        Self::with_executor(connection_string, FakeCommandExecutor::new())
    }

    #[must_use]
    pub fn with_executor(connection_string: &str, executor: FakeCommandExecutor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConnectionInner {
                connection_string: connection_string.to_owned(),
                ..ConnectionInner::default()
            })),
            executor,
        }
    }

    /// Start in the given state, e.g. `Open` to model a connection the caller already opened.
    #[must_use]
    pub fn in_state(self, state: ConnectionState) -> Self {
        self.set_state(state);
        self
    }

    /// Fail every open with `err`.
    #[must_use]
    pub fn failing_open(self, err: DriverError) -> Self {
        lock(&self.inner).fail_open = Some(err);
        self
    }

    /// Fail every begin transaction with `err`.
    #[must_use]
    pub fn failing_begin(self, err: DriverError) -> Self {
        lock(&self.inner).fail_begin = Some(err);
        self
    }

    pub fn set_state(&self, state: ConnectionState) {
        lock(&self.inner).state = state;
    }

    #[must_use]
    pub fn state_now(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    /// Physical sync opens.
    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.inner).open_count
    }

    /// Physical async opens.
    #[must_use]
    pub fn open_async_count(&self) -> usize {
        lock(&self.inner).open_async_count
    }

    /// Physical closes, sync and async.
    #[must_use]
    pub fn close_count(&self) -> usize {
        lock(&self.inner).close_count
    }

    #[must_use]
    pub fn dispose_count(&self) -> usize {
        lock(&self.inner).dispose_count
    }

    /// Commands created on this connection, in creation order.
    #[must_use]
    pub fn db_commands(&self) -> Vec<FakeDbCommand> {
        lock(&self.inner).commands.clone()
    }

    /// Transactions begun on this connection, in order.
    #[must_use]
    pub fn db_transactions(&self) -> Vec<FakeDbTransaction> {
        lock(&self.inner).transactions.clone()
    }

    #[must_use]
    pub fn enlisted(&self) -> Option<AmbientTransaction> {
        lock(&self.inner).enlisted.clone()
    }

    fn do_open(&self, is_async: bool) -> Result<(), DriverError> {
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.fail_open.clone() {
            return Err(err);
        }
        if inner.state == ConnectionState::Open {
            return Err(DriverError::invalid_operation("connection is already open"));
        }
        inner.state = ConnectionState::Open;
        if is_async {
            inner.open_async_count += 1;
        } else {
            inner.open_count += 1;
        }
        Ok(())
    }

    fn do_close(&self) {
        let mut inner = lock(&self.inner);
        inner.state = ConnectionState::Closed;
        inner.close_count += 1;
    }

    fn do_begin(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<dyn DbTransaction>, DriverError> {
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.fail_begin.clone() {
            return Err(err);
        }
        if inner.state != ConnectionState::Open {
            return Err(DriverError::invalid_operation(
                "a transaction requires an open connection",
            ));
        }
        let transaction = FakeDbTransaction::new(isolation_level);
        inner.transactions.push(transaction.clone());
        Ok(Arc::new(transaction))
    }
}

#[async_trait]
impl DbConnection for FakeDbConnection {
    fn connection_string(&self) -> String {
        lock(&self.inner).connection_string.clone()
    }

    fn set_connection_string(&mut self, connection_string: &str) {
        lock(&self.inner).connection_string = connection_string.to_owned();
    }

    fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    fn open(&mut self) -> Result<(), DriverError> {
        self.do_open(false)
    }

    async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::canceled());
        }
        self.do_open(true)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.do_close();
        Ok(())
    }

    async fn close_async(&mut self) -> Result<(), DriverError> {
        self.do_close();
        Ok(())
    }

    fn begin_transaction(
        &mut self,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<dyn DbTransaction>, DriverError> {
        self.do_begin(isolation_level)
    }

    async fn begin_transaction_async(
        &mut self,
        isolation_level: IsolationLevel,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn DbTransaction>, DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::canceled());
        }
        self.do_begin(isolation_level)
    }

    fn create_command(&mut self) -> Box<dyn DbCommand> {
        let command = FakeDbCommand::new(self.executor.clone());
        lock(&self.inner).commands.push(command.clone());
        Box::new(command)
    }

    fn enlist_transaction(
        &mut self,
        transaction: Option<&AmbientTransaction>,
    ) -> Result<(), DriverError> {
        lock(&self.inner).enlisted = transaction.cloned();
        Ok(())
    }

    fn dispose(&mut self) {
        let mut inner = lock(&self.inner);
        inner.state = ConnectionState::Closed;
        inner.dispose_count += 1;
    }
}

/// Provider handing out [`FakeDbConnection`]s and remembering them for inspection.
#[derive(Debug, Clone)]
pub struct FakeProvider {
    name: String,
    executor: FakeCommandExecutor,
    created: Arc<Mutex<Vec<FakeDbConnection>>>,
}

impl FakeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_executor(FakeCommandExecutor::new())
    }

    #[must_use]
    pub fn with_executor(executor: FakeCommandExecutor) -> Self {
        Self {
            name: "Fake".to_owned(),
            executor,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    /// Connections created so far, in order.
    #[must_use]
    pub fn created_connections(&self) -> Vec<FakeDbConnection> {
        lock(&self.created).clone()
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DbProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DbConnection>, DriverError> {
        let connection = FakeDbConnection::with_executor(connection_string, self.executor.clone());
        lock(&self.created).push(connection.clone());
        Ok(Box::new(connection))
    }
}
