use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::command::SqliteDbCommand;
use super::transaction::SqliteDbTransaction;
use crate::driver::{DbCommand, DbConnection, DbTransaction};
use crate::error::DriverError;
use crate::types::{ConnectionState, IsolationLevel};

/// A `rusqlite` connection shared between the connection, its commands and its transaction.
pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

pub(crate) fn lock_connection(
    conn: &SharedSqliteConnection,
) -> Result<MutexGuard<'_, rusqlite::Connection>, DriverError> {
    conn.lock()
        .map_err(|_| DriverError::other("sqlite connection mutex poisoned"))
}

/// Run `func` against the connection on the blocking pool. Cancelling `cancel` interrupts
/// the statement in flight.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    cancel: &CancellationToken,
    func: F,
) -> Result<R, DriverError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DriverError> + Send + 'static,
    R: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(DriverError::canceled());
    }
    let interrupt = lock_connection(&conn)?.get_interrupt_handle();
    let task = tokio::task::spawn_blocking(move || {
        let mut guard = lock_connection(&conn)?;
        func(&mut guard)
    });
    tokio::select! {
        joined = task => joined
            .map_err(|e| DriverError::other(format!("sqlite spawn_blocking join error: {e}")))?,
        () = cancel.cancelled() => {
            interrupt.interrupt();
            Err(DriverError::canceled())
        }
    }
}

/// Extract the database path from `Data Source=...` / `Filename=...` or a bare path.
#[must_use]
pub fn data_source(connection_string: &str) -> String {
    for pair in connection_string.split(';') {
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            if key.eq_ignore_ascii_case("data source") || key.eq_ignore_ascii_case("filename") {
                return value.trim().to_owned();
            }
        }
    }
    connection_string.trim().to_owned()
}

/// Native `SQLite` connection.
pub struct SqliteDbConnection {
    connection_string: String,
    conn: Option<SharedSqliteConnection>,
}

impl SqliteDbConnection {
    #[must_use]
    pub fn new(connection_string: &str) -> Self {
        Self {
            connection_string: connection_string.to_owned(),
            conn: None,
        }
    }

    fn handle(&self) -> Result<SharedSqliteConnection, DriverError> {
        self.conn
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| DriverError::invalid_operation("the sqlite connection is not open"))
    }

    fn ensure_closed(&self) -> Result<(), DriverError> {
        if self.conn.is_some() {
            return Err(DriverError::invalid_operation(
                "the sqlite connection is already open",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SqliteDbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDbConnection")
            .field("connection_string", &self.connection_string)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

#[async_trait]
impl DbConnection for SqliteDbConnection {
    fn connection_string(&self) -> String {
        self.connection_string.clone()
    }

    fn set_connection_string(&mut self, connection_string: &str) {
        connection_string.clone_into(&mut self.connection_string);
    }

    fn state(&self) -> ConnectionState {
        if self.conn.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn open(&mut self) -> Result<(), DriverError> {
        self.ensure_closed()?;
        let conn = rusqlite::Connection::open(data_source(&self.connection_string))?;
        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), DriverError> {
        self.ensure_closed()?;
        if cancel.is_cancelled() {
            return Err(DriverError::canceled());
        }
        let path = data_source(&self.connection_string);
        let conn = tokio::task::spawn_blocking(move || rusqlite::Connection::open(path))
            .await
            .map_err(|e| DriverError::other(format!("sqlite spawn_blocking join error: {e}")))??;
        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.conn = None;
        Ok(())
    }

    async fn close_async(&mut self) -> Result<(), DriverError> {
        self.conn = None;
        Ok(())
    }

    fn begin_transaction(
        &mut self,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<dyn DbTransaction>, DriverError> {
        let handle = self.handle()?;
        lock_connection(&handle)?.execute_batch(begin_statement(isolation_level))?;
        Ok(Arc::new(SqliteDbTransaction::new(handle, isolation_level)))
    }

    async fn begin_transaction_async(
        &mut self,
        isolation_level: IsolationLevel,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn DbTransaction>, DriverError> {
        let handle = self.handle()?;
        run_blocking(Arc::clone(&handle), cancel, move |conn| {
            conn.execute_batch(begin_statement(isolation_level))?;
            Ok(())
        })
        .await?;
        Ok(Arc::new(SqliteDbTransaction::new(handle, isolation_level)))
    }

    fn create_command(&mut self) -> Box<dyn DbCommand> {
        Box::new(SqliteDbCommand::new(self.conn.clone()))
    }

    fn dispose(&mut self) {
        self.conn = None;
    }
}

fn begin_statement(isolation_level: IsolationLevel) -> &'static str {
    match isolation_level {
        IsolationLevel::Serializable | IsolationLevel::Snapshot => "BEGIN IMMEDIATE",
        _ => "BEGIN DEFERRED",
    }
}
