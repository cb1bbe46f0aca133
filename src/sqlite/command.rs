use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value;
use tokio_util::sync::CancellationToken;

use super::connection::{SharedSqliteConnection, lock_connection, run_blocking};
use super::params::{bind_statement, sqlite_to_db_value};
use super::reader::SqliteDbDataReader;
use crate::driver::{DbCommand, DbDataReader, DbParameter, DbTransaction};
use crate::error::DriverError;
use crate::types::DbValue;

/// Native `SQLite` command. Statements are prepared per execution.
///
/// `SQLite` has no statement timeout, so the command timeout bounds lock waits only
/// (`busy_timeout`). A zero timeout means no limit.
pub struct SqliteDbCommand {
    conn: Option<SharedSqliteConnection>,
    command_text: String,
    command_timeout: Duration,
    transaction: Option<Arc<dyn DbTransaction>>,
    parameters: Vec<DbParameter>,
}

impl SqliteDbCommand {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

    pub(crate) fn new(conn: Option<SharedSqliteConnection>) -> Self {
        Self {
            conn,
            command_text: String::new(),
            command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
            transaction: None,
            parameters: Vec::new(),
        }
    }

    fn handle(&self) -> Result<SharedSqliteConnection, DriverError> {
        self.conn
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| DriverError::invalid_operation("the sqlite connection is not open"))
    }

    fn run<R>(
        &self,
        func: fn(&rusqlite::Connection, &str, &[DbParameter], Duration) -> Result<R, DriverError>,
    ) -> Result<R, DriverError> {
        let handle = self.handle()?;
        let conn = lock_connection(&handle)?;
        func(&conn, &self.command_text, &self.parameters, self.command_timeout)
    }

    async fn run_async<R: Send + 'static>(
        &self,
        func: fn(&rusqlite::Connection, &str, &[DbParameter], Duration) -> Result<R, DriverError>,
        cancel: &CancellationToken,
    ) -> Result<R, DriverError> {
        let handle = self.handle()?;
        let text = self.command_text.clone();
        let parameters = self.parameters.clone();
        let timeout = self.command_timeout;
        run_blocking(handle, cancel, move |conn| {
            func(conn, &text, &parameters, timeout)
        })
        .await
    }
}

impl fmt::Debug for SqliteDbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDbCommand")
            .field("command_text", &self.command_text)
            .field("command_timeout", &self.command_timeout)
            .field("parameters", &self.parameters)
            .field("in_transaction", &self.transaction.is_some())
            .finish_non_exhaustive()
    }
}

/// Longest busy wait `SQLite` accepts, in milliseconds.
const UNBOUNDED_LOCK_WAIT: Duration = Duration::from_millis(2_147_483_647);

fn apply_lock_wait(conn: &rusqlite::Connection, timeout: Duration) -> Result<(), DriverError> {
    let wait = if timeout.is_zero() || timeout > UNBOUNDED_LOCK_WAIT {
        UNBOUNDED_LOCK_WAIT
    } else {
        timeout
    };
    conn.busy_timeout(wait)?;
    Ok(())
}

fn non_query(
    conn: &rusqlite::Connection,
    text: &str,
    parameters: &[DbParameter],
    timeout: Duration,
) -> Result<i64, DriverError> {
    apply_lock_wait(conn, timeout)?;
    let mut stmt = conn.prepare(text)?;
    bind_statement(&mut stmt, parameters)?;
    if stmt.column_count() > 0 {
        let mut rows = stmt.raw_query();
        while rows.next()?.is_some() {}
        return Ok(-1);
    }
    let changed = stmt.raw_execute()?;
    Ok(i64::try_from(changed).unwrap_or(i64::MAX))
}

fn scalar(
    conn: &rusqlite::Connection,
    text: &str,
    parameters: &[DbParameter],
    timeout: Duration,
) -> Result<DbValue, DriverError> {
    apply_lock_wait(conn, timeout)?;
    let mut stmt = conn.prepare(text)?;
    bind_statement(&mut stmt, parameters)?;
    let has_columns = stmt.column_count() > 0;
    let mut rows = stmt.raw_query();
    match rows.next()? {
        Some(row) if has_columns => Ok(sqlite_to_db_value(row.get::<_, Value>(0)?)),
        _ => Ok(DbValue::Null),
    }
}

fn query_rows(
    conn: &rusqlite::Connection,
    text: &str,
    parameters: &[DbParameter],
    timeout: Duration,
) -> Result<SqliteDbDataReader, DriverError> {
    apply_lock_wait(conn, timeout)?;
    let mut stmt = conn.prepare(text)?;
    bind_statement(&mut stmt, parameters)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let readonly = stmt.readonly();

    let mut materialized = Vec::new();
    {
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(sqlite_to_db_value(row.get::<_, Value>(idx)?));
            }
            materialized.push(values);
        }
    }

    let records_affected = if readonly {
        -1
    } else {
        i64::try_from(conn.changes()).unwrap_or(-1)
    };
    Ok(SqliteDbDataReader::new(columns, materialized, records_affected))
}

#[async_trait]
impl DbCommand for SqliteDbCommand {
    fn command_text(&self) -> String {
        self.command_text.clone()
    }

    fn set_command_text(&mut self, text: &str) {
        text.clone_into(&mut self.command_text);
    }

    fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    fn set_transaction(&mut self, transaction: Option<Arc<dyn DbTransaction>>) {
        self.transaction = transaction;
    }

    fn add_parameter(&mut self, parameter: DbParameter) {
        self.parameters.push(parameter);
    }

    fn parameters(&self) -> Vec<DbParameter> {
        self.parameters.clone()
    }

    fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    fn execute_non_query(&mut self) -> Result<i64, DriverError> {
        self.run(non_query)
    }

    fn execute_scalar(&mut self) -> Result<DbValue, DriverError> {
        self.run(scalar)
    }

    fn execute_reader(&mut self) -> Result<Box<dyn DbDataReader>, DriverError> {
        let reader = self.run(query_rows)?;
        Ok(Box::new(reader))
    }

    async fn execute_non_query_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<i64, DriverError> {
        self.run_async(non_query, cancel).await
    }

    async fn execute_scalar_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<DbValue, DriverError> {
        self.run_async(scalar, cancel).await
    }

    async fn execute_reader_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DbDataReader>, DriverError> {
        let reader = self.run_async(query_rows, cancel).await?;
        Ok(Box::new(reader))
    }

    fn dispose(&mut self) {
        self.parameters.clear();
        self.transaction = None;
        self.conn = None;
    }
}
