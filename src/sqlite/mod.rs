//! `SQLite` backend built on `rusqlite`.
//!
//! Statements run on tokio's blocking pool for the async paths; cancelling the token
//! interrupts the statement in flight.

mod command;
mod connection;
mod params;
mod reader;
mod transaction;

use crate::driver::{DbConnection, DbProvider};
use crate::error::DriverError;

pub use command::SqliteDbCommand;
pub use connection::{SqliteDbConnection, data_source};
pub use params::{bind_statement, db_value_to_sqlite, sqlite_to_db_value};
pub use reader::SqliteDbDataReader;
pub use transaction::SqliteDbTransaction;

/// Provider creating [`SqliteDbConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DbProvider for SqliteProvider {
    fn name(&self) -> &str {
        "Sqlite"
    }

    fn create_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DbConnection>, DriverError> {
        Ok(Box::new(SqliteDbConnection::new(connection_string)))
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::driver::{DbCommand, DbParameter, DbTransaction};
    use crate::types::{DbValue, IsolationLevel};

    fn open_memory() -> Box<dyn DbConnection> {
        let mut conn = SqliteProvider::new()
            .create_connection("Data Source=:memory:")
            .expect("create");
        conn.open().expect("open");
        conn
    }

    fn run(conn: &mut dyn DbConnection, sql: &str) -> i64 {
        let mut cmd = conn.create_command();
        cmd.set_command_text(sql);
        cmd.execute_non_query().expect("execute")
    }

    #[test]
    fn non_query_scalar_and_reader() {
        let mut conn = open_memory();
        run(conn.as_mut(), "CREATE TABLE t (id INTEGER, name TEXT)");
        assert_eq!(run(conn.as_mut(), "INSERT INTO t VALUES (1, 'a'), (2, 'b')"), 2);

        let mut cmd = conn.create_command();
        cmd.set_command_text("SELECT COUNT(*) FROM t WHERE id > @min");
        cmd.add_parameter(DbParameter::new("@min", DbValue::Int(0)));
        assert_eq!(cmd.execute_scalar().expect("scalar"), DbValue::BigInt(2));

        let mut cmd = conn.create_command();
        cmd.set_command_text("SELECT id, name FROM t ORDER BY id");
        let mut reader = cmd.execute_reader().expect("reader");
        assert_eq!(reader.field_count(), 2);
        assert_eq!(reader.column_name(1).as_deref(), Some("name"));
        assert!(reader.read().expect("row"));
        assert_eq!(reader.get_value(1).expect("value"), DbValue::Text("a".into()));
        assert!(reader.read().expect("row"));
        assert!(!reader.read().expect("end"));
        assert_eq!(reader.records_affected(), -1);
    }

    #[test]
    fn scalar_of_empty_result_is_null() {
        let mut conn = open_memory();
        run(conn.as_mut(), "CREATE TABLE t (id INTEGER)");
        let mut cmd = conn.create_command();
        cmd.set_command_text("SELECT id FROM t");
        assert_eq!(cmd.execute_scalar().expect("scalar"), DbValue::Null);
    }

    #[test]
    fn rollback_discards_changes() {
        let mut conn = open_memory();
        run(conn.as_mut(), "CREATE TABLE t (id INTEGER)");
        let tx = conn
            .begin_transaction(IsolationLevel::Unspecified)
            .expect("begin");
        run(conn.as_mut(), "INSERT INTO t VALUES (1)");
        tx.rollback().expect("rollback");
        assert!(tx.commit().is_err());

        let mut cmd = conn.create_command();
        cmd.set_command_text("SELECT COUNT(*) FROM t");
        assert_eq!(cmd.execute_scalar().expect("scalar"), DbValue::BigInt(0));
    }

    #[tokio::test]
    async fn async_paths_run_on_blocking_pool() {
        let mut conn = SqliteProvider::new()
            .create_connection(":memory:")
            .expect("create");
        let cancel = CancellationToken::new();
        conn.open_async(&cancel).await.expect("open");
        let mut cmd = conn.create_command();
        cmd.set_command_text("SELECT 40 + 2");
        assert_eq!(
            cmd.execute_scalar_async(&cancel).await.expect("scalar"),
            DbValue::BigInt(42)
        );
    }

    #[tokio::test]
    async fn cancelled_token_fails_before_running() {
        let mut conn = open_memory();
        let mut cmd = conn.create_command();
        cmd.set_command_text("SELECT 1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cmd.execute_scalar_async(&cancel).await.expect_err("canceled");
        assert!(err.is_canceled());
    }
}
