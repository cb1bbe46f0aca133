use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::connection::{SharedSqliteConnection, lock_connection, run_blocking};
use crate::driver::DbTransaction;
use crate::error::DriverError;
use crate::types::IsolationLevel;

/// Native `SQLite` transaction. `SQLite` transactions belong to the connection, so this only
/// tracks completion and issues `COMMIT` / `ROLLBACK` on it.
pub struct SqliteDbTransaction {
    conn: SharedSqliteConnection,
    isolation_level: IsolationLevel,
    completed: AtomicBool,
}

impl SqliteDbTransaction {
    pub(crate) fn new(conn: SharedSqliteConnection, isolation_level: IsolationLevel) -> Self {
        Self {
            conn,
            isolation_level,
            completed: AtomicBool::new(false),
        }
    }

    fn ensure_active(&self) -> Result<(), DriverError> {
        if self.completed.load(Ordering::SeqCst) {
            return Err(DriverError::invalid_operation(
                "the sqlite transaction has already completed",
            ));
        }
        Ok(())
    }

    fn finish(&self, sql: &'static str) -> Result<(), DriverError> {
        self.ensure_active()?;
        lock_connection(&self.conn)?.execute_batch(sql)?;
        self.completed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn finish_async(
        &self,
        sql: &'static str,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.ensure_active()?;
        run_blocking(self.conn.clone(), cancel, move |conn| {
            conn.execute_batch(sql)?;
            Ok(())
        })
        .await?;
        self.completed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Debug for SqliteDbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDbTransaction")
            .field("isolation_level", &self.isolation_level)
            .field("completed", &self.completed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DbTransaction for SqliteDbTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.finish("COMMIT")
    }

    async fn commit_async(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        self.finish_async("COMMIT", cancel).await
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.finish("ROLLBACK")
    }

    async fn rollback_async(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        self.finish_async("ROLLBACK", cancel).await
    }

    fn dispose(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        let rolled_back = lock_connection(&self.conn)
            .and_then(|conn| conn.execute_batch("ROLLBACK").map_err(DriverError::from));
        if let Err(err) = rolled_back {
            tracing::debug!("rollback of disposed sqlite transaction failed: {err}");
        }
    }
}
