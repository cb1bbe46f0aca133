//! Seam for retry policies around units of work.
//!
//! Only [`NonRetryingExecutionStrategy`] ships; a retrying strategy would replay the whole
//! operation, so operations must be safe to run again from their starting state.

use tokio_util::sync::CancellationToken;

use crate::connection::RelationalConnection;
use crate::error::RelationalDbError;
use crate::types::IsolationLevel;

/// Runs operations, possibly more than once.
pub trait ExecutionStrategy {
    fn retries_on_failure(&self) -> bool;

    /// Run `operation` against `state`.
    ///
    /// # Errors
    /// Returns the operation's error once the strategy gives up.
    fn execute<S, R, F>(&self, state: &mut S, operation: F) -> Result<R, RelationalDbError>
    where
        F: FnMut(&mut S) -> Result<R, RelationalDbError>;

    /// Async twin of [`ExecutionStrategy::execute`].
    ///
    /// # Errors
    /// Returns `Canceled` if `cancel` fires before an attempt, or the operation's error once
    /// the strategy gives up.
    #[allow(async_fn_in_trait)]
    async fn execute_async<S, R, F>(
        &self,
        state: &mut S,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<R, RelationalDbError>
    where
        F: AsyncFnMut(&mut S) -> Result<R, RelationalDbError>;

    /// Run `operation` inside a transaction begun on `connection`, committing on success and
    /// rolling back on failure.
    ///
    /// # Errors
    /// Returns begin, operation or commit failures.
    fn execute_in_transaction<R, F>(
        &self,
        connection: &mut RelationalConnection,
        isolation_level: Option<IsolationLevel>,
        mut operation: F,
    ) -> Result<R, RelationalDbError>
    where
        F: FnMut(&mut RelationalConnection) -> Result<R, RelationalDbError>,
    {
        self.execute(connection, |connection| {
            connection.begin_transaction(isolation_level)?;
            match operation(connection) {
                Ok(result) => {
                    connection.commit_transaction()?;
                    Ok(result)
                }
                Err(err) => {
                    if let Err(rollback_err) = connection.rollback_transaction() {
                        tracing::warn!("rollback after a failed operation failed: {rollback_err}");
                    }
                    Err(err)
                }
            }
        })
    }
}

/// Runs every operation exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonRetryingExecutionStrategy;

impl ExecutionStrategy for NonRetryingExecutionStrategy {
    fn retries_on_failure(&self) -> bool {
        false
    }

    fn execute<S, R, F>(&self, state: &mut S, mut operation: F) -> Result<R, RelationalDbError>
    where
        F: FnMut(&mut S) -> Result<R, RelationalDbError>,
    {
        operation(state)
    }

    async fn execute_async<S, R, F>(
        &self,
        state: &mut S,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> Result<R, RelationalDbError>
    where
        F: AsyncFnMut(&mut S) -> Result<R, RelationalDbError>,
    {
        if cancel.is_cancelled() {
            return Err(RelationalDbError::Canceled);
        }
        operation(state).await
    }
}
