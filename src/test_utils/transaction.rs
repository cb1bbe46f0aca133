use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::lock;
use crate::driver::DbTransaction;
use crate::error::DriverError;
use crate::types::IsolationLevel;

#[derive(Debug, Default)]
struct TransactionState {
    isolation_level: IsolationLevel,
    commit_count: usize,
    rollback_count: usize,
    dispose_count: usize,
    fail_commit: Option<DriverError>,
    fail_rollback: Option<DriverError>,
}

/// Fake native transaction counting commits, rollbacks and disposals.
#[derive(Debug, Clone, Default)]
pub struct FakeDbTransaction {
    state: Arc<Mutex<TransactionState>>,
}

impl FakeDbTransaction {
    #[must_use]
    pub fn new(isolation_level: IsolationLevel) -> Self {
        Self {
            state: Arc::new(Mutex::new(TransactionState {
                isolation_level,
                ..TransactionState::default()
            })),
        }
    }

    /// Make every commit fail with `err`.
    #[must_use]
    pub fn failing_commit(self, err: DriverError) -> Self {
        lock(&self.state).fail_commit = Some(err);
        self
    }

    /// Make every rollback fail with `err`.
    #[must_use]
    pub fn failing_rollback(self, err: DriverError) -> Self {
        lock(&self.state).fail_rollback = Some(err);
        self
    }

    #[must_use]
    pub fn commit_count(&self) -> usize {
        lock(&self.state).commit_count
    }

    #[must_use]
    pub fn rollback_count(&self) -> usize {
        lock(&self.state).rollback_count
    }

    #[must_use]
    pub fn dispose_count(&self) -> usize {
        lock(&self.state).dispose_count
    }

    fn do_commit(&self) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_commit.clone() {
            return Err(err);
        }
        state.commit_count += 1;
        Ok(())
    }

    fn do_rollback(&self) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_rollback.clone() {
            return Err(err);
        }
        state.rollback_count += 1;
        Ok(())
    }
}

#[async_trait]
impl DbTransaction for FakeDbTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        lock(&self.state).isolation_level
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.do_commit()
    }

    async fn commit_async(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::canceled());
        }
        self.do_commit()
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.do_rollback()
    }

    async fn rollback_async(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::canceled());
        }
        self.do_rollback()
    }

    fn dispose(&self) {
        lock(&self.state).dispose_count += 1;
    }
}
