use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::lock;
use crate::driver::DbDataReader;
use crate::error::DriverError;
use crate::types::DbValue;

#[derive(Debug, Default)]
struct ReaderState {
    columns: Vec<String>,
    rows: Vec<Vec<DbValue>>,
    /// Index of the current row; `None` before the first read.
    current: Option<usize>,
    records_affected: i64,
    closed: bool,
    close_count: usize,
    dispose_count: usize,
}

/// Fake cursor over fixed rows.
#[derive(Debug, Clone)]
pub struct FakeDbDataReader {
    state: Arc<Mutex<ReaderState>>,
}

impl FakeDbDataReader {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<DbValue>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReaderState {
                columns,
                rows,
                records_affected: -1,
                ..ReaderState::default()
            })),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }

    #[must_use]
    pub fn dispose_count(&self) -> usize {
        lock(&self.state).dispose_count
    }

    fn advance(&self) -> Result<bool, DriverError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(DriverError::invalid_operation("reader is closed"));
        }
        let next = state.current.map_or(0, |i| i + 1);
        state.current = Some(next);
        Ok(next < state.rows.len())
    }
}

#[async_trait]
impl DbDataReader for FakeDbDataReader {
    fn field_count(&self) -> usize {
        lock(&self.state).columns.len()
    }

    fn column_name(&self, ordinal: usize) -> Option<String> {
        lock(&self.state).columns.get(ordinal).cloned()
    }

    fn read(&mut self) -> Result<bool, DriverError> {
        self.advance()
    }

    async fn read_async(&mut self, cancel: &CancellationToken) -> Result<bool, DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::canceled());
        }
        self.advance()
    }

    fn get_value(&self, ordinal: usize) -> Result<DbValue, DriverError> {
        let state = lock(&self.state);
        state
            .current
            .and_then(|row| state.rows.get(row))
            .and_then(|row| row.get(ordinal))
            .cloned()
            .ok_or_else(|| DriverError::invalid_operation(format!("no value at ordinal {ordinal}")))
    }

    fn records_affected(&self) -> i64 {
        lock(&self.state).records_affected
    }

    fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.close_count += 1;
    }

    fn dispose(&mut self) {
        lock(&self.state).dispose_count += 1;
    }
}
