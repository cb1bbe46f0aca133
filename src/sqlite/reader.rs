use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::DbDataReader;
use crate::error::DriverError;
use crate::types::DbValue;

/// Cursor over rows materialized when the statement ran.
#[derive(Debug)]
pub struct SqliteDbDataReader {
    columns: Vec<String>,
    rows: Vec<Vec<DbValue>>,
    current: Option<usize>,
    records_affected: i64,
    closed: bool,
}

impl SqliteDbDataReader {
    pub(crate) fn new(
        columns: Vec<String>,
        rows: Vec<Vec<DbValue>>,
        records_affected: i64,
    ) -> Self {
        Self {
            columns,
            rows,
            current: None,
            records_affected,
            closed: false,
        }
    }

    fn advance(&mut self) -> Result<bool, DriverError> {
        if self.closed {
            return Err(DriverError::invalid_operation("the reader is closed"));
        }
        let next = self.current.map_or(0, |i| i + 1);
        self.current = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }
}

#[async_trait]
impl DbDataReader for SqliteDbDataReader {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, ordinal: usize) -> Option<String> {
        self.columns.get(ordinal).cloned()
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
        self.current
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(ordinal))
            .cloned()
            .ok_or_else(|| DriverError::invalid_operation(format!("no value at ordinal {ordinal}")))
    }

    fn records_affected(&self) -> i64 {
        self.records_affected
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn dispose(&mut self) {
        self.closed = true;
        self.rows.clear();
    }
}
