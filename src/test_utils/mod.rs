//! In-memory fake driver for exercising the runtime without a database.
//!
//! Every fake is a cheap, cloneable handle over shared state, so a test can keep one clone
//! to inspect counters while the runtime owns another.

mod command;
mod connection;
mod reader;
mod transaction;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::DbTransaction;

pub use command::{FakeCommandExecutor, FakeDbCommand};
pub use connection::{FakeDbConnection, FakeProvider};
pub use reader::FakeDbDataReader;
pub use transaction::FakeDbTransaction;

pub(crate) fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether two native transaction handles are the same object.
#[must_use]
pub fn same_transaction(a: &Arc<dyn DbTransaction>, b: &Arc<dyn DbTransaction>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
