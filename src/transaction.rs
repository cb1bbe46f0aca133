use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::driver::DbTransaction;
use crate::types::IsolationLevel;

/// Lifecycle of a [`RelationalTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    Disposed,
}

/// The logical transaction a [`crate::RelationalConnection`] is running in.
///
/// Owned transactions were begun through the connection and have their native handle
/// disposed when they complete; adopted ones came from `use_transaction` and are left alone.
pub struct RelationalTransaction {
    id: Uuid,
    native: Arc<dyn DbTransaction>,
    isolation_level: IsolationLevel,
    owned: bool,
    state: TransactionState,
}

impl RelationalTransaction {
    pub(crate) fn new(native: Arc<dyn DbTransaction>, id: Uuid, owned: bool) -> Self {
        let isolation_level = native.isolation_level();
        Self {
            id,
            native,
            isolation_level,
            owned,
            state: TransactionState::Active,
        }
    }

    #[must_use]
    pub fn transaction_id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether the native handle was begun (and is disposed) by the connection.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// The native handle, shared with every command enlisted in the transaction.
    #[must_use]
    pub fn db_transaction(&self) -> &Arc<dyn DbTransaction> {
        &self.native
    }

    /// Whether `native` is the very handle this transaction wraps.
    #[must_use]
    pub fn wraps(&self, native: &Arc<dyn DbTransaction>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.native), Arc::as_ptr(native))
    }

    pub(crate) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    /// Dispose the native handle if owned. Returns `false` when already disposed.
    pub(crate) fn dispose(&mut self) -> bool {
        if self.state == TransactionState::Disposed {
            return false;
        }
        if self.owned {
            self.native.dispose();
        }
        self.state = TransactionState::Disposed;
        true
    }
}

impl fmt::Debug for RelationalTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalTransaction")
            .field("id", &self.id)
            .field("isolation_level", &self.isolation_level)
            .field("owned", &self.owned)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
