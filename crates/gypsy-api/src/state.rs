//! Application state.

use gypsy_store::RedbStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: RedbStore,
}

impl AppState {
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }
}
