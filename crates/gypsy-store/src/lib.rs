//! Embedded run and artifact store for gypsy.
//!
//! Provides repository traits and a redb implementation. Pipelines, runs,
//! artifacts and watermarks live in one database file; artifact bytes
//! optionally live in files next to it.

pub mod db;
pub mod error;
pub mod repo;

pub use db::RedbStore;
pub use error::{StoreError, StoreResult};
pub use repo::*;
