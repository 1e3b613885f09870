//! Build orchestration and change polling for gypsy.
//!
//! The builder runs one pipeline revision inside a sandbox and reports the
//! result. The poller watches materials and hands new revisions to a
//! dispatcher, which runs the builder locally or submits an external job.

pub mod backend;
pub mod builder;
pub mod dispatch;
pub mod external;
pub mod poller;
pub mod sources;

pub use backend::{BuildBackend, StoreBackend};
pub use builder::{BuildOutcome, BuildPhase, Builder};
pub use dispatch::{Dispatcher, LocalDispatcher};
pub use external::{ExternalJob, NomadDispatcher};
pub use poller::{CycleReport, Poller};
pub use sources::SourceRegistry;

#[cfg(test)]
pub(crate) mod testing;
