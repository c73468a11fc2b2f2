//! # prompter-engine
//!
//! Content synchronization and conflict-resolution engine: a tiered field
//! store, the layer reconciler (pending > local > remote > fallback), the
//! grace-period guard that keeps an in-flight re-fetch from clobbering a
//! save that just landed, and the sync scheduler.
//!
//! Build a [`ContentEngine`] from an `EngineConfig` and a state directory,
//! feed it confirmed saves and fetch results, and call
//! [`scheduler::maybe_sync`] from your triggers.

pub mod diff;
pub mod engine;
pub mod error;
pub mod guard;
pub mod layers;
pub mod remote;
pub mod scheduler;
pub mod store;

pub use engine::{ApplySummary, ContentEngine, FetchSummary, SyncState};
pub use error::EngineError;
pub use guard::{GraceGuard, GraceWindow};
pub use layers::Layers;
pub use remote::{ContentSource, RemoteClient};
pub use scheduler::{maybe_sync, SyncOutcome, SyncSkip};
pub use store::{FieldStore, Tier};
