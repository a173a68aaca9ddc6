//! Schema synchronization
//!
//! - [`engine`]: Fetch-and-write runs, version checks and strategy recommendations
//! - [`strategy`]: What a run fetches
//! - [`progress`]: Phases and progress callbacks
//! - [`guard`]: One running sync per target
//! - [`cancel`]: Cooperative cancellation between phases

pub mod cancel;
pub mod engine;
pub mod guard;
pub mod progress;
pub mod strategy;

pub use cancel::CancellationToken;
pub use engine::{ClassOutcome, SyncEngine, SyncOptions, SyncResult, VersionCheck};
pub use progress::{ProgressCallback, SyncPhase, SyncProgress};
pub use strategy::SyncStrategy;
