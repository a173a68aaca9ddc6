//! Sync progress reporting

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Detecting,
    Planning,
    Fetching,
    Writing,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Detecting => "detecting",
            SyncPhase::Planning => "planning",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Writing => "writing",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub current_operation: String,
    pub completed_steps: usize,
    pub total_steps: usize,
}

/// Progress observer. Errors returned here are logged and otherwise ignored.
pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) -> anyhow::Result<()> + Send + Sync>;

/// Registered progress callbacks, notified in registration order
#[derive(Default, Clone)]
pub struct ProgressReporter {
    callbacks: Arc<RwLock<Vec<ProgressCallback>>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: ProgressCallback) {
        match self.callbacks.write() {
            Ok(mut callbacks) => callbacks.push(callback),
            Err(_) => warn!("Progress callback registry poisoned, callback dropped"),
        }
    }

    /// Deliver an update to every callback. A failing or panicking callback
    /// never affects the sync run or the other callbacks.
    pub fn report(&self, progress: &SyncProgress) {
        debug!(
            "Sync progress: {} {} ({}/{})",
            progress.phase.as_str(),
            progress.current_operation,
            progress.completed_steps,
            progress.total_steps
        );

        let callbacks = match self.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(_) => return,
        };

        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(progress))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Progress callback failed: {:#}", e),
                Err(_) => warn!("Progress callback panicked"),
            }
        }
    }
}
