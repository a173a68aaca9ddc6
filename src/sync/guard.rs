//! Per-target single-flight guard for sync runs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::sync::strategy::SyncStrategy;

/// State of a running sync, held while its permit is alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSyncState {
    pub started_at: DateTime<Utc>,
    pub strategy: SyncStrategy,
}

type StateMap = HashMap<i64, TargetSyncState>;

/// Hands out at most one [`SyncPermit`] per target at a time
#[derive(Debug, Clone, Default)]
pub struct SyncGuards {
    states: Arc<Mutex<StateMap>>,
}

impl SyncGuards {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateMap> {
        // The map holds no invariants a panicking holder could break
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `None` when a sync for the target is already running
    pub fn try_acquire(&self, target_id: i64, strategy: SyncStrategy) -> Option<SyncPermit> {
        let mut states = self.lock();
        if states.contains_key(&target_id) {
            debug!("Sync for target {} already in flight", target_id);
            return None;
        }

        states.insert(
            target_id,
            TargetSyncState {
                started_at: Utc::now(),
                strategy,
            },
        );
        Some(SyncPermit {
            states: self.states.clone(),
            target_id,
        })
    }

    pub fn is_running(&self, target_id: i64) -> bool {
        self.lock().contains_key(&target_id)
    }

    pub fn state(&self, target_id: i64) -> Option<TargetSyncState> {
        self.lock().get(&target_id).cloned()
    }
}

/// Releases the target's slot when dropped
#[derive(Debug)]
pub struct SyncPermit {
    states: Arc<Mutex<StateMap>>,
    target_id: i64,
}

impl SyncPermit {
    pub fn target_id(&self) -> i64 {
        self.target_id
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.remove(&self.target_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_target_is_refused_until_release() {
        let guards = SyncGuards::new();

        let permit = guards.try_acquire(1, SyncStrategy::Full).unwrap();
        assert!(guards.try_acquire(1, SyncStrategy::Full).is_none());
        assert!(guards.is_running(1));
        assert_eq!(guards.state(1).unwrap().strategy, SyncStrategy::Full);

        drop(permit);

        assert!(!guards.is_running(1));
        assert!(guards.try_acquire(1, SyncStrategy::Full).is_some());
    }

    #[test]
    fn targets_are_guarded_independently() {
        let guards = SyncGuards::new();

        let first = guards.try_acquire(1, SyncStrategy::Full);
        let second = guards.try_acquire(2, SyncStrategy::EntitiesOnly);

        assert!(first.is_some());
        assert_eq!(second.map(|p| p.target_id()), Some(2));
    }
}
