//! Public entry point: memory → store → background sync

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::labels::{LabelCache, LabelCacheStats};
use crate::cache::memory::{MemoryStats, MemoryTier};
use crate::config::CacheConfig;
use crate::error::{MetadataError, NotFoundError, SyncError};
use crate::metadata::labels::{Labelled, apply_label_texts, unresolved_label_ids};
use crate::metadata::source::MetadataSource;
use crate::metadata::types::{DataEntity, Enumeration, PublicEntity};
use crate::store::{DataEntityFilter, MetadataStore, SearchHit, StoreStatistics};
use crate::sync::{ProgressCallback, SyncEngine, SyncOptions, SyncResult, SyncStrategy, VersionCheck};
use crate::version::registry::GlobalVersionRegistry;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub target_id: i64,
    pub active_version_id: Option<i64>,
    pub sync_running: bool,
    pub store: StoreStatistics,
    pub memory: MemoryStats,
    pub labels: LabelCacheStats,
}

/// Metadata cache for one remote target.
///
/// Several caches may share one store; targets with identical module sets
/// then share one copy of the schema.
pub struct MetadataCache {
    config: CacheConfig,
    source: Arc<dyn MetadataSource>,
    store: Arc<MetadataStore>,
    registry: Arc<GlobalVersionRegistry>,
    engine: Arc<SyncEngine>,
    memory: MemoryTier,
    labels: LabelCache,
    target_id: i64,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl MetadataCache {
    /// Open the database under the configured cache directory
    pub fn open(config: CacheConfig, source: Arc<dyn MetadataSource>) -> Result<Self, MetadataError> {
        let store = Arc::new(MetadataStore::open(&config.db_path())?);
        Self::with_store(config, source, store)
    }

    pub fn with_store(
        config: CacheConfig,
        source: Arc<dyn MetadataSource>,
        store: Arc<MetadataStore>,
    ) -> Result<Self, MetadataError> {
        let registry = Arc::new(GlobalVersionRegistry::new(store.clone()));
        let engine = Arc::new(SyncEngine::new(store.clone(), registry.clone(), &config));
        let target_id = registry.ensure_target(&source.base_url())?;

        Ok(Self {
            memory: MemoryTier::new(config.memory.capacity, config.memory.ttl_duration()),
            labels: LabelCache::new(store.clone(), config.memory.capacity, config.labels.ttl),
            config,
            source,
            store,
            registry,
            engine,
            target_id,
            background: Mutex::new(None),
        })
    }

    pub fn target_id(&self) -> i64 {
        self.target_id
    }

    /// Purge expired labels and check the target's version, starting a
    /// background sync when the active version is missing or stale.
    pub async fn initialize(&self) -> Result<VersionCheck, MetadataError> {
        let _ = self
            .store
            .purge_expired_labels()
            .inspect_err(|e| warn!("Failed to purge expired labels: {}", e));

        let check = self.engine.check_version(self.source.as_ref()).await?;
        info!(
            "Cache initialized for target {} (version {}, sync needed: {})",
            self.target_id, check.global_version_id, check.sync_needed
        );
        if check.sync_needed {
            self.schedule_background_sync();
        }
        Ok(check)
    }

    /// Detect the remote version without syncing.
    ///
    /// Returns `(sync_needed, global_version_id)`.
    pub async fn check_version_and_sync(&self) -> Result<(bool, i64), MetadataError> {
        let check = self.engine.check_version(self.source.as_ref()).await?;
        Ok((check.sync_needed, check.global_version_id))
    }

    pub async fn get_data_entities(&self, filter: &DataEntityFilter) -> Vec<DataEntity> {
        let Some(version_id) = self.active_version_id() else {
            self.schedule_background_sync();
            return Vec::new();
        };

        let entities = self
            .store
            .query_data_entities(version_id, filter)
            .inspect_err(|e| error!("Failed to query data entities: {}", e))
            .unwrap_or_default();

        if entities.is_empty() && filter.offset == 0 && self.is_unsynced(version_id) {
            self.schedule_background_sync();
        }
        entities
    }

    pub async fn get_public_entity_schema(&self, name: &str) -> Result<Arc<PublicEntity>, MetadataError> {
        let version_id = self.require_active_version("public entity", name)?;

        if let Some(entity) = self.memory.get_public_entity(version_id, name) {
            return Ok(entity);
        }

        let stored = self
            .store
            .get_public_entity(version_id, name)
            .inspect_err(|e| error!("Failed to read public entity {}: {}", name, e))
            .ok()
            .flatten();
        let Some(mut entity) = stored else {
            debug!("Public entity {} not cached for version {}", name, version_id);
            self.schedule_background_sync();
            return Err(NotFoundError::new("public entity", name).into());
        };

        self.resolve_labels(version_id, std::slice::from_mut(&mut entity))
            .await;
        let entity = Arc::new(entity);
        self.memory.put_public_entity(version_id, entity.clone());
        Ok(entity)
    }

    pub async fn get_enumeration_info(&self, name: &str) -> Result<Arc<Enumeration>, MetadataError> {
        let version_id = self.require_active_version("enumeration", name)?;

        if let Some(enumeration) = self.memory.get_enumeration(version_id, name) {
            return Ok(enumeration);
        }

        let stored = self
            .store
            .get_enumeration(version_id, name)
            .inspect_err(|e| error!("Failed to read enumeration {}: {}", name, e))
            .ok()
            .flatten();
        let Some(mut enumeration) = stored else {
            debug!("Enumeration {} not cached for version {}", name, version_id);
            self.schedule_background_sync();
            return Err(NotFoundError::new("enumeration", name).into());
        };

        self.resolve_labels(version_id, std::slice::from_mut(&mut enumeration))
            .await;
        let enumeration = Arc::new(enumeration);
        self.memory.put_enumeration(version_id, enumeration.clone());
        Ok(enumeration)
    }

    pub async fn search(&self, text: &str, limit: usize) -> Vec<SearchHit> {
        let Some(version_id) = self.active_version_id() else {
            self.schedule_background_sync();
            return Vec::new();
        };

        self.store
            .search(version_id, text, limit)
            .inspect_err(|e| error!("Search for {:?} failed: {}", text, e))
            .unwrap_or_default()
    }

    pub async fn get_label(&self, label_id: &str) -> Option<String> {
        self.labels
            .get(
                self.source.as_ref(),
                self.active_version_id(),
                label_id,
                &self.config.language,
            )
            .await
            .inspect_err(|e| warn!("Failed to resolve label {}: {}", label_id, e))
            .ok()
            .flatten()
    }

    pub async fn get_labels_batch(&self, label_ids: &[String]) -> HashMap<String, String> {
        self.labels
            .get_batch(
                self.source.as_ref(),
                self.active_version_id(),
                label_ids,
                &self.config.language,
            )
            .await
            .inspect_err(|e| warn!("Failed to resolve {} labels: {}", label_ids.len(), e))
            .unwrap_or_default()
    }

    pub fn get_cache_statistics(&self) -> Result<CacheStatistics, MetadataError> {
        Ok(CacheStatistics {
            target_id: self.target_id,
            active_version_id: self.active_version_id(),
            sync_running: self.engine.guards().is_running(self.target_id),
            store: self.store.statistics(Some(self.target_id))?,
            memory: self.memory.stats(),
            labels: self.labels.stats(),
        })
    }

    /// Run a sync in the foreground. Without a version id the target's
    /// current version is detected first.
    pub async fn sync_metadata(
        &self,
        global_version_id: Option<i64>,
        strategy: SyncStrategy,
    ) -> Result<SyncResult, MetadataError> {
        let mut options = SyncOptions::new(strategy);
        if let Some(id) = global_version_id {
            options = options.for_version(id);
        }
        let result = self.engine.sync(self.source.as_ref(), options).await?;
        Ok(result)
    }

    pub fn recommend_sync_strategy(&self, global_version_id: i64) -> Result<SyncStrategy, MetadataError> {
        Ok(self
            .engine
            .recommend_sync_strategy(self.target_id, global_version_id)?)
    }

    pub fn on_progress(&self, callback: ProgressCallback) {
        self.engine.on_progress(callback);
    }

    /// Delete versions no target uses anymore, past the configured grace period
    pub fn prune_unused_versions(&self) -> Result<Vec<i64>, MetadataError> {
        let pruned = self
            .registry
            .prune_unreferenced(self.config.sync.prune_grace)?;
        let _ = self
            .store
            .purge_expired_labels()
            .inspect_err(|e| warn!("Failed to purge expired labels: {}", e));
        if !pruned.is_empty() {
            self.memory.invalidate_all();
            self.labels.invalidate_all();
        }
        Ok(pruned)
    }

    /// Wait for the most recently scheduled background sync, if any
    pub async fn wait_for_background_sync(&self) {
        let handle = self
            .background
            .lock()
            .map(|mut background| background.take())
            .unwrap_or_default();
        if let Some(handle) = handle {
            let _ = handle
                .await
                .inspect_err(|e| error!("Background sync task failed: {}", e));
        }
    }

    fn active_version_id(&self) -> Option<i64> {
        self.registry
            .active_version(self.target_id)
            .inspect_err(|e| error!("Failed to read active version: {}", e))
            .ok()
            .flatten()
            .map(|v| v.id)
    }

    fn is_unsynced(&self, version_id: i64) -> bool {
        !self
            .registry
            .get_version(version_id)
            .ok()
            .flatten()
            .is_some_and(|v| v.is_synced())
    }

    fn require_active_version(&self, kind: &'static str, name: &str) -> Result<i64, MetadataError> {
        match self.active_version_id() {
            Some(version_id) => Ok(version_id),
            None => {
                self.schedule_background_sync();
                Err(NotFoundError::new(kind, name).into())
            }
        }
    }

    async fn resolve_labels<T: Labelled>(&self, version_id: i64, items: &mut [T]) {
        if !self.config.labels.resolve_labels {
            return;
        }
        let ids = unresolved_label_ids(items);
        if ids.is_empty() {
            return;
        }

        match self
            .labels
            .get_batch(self.source.as_ref(), Some(version_id), &ids, &self.config.language)
            .await
        {
            Ok(resolved) => {
                apply_label_texts(items, &resolved);
            }
            Err(e) => warn!("Failed to resolve labels, returning ids only: {}", e),
        }
    }

    /// Start a sync of this target on the runtime unless one is running
    fn schedule_background_sync(&self) {
        let Ok(mut background) = self.background.lock() else {
            warn!("Background sync handle lock poisoned");
            return;
        };
        let pending = background.as_ref().is_some_and(|handle| !handle.is_finished());
        if pending || self.engine.guards().is_running(self.target_id) {
            debug!("Background sync for target {} already running", self.target_id);
            return;
        }

        let engine = self.engine.clone();
        let source = self.source.clone();
        let strategy = self.config.sync.background_strategy;
        let target_id = self.target_id;

        *background = Some(tokio::spawn(async move {
            match engine.sync(source.as_ref(), SyncOptions::new(strategy)).await {
                Ok(result) if result.success => {
                    info!(
                        "Background sync for target {} finished in {}ms",
                        target_id, result.duration_ms
                    );
                }
                Ok(result) => warn!(
                    "Background sync for target {} failed: {}",
                    target_id,
                    result.error.unwrap_or_default()
                ),
                Err(SyncError::AlreadyRunning(_)) => {
                    debug!("Background sync for target {} already running", target_id)
                }
                Err(e) => error!("Background sync for target {} failed: {}", target_id, e),
            }
        }));
    }
}
