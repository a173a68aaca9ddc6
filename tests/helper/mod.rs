#![allow(dead_code)]

mod source;

pub use source::*;

use std::sync::Arc;

use metadata_cache::CacheConfig;
use metadata_cache::store::MetadataStore;
use metadata_cache::sync::SyncEngine;
use metadata_cache::version::registry::GlobalVersionRegistry;

/// In-memory store shared by every target of a test
pub fn create_test_store() -> Arc<MetadataStore> {
    Arc::new(MetadataStore::open_in_memory().unwrap())
}

/// Config with short fetch timeouts so timeout tests stay fast
pub fn create_test_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.sync.fetch_timeout = 2_000;
    config
}

pub fn create_test_engine(
    store: &Arc<MetadataStore>,
    config: &CacheConfig,
) -> (Arc<SyncEngine>, Arc<GlobalVersionRegistry>) {
    let registry = Arc::new(GlobalVersionRegistry::new(store.clone()));
    let engine = Arc::new(SyncEngine::new(store.clone(), registry.clone(), config));
    (engine, registry)
}
