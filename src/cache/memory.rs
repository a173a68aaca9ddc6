//! Bounded in-memory tier in front of the store

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mini_moka::sync::Cache;
use serde::Serialize;

use crate::metadata::types::{Enumeration, PublicEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ObjectKind {
    PublicEntity,
    Enumeration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoryKey {
    version_id: i64,
    kind: ObjectKind,
    name: String,
}

#[derive(Debug, Clone)]
enum CachedObject {
    PublicEntity(Arc<PublicEntity>),
    Enumeration(Arc<Enumeration>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Per-process object cache keyed by version, object kind and name.
/// Entries expire after the configured TTL; the least recently used entries
/// are evicted beyond capacity.
pub struct MemoryTier {
    objects: Cache<MemoryKey, CachedObject>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryTier {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            objects: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(version_id: i64, kind: ObjectKind, name: &str) -> MemoryKey {
        MemoryKey {
            version_id,
            kind,
            name: name.to_string(),
        }
    }

    fn lookup(&self, key: &MemoryKey) -> Option<CachedObject> {
        let found = self.objects.get(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn get_public_entity(&self, version_id: i64, name: &str) -> Option<Arc<PublicEntity>> {
        match self.lookup(&Self::key(version_id, ObjectKind::PublicEntity, name))? {
            CachedObject::PublicEntity(entity) => Some(entity),
            CachedObject::Enumeration(_) => None,
        }
    }

    pub fn put_public_entity(&self, version_id: i64, entity: Arc<PublicEntity>) {
        let key = Self::key(version_id, ObjectKind::PublicEntity, &entity.name);
        self.objects.insert(key, CachedObject::PublicEntity(entity));
    }

    pub fn get_enumeration(&self, version_id: i64, name: &str) -> Option<Arc<Enumeration>> {
        match self.lookup(&Self::key(version_id, ObjectKind::Enumeration, name))? {
            CachedObject::Enumeration(enumeration) => Some(enumeration),
            CachedObject::PublicEntity(_) => None,
        }
    }

    pub fn put_enumeration(&self, version_id: i64, enumeration: Arc<Enumeration>) {
        let key = Self::key(version_id, ObjectKind::Enumeration, &enumeration.name);
        self.objects
            .insert(key, CachedObject::Enumeration(enumeration));
    }

    pub fn invalidate_all(&self) {
        self.objects.invalidate_all();
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.objects.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
