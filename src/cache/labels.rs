//! Label text cache: memory, then store, then the remote source

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mini_moka::sync::Cache;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::metadata::source::MetadataSource;
use crate::metadata::types::Label;
use crate::store::MetadataStore;

/// (global version, label id, language). Labels looked up before any
/// version is active are only kept in memory.
type LabelKey = (Option<i64>, String, String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCacheStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub remote_fetches: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    remote_fetches: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

pub struct LabelCache {
    memory: Cache<LabelKey, String>,
    store: Arc<MetadataStore>,
    ttl_ms: i64,
    counters: Counters,
}

impl LabelCache {
    pub fn new(store: Arc<MetadataStore>, capacity: u64, ttl_ms: i64) -> Self {
        let ttl = Duration::from_millis(ttl_ms.max(0) as u64);
        Self {
            memory: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            store,
            ttl_ms,
            counters: Counters::default(),
        }
    }

    fn key(version_id: Option<i64>, label_id: &str, language: &str) -> LabelKey {
        (version_id, label_id.to_string(), language.to_string())
    }

    pub async fn get(
        &self,
        source: &dyn MetadataSource,
        version_id: Option<i64>,
        label_id: &str,
        language: &str,
    ) -> Result<Option<String>, SourceError> {
        let key = Self::key(version_id, label_id, language);
        let ids = [label_id.to_string()];

        if let Some(text) = self.memory.get(&key) {
            Counters::add(&self.counters.memory_hits, 1);
            self.record_hits(version_id, &ids, language);
            return Ok(Some(text));
        }

        if let Some(text) = self
            .stored(version_id, &ids, language)
            .remove(label_id)
        {
            Counters::add(&self.counters.store_hits, 1);
            self.memory.insert(key, text.clone());
            self.record_hits(version_id, &ids, language);
            return Ok(Some(text));
        }

        Counters::add(&self.counters.remote_fetches, 1);
        let Some(text) = source.fetch_label(label_id, language).await? else {
            Counters::add(&self.counters.misses, 1);
            return Ok(None);
        };

        self.persist(version_id, &HashMap::from([(label_id.to_string(), text.clone())]), language);
        Ok(Some(text))
    }

    /// Resolve many labels. Everything not in memory or the store is fetched
    /// with a single batch call; ids unknown remotely are absent from the map.
    pub async fn get_batch(
        &self,
        source: &dyn MetadataSource,
        version_id: Option<i64>,
        label_ids: &[String],
        language: &str,
    ) -> Result<HashMap<String, String>, SourceError> {
        let wanted: BTreeSet<&String> = label_ids.iter().collect();
        let mut resolved = HashMap::with_capacity(wanted.len());

        let mut remaining = Vec::new();
        for label_id in wanted {
            match self.memory.get(&Self::key(version_id, label_id, language)) {
                Some(text) => {
                    resolved.insert(label_id.clone(), text);
                }
                None => remaining.push(label_id.clone()),
            }
        }
        Counters::add(&self.counters.memory_hits, resolved.len());

        if !remaining.is_empty() {
            let stored = self.stored(version_id, &remaining, language);
            Counters::add(&self.counters.store_hits, stored.len());
            for (label_id, text) in &stored {
                self.memory
                    .insert(Self::key(version_id, label_id, language), text.clone());
            }
            remaining.retain(|id| !stored.contains_key(id));
            resolved.extend(stored);
        }

        let cached: Vec<String> = resolved.keys().cloned().collect();
        self.record_hits(version_id, &cached, language);

        if remaining.is_empty() {
            return Ok(resolved);
        }

        debug!("Fetching {} labels remotely", remaining.len());
        Counters::add(&self.counters.remote_fetches, 1);
        let fetched = source.fetch_labels_batch(&remaining, language).await?;
        Counters::add(
            &self.counters.misses,
            remaining.iter().filter(|id| !fetched.contains_key(*id)).count(),
        );

        self.persist(version_id, &fetched, language);
        resolved.extend(fetched);
        Ok(resolved)
    }

    pub fn stats(&self) -> LabelCacheStats {
        LabelCacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            remote_fetches: self.counters.remote_fetches.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    pub fn invalidate_all(&self) {
        self.memory.invalidate_all();
    }

    fn stored(
        &self,
        version_id: Option<i64>,
        label_ids: &[String],
        language: &str,
    ) -> HashMap<String, String> {
        let Some(version_id) = version_id else {
            return HashMap::new();
        };
        self.store
            .get_labels(version_id, label_ids, language)
            .inspect_err(|e| warn!("Failed to read labels from store: {}", e))
            .unwrap_or_default()
    }

    fn record_hits(&self, version_id: Option<i64>, label_ids: &[String], language: &str) {
        let Some(version_id) = version_id else {
            return;
        };
        let _ = self
            .store
            .record_label_hits(version_id, label_ids, language)
            .inspect_err(|e| debug!("Failed to record label hits: {}", e));
    }

    fn persist(&self, version_id: Option<i64>, texts: &HashMap<String, String>, language: &str) {
        for (label_id, text) in texts {
            self.memory
                .insert(Self::key(version_id, label_id, language), text.clone());
        }

        let Some(version_id) = version_id else {
            return;
        };
        let labels: Vec<Label> = texts
            .iter()
            .map(|(id, value)| Label {
                id: id.clone(),
                language: language.to_string(),
                value: value.clone(),
            })
            .collect();
        let _ = self
            .store
            .upsert_labels(version_id, &labels, self.ttl_ms)
            .inspect_err(|e| warn!("Failed to save labels: {}", e));
    }
}
