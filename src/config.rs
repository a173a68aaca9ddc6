use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::sync::strategy::SyncStrategy;

// =============================================================================
// Time-related constants
// =============================================================================

/// Timeout for each remote fetch in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Label time-to-live in milliseconds (7 days)
pub const DEFAULT_LABEL_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// In-memory tier time-to-live in milliseconds (1 hour)
pub const DEFAULT_MEMORY_TTL_MS: u64 = 60 * 60 * 1000;

/// Unreferenced versions younger than this are kept by the prune sweep (24 hours)
pub const DEFAULT_PRUNE_GRACE_MS: i64 = 24 * 60 * 60 * 1000;

// =============================================================================
// Size-related constants
// =============================================================================

/// Maximum number of objects held by the in-memory tier
pub const DEFAULT_MEMORY_CAPACITY: u64 = 1_000;

/// Rows returned by pattern queries when no limit is given
pub const DEFAULT_PAGE_SIZE: usize = 100;

pub const DEFAULT_LANGUAGE: &str = "en-us";

/// Database file name inside the cache directory
pub const DB_FILE_NAME: &str = "metadata.db";

/// Cache configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Directory holding the database file; defaults to [`data_dir`]
    pub cache_dir: Option<PathBuf>,
    /// Language used for label resolution
    pub language: String,
    pub memory: MemoryConfig,
    pub labels: LabelConfig,
    pub sync: SyncConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            language: DEFAULT_LANGUAGE.to_string(),
            memory: MemoryConfig::default(),
            labels: LabelConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Parse configuration from a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolved_cache_dir().join(DB_FILE_NAME)
    }
}

/// In-memory tier configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfig {
    pub capacity: u64,
    /// Time-to-live in milliseconds
    pub ttl: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MEMORY_CAPACITY,
            ttl: DEFAULT_MEMORY_TTL_MS,
        }
    }
}

impl MemoryConfig {
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }
}

/// Label cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelConfig {
    /// Time-to-live in milliseconds
    pub ttl: i64,
    /// Fill label texts into public entity and enumeration reads
    pub resolve_labels: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LABEL_TTL_MS,
            resolve_labels: true,
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Timeout for each remote fetch in milliseconds
    pub fetch_timeout: u64,
    /// Strategy used by background syncs triggered from cache misses
    pub background_strategy: SyncStrategy,
    /// Grace period in milliseconds before unreferenced versions may be pruned
    pub prune_grace: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: FETCH_TIMEOUT_MS,
            background_strategy: SyncStrategy::SharingMode,
            prune_grace: DEFAULT_PRUNE_GRACE_MS,
        }
    }
}

impl SyncConfig {
    pub fn fetch_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout)
    }
}

/// Returns the path to the data directory for metadata-cache.
/// Uses $XDG_DATA_HOME/metadata-cache if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/metadata-cache,
/// or ./metadata-cache if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file inside `cache_dir`.
pub fn log_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("metadata-cache.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("metadata-cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = CacheConfig::from_json(r#"{ "labels": { "ttl": 1000 } }"#).unwrap();

        assert_eq!(result.labels.ttl, 1000);
        assert!(result.labels.resolve_labels);
        assert_eq!(result.language, DEFAULT_LANGUAGE);
        assert_eq!(result.memory, MemoryConfig::default());
        assert_eq!(result.sync, SyncConfig::default());
    }

    #[test]
    fn cache_config_from_full_object_parses_all_fields() {
        let result = CacheConfig::from_json(
            r#"{
                "cacheDir": "/var/cache/meta",
                "language": "de",
                "memory": { "capacity": 10, "ttl": 500 },
                "labels": { "ttl": 2000, "resolveLabels": false },
                "sync": {
                    "fetchTimeout": 1500,
                    "backgroundStrategy": "entities_only",
                    "pruneGrace": 0
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            result,
            CacheConfig {
                cache_dir: Some(PathBuf::from("/var/cache/meta")),
                language: "de".to_string(),
                memory: MemoryConfig {
                    capacity: 10,
                    ttl: 500
                },
                labels: LabelConfig {
                    ttl: 2000,
                    resolve_labels: false
                },
                sync: SyncConfig {
                    fetch_timeout: 1500,
                    background_strategy: SyncStrategy::EntitiesOnly,
                    prune_grace: 0
                },
            }
        );
        assert_eq!(result.db_path(), PathBuf::from("/var/cache/meta/metadata.db"));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/metadata-cache"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/metadata-cache"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./metadata-cache"));
    }
}
