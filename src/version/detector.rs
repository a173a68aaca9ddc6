//! Deterministic fingerprinting of a target's installed module set

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::DetectionError;
use crate::metadata::source::MetadataSource;
use crate::metadata::types::ModuleVersionInfo;

/// Result of a successful detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedVersion {
    pub fingerprint: String,
    /// Canonical (normalized, sorted, deduplicated) module list
    pub modules: Vec<ModuleVersionInfo>,
}

/// Trim and case-fold names, trim versions, drop nameless entries, then sort
/// by (name, version) and remove duplicates.
pub fn normalize_modules(modules: &[ModuleVersionInfo]) -> Vec<ModuleVersionInfo> {
    let mut normalized: Vec<ModuleVersionInfo> = modules
        .iter()
        .filter_map(|module| {
            let name = module.name.trim().to_lowercase();
            if name.is_empty() {
                return None;
            }
            Some(ModuleVersionInfo {
                name,
                version: module.version.trim().to_string(),
                publisher: module.publisher.clone(),
                display_name: module.display_name.clone(),
            })
        })
        .collect();

    normalized.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
    normalized.dedup_by(|a, b| a.name == b.name && a.version == b.version);
    normalized
}

/// SHA-256 over the canonical module list, as lowercase hex.
///
/// Only names and versions participate, so the result is independent of
/// input order, surrounding whitespace, name case and duplicates.
pub fn fingerprint(modules: &[ModuleVersionInfo]) -> String {
    let mut hasher = Sha256::new();
    for module in normalize_modules(modules) {
        hasher.update(module.name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(module.version.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

pub struct VersionDetector {
    timeout: Duration,
}

impl VersionDetector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn detect(&self, source: &dyn MetadataSource) -> Result<DetectedVersion, DetectionError> {
        let modules = tokio::time::timeout(self.timeout, source.fetch_installed_modules())
            .await
            .map_err(|_| DetectionError::Timeout(self.timeout))?
            .inspect_err(|e| warn!("Failed to fetch installed modules: {}", e))?;

        let modules = normalize_modules(&modules);
        if modules.is_empty() {
            return Err(DetectionError::EmptyModuleList);
        }

        let fingerprint = fingerprint(&modules);
        debug!(
            "Detected {} modules for {}, fingerprint {}",
            modules.len(),
            source.base_url(),
            fingerprint
        );

        Ok(DetectedVersion {
            fingerprint,
            modules,
        })
    }
}
