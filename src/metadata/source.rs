//! Source trait for fetching schema metadata from a remote target

use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

use crate::error::SourceError;
use crate::metadata::types::{DataEntity, Enumeration, ModuleVersionInfo, PublicEntity};

/// Trait for fetching schema metadata from one remote target.
///
/// Implementations own the transport and authentication; this crate only
/// consumes the results.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    /// Base URL of the target this source talks to
    fn base_url(&self) -> String;

    /// Fetches the installed module list used for version fingerprinting
    async fn fetch_installed_modules(&self) -> Result<Vec<ModuleVersionInfo>, SourceError>;

    async fn fetch_data_entities(&self) -> Result<Vec<DataEntity>, SourceError>;

    /// Fetches public entities including properties, navigation properties and actions
    async fn fetch_public_entities(&self) -> Result<Vec<PublicEntity>, SourceError>;

    async fn fetch_enumerations(&self) -> Result<Vec<Enumeration>, SourceError>;

    /// Fetches a single label text
    ///
    /// # Returns
    /// * `Ok(Some(text))` - Label exists in the given language
    /// * `Ok(None)` - Label does not exist
    /// * `Err(SourceError)` - If the fetch fails
    async fn fetch_label(
        &self,
        label_id: &str,
        language: &str,
    ) -> Result<Option<String>, SourceError>;

    /// Fetches many labels in one request. Missing labels are absent from the map.
    async fn fetch_labels_batch(
        &self,
        label_ids: &[String],
        language: &str,
    ) -> Result<HashMap<String, String>, SourceError>;
}
