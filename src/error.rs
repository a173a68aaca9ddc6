use std::time::Duration;

use thiserror::Error;

use crate::metadata::types::SchemaClass;

/// Failure reported by the remote metadata transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote object not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Failed to fetch installed modules: {0}")]
    Remote(#[from] SourceError),

    #[error("Module list request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote returned an empty module list")]
    EmptyModuleList,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unknown global version: {0}")]
    UnknownVersion(i64),

    #[error("Unknown target: {0}")]
    UnknownTarget(i64),

    #[error("Link conflict for target {target_id}: {message}")]
    LinkConflict { target_id: i64, message: String },
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        RegistryError::Store(StoreError::Database(e))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to fetch {class}: {source}")]
    Fetch {
        class: SchemaClass,
        #[source]
        source: SourceError,
    },

    #[error("Fetching {class} timed out after {timeout:?}")]
    Timeout { class: SchemaClass, timeout: Duration },

    #[error("Failed to write {class}: {source}")]
    Write {
        class: SchemaClass,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Sync already running for target {0}")]
    AlreadyRunning(i64),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Schema class the failure belongs to, if it is a class-level failure.
    pub fn class(&self) -> Option<SchemaClass> {
        match self {
            SyncError::Fetch { class, .. }
            | SyncError::Timeout { class, .. }
            | SyncError::Write { class, .. } => Some(*class),
            _ => None,
        }
    }
}

/// A logical miss. Not a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} not found: {name}")]
pub struct NotFoundError {
    pub kind: &'static str,
    pub name: String,
}

impl NotFoundError {
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::NotFound(_))
    }
}
