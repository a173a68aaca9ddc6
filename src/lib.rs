//! Versioned metadata cache and synchronization engine
//!
//! Captures a remote system's schema metadata into a local SQLite store,
//! detects schema changes through a fingerprint of the installed modules and
//! lets targets running identical software share one cached copy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ MetadataCache│────▶│  SyncEngine  │────▶│MetadataSource│
//! │   (facade)   │     │ (fetch/write)│     │   (remote)   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!        │                    │
//!        ▼                    ▼
//! ┌──────────────┐     ┌──────────────┐
//! │MetadataStore │◀────│   Registry   │
//! │   (SQLite)   │     │  (versions)  │
//! └──────────────┘     └──────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod store;
pub mod sync;
pub mod version;

pub use cache::MetadataCache;
pub use config::CacheConfig;
pub use error::MetadataError;
pub use metadata::source::MetadataSource;
