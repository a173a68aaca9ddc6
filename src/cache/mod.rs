//! Read path of the metadata cache
//!
//! - [`facade`]: `MetadataCache`, the public entry point per target
//! - [`memory`]: Bounded TTL tier for schema objects
//! - [`labels`]: Label texts with memory, store and remote tiers

pub mod facade;
pub mod labels;
pub mod memory;

pub use facade::{CacheStatistics, MetadataCache};
pub use labels::{LabelCache, LabelCacheStats};
pub use memory::{MemoryStats, MemoryTier};
