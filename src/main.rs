use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use metadata_cache::config::CacheConfig;
use metadata_cache::logging::{LogFormat, init_logging};
use metadata_cache::store::MetadataStore;
use metadata_cache::version::registry::GlobalVersionRegistry;

#[derive(Parser)]
#[command(name = "metadata-cache")]
#[command(version, about = "Inspect and maintain a schema metadata cache")]
struct Cli {
    /// Cache directory holding metadata.db (defaults to the XDG data dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Row counts and database size
    Stats {
        /// Also report counts for this target's active version
        #[arg(long)]
        target: Option<String>,
    },
    /// List known global versions
    Versions,
    /// Delete versions no target uses anymore
    Prune {
        /// Keep unreferenced versions first seen within this many hours
        #[arg(long)]
        grace_hours: Option<u64>,
    },
    /// Rebuild the full-text search index from the schema tables
    Reindex,
}

fn load_config(cli: &Cli) -> anyhow::Result<CacheConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            CacheConfig::from_json(&json).with_context(|| format!("Invalid config {:?}", path))?
        }
        None => CacheConfig::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Hours to milliseconds, saturating at `i64::MAX`
fn grace_hours_to_ms(hours: u64) -> i64 {
    hours.saturating_mul(60 * 60 * 1000).min(i64::MAX as u64) as i64
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let _guard = init_logging(&config.resolved_cache_dir(), format)?;

    let store = Arc::new(MetadataStore::open(&config.db_path())?);
    let registry = GlobalVersionRegistry::new(store.clone());

    match cli.command {
        Command::Stats { target } => {
            let target_id = match target {
                Some(url) => Some(
                    registry
                        .target_id(&url)?
                        .with_context(|| format!("Unknown target: {}", url))?,
                ),
                None => None,
            };
            let stats = store.statistics(target_id)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Versions => {
            let versions = registry.list_versions()?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }
        Command::Prune { grace_hours } => {
            let grace_ms = grace_hours
                .map(grace_hours_to_ms)
                .unwrap_or(config.sync.prune_grace);
            let pruned = registry.prune_unreferenced(grace_ms)?;
            let purged = store.purge_expired_labels()?;
            info!(
                "Pruned {} versions and {} expired labels",
                pruned.len(),
                purged
            );
            println!(
                "{}",
                serde_json::json!({ "prunedVersions": pruned, "purgedLabels": purged })
            );
        }
        Command::Reindex => {
            store.rebuild_search_index()?;
            info!("Rebuilt search index");
            println!("{}", serde_json::json!({ "reindexed": true }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(24, 86_400_000)]
    #[case(u64::MAX, i64::MAX)]
    #[case(u64::MAX / 1000, i64::MAX)]
    fn grace_hours_convert_without_overflow(#[case] hours: u64, #[case] expected: i64) {
        assert_eq!(grace_hours_to_ms(hours), expected);
    }
}
