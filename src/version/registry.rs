//! Global version registry: fingerprints, targets and the links between them

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, StoreError};
use crate::metadata::types::ModuleVersionInfo;
use crate::store::{MetadataStore, ms_to_datetime, now_ms};
use crate::version::detector::{fingerprint, normalize_modules};

/// A content-addressed schema version shared by every target with the same
/// installed module set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVersion {
    pub id: i64,
    pub fingerprint: String,
    pub modules: Vec<ModuleVersionInfo>,
    pub first_seen_at: DateTime<Utc>,
    /// Number of targets whose active link points here
    pub reference_count: i64,
    /// Set once a sync wrote every schema class for this version
    pub sync_completed_at: Option<DateTime<Utc>>,
}

impl GlobalVersion {
    pub fn is_synced(&self) -> bool {
        self.sync_completed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: i64,
    pub fingerprint: String,
    pub module_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub reference_count: i64,
    pub sync_completed_at: Option<DateTime<Utc>>,
}

impl VersionSummary {
    pub fn is_synced(&self) -> bool {
        self.sync_completed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetVersionLink {
    pub target_id: i64,
    pub global_version_id: i64,
    pub is_active: bool,
    pub linked_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

const VERSION_COLUMNS: &str =
    "id, fingerprint, module_count, first_seen_at, reference_count, sync_completed_at, modules_json";

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<VersionSummary> {
    Ok(VersionSummary {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        module_count: row.get(2)?,
        first_seen_at: ms_to_datetime(row.get(3)?),
        reference_count: row.get(4)?,
        sync_completed_at: row.get::<_, Option<i64>>(5)?.map(ms_to_datetime),
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<(VersionSummary, String)> {
    Ok((summary_from_row(row)?, row.get(6)?))
}

fn into_global_version(
    summary: VersionSummary,
    modules_json: &str,
) -> Result<GlobalVersion, StoreError> {
    Ok(GlobalVersion {
        id: summary.id,
        fingerprint: summary.fingerprint,
        modules: serde_json::from_str(modules_json)?,
        first_seen_at: summary.first_seen_at,
        reference_count: summary.reference_count,
        sync_completed_at: summary.sync_completed_at,
    })
}

pub struct GlobalVersionRegistry {
    store: Arc<MetadataStore>,
}

impl GlobalVersionRegistry {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    /// Register a target by base URL, returning its id. Idempotent.
    pub fn ensure_target(&self, base_url: &str) -> Result<i64, RegistryError> {
        let conn = self.store.lock_conn()?;
        conn.execute(
            "INSERT INTO targets (base_url, created_at) VALUES (?1, ?2) ON CONFLICT(base_url) DO NOTHING",
            params![base_url, now_ms()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM targets WHERE base_url = ?1",
            [base_url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn target_id(&self, base_url: &str) -> Result<Option<i64>, RegistryError> {
        let conn = self.store.lock_conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM targets WHERE base_url = ?1",
                [base_url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Find or create the global version for a fingerprint.
    ///
    /// Returns `(global_version_id, created)`. Racing creators for the same
    /// fingerprint all end up with the same id.
    pub fn resolve_or_create(
        &self,
        fingerprint: &str,
        modules: &[ModuleVersionInfo],
    ) -> Result<(i64, bool), RegistryError> {
        let modules_json = serde_json::to_string(modules).map_err(StoreError::from)?;

        let conn = self.store.lock_conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO global_versions (fingerprint, modules_json, module_count, first_seen_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(fingerprint) DO NOTHING
            "#,
            params![fingerprint, modules_json, modules.len() as i64, now_ms()],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM global_versions WHERE fingerprint = ?1",
            [fingerprint],
            |row| row.get(0),
        )?;

        let created = inserted == 1;
        if created {
            info!(
                "Created global version {} for fingerprint {} ({} modules)",
                id,
                fingerprint,
                modules.len()
            );
        }
        Ok((id, created))
    }

    /// Make `global_version_id` the active version of a target.
    ///
    /// Runs in one IMMEDIATE transaction; on failure the prior link and all
    /// reference counts are unchanged. Returns false when the version was
    /// already active.
    pub fn link_target(&self, target_id: i64, global_version_id: i64) -> Result<bool, RegistryError> {
        let mut conn = self.store.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !exists(&tx, "targets", target_id)? {
            return Err(RegistryError::UnknownTarget(target_id));
        }
        if !exists(&tx, "global_versions", global_version_id)? {
            return Err(RegistryError::UnknownVersion(global_version_id));
        }

        let current = active_link_version(&tx, target_id)?;
        if current == Some(global_version_id) {
            debug!(
                "Target {} already linked to version {}",
                target_id, global_version_id
            );
            return Ok(false);
        }

        let now = now_ms();
        if let Some(previous) = current {
            tx.execute(
                r#"
                UPDATE target_version_links SET is_active = 0, deactivated_at = ?2
                WHERE target_id = ?1 AND is_active = 1
                "#,
                params![target_id, now],
            )?;
            tx.execute(
                r#"
                UPDATE global_versions SET reference_count = reference_count - 1
                WHERE id = ?1 AND reference_count > 0
                "#,
                [previous],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO target_version_links (target_id, global_version_id, is_active, linked_at)
            VALUES (?1, ?2, 1, ?3)
            "#,
            params![target_id, global_version_id, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, message)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RegistryError::LinkConflict {
                    target_id,
                    message: message.unwrap_or_else(|| err.to_string()),
                }
            }
            e => e.into(),
        })?;
        tx.execute(
            "UPDATE global_versions SET reference_count = reference_count + 1 WHERE id = ?1",
            [global_version_id],
        )?;

        tx.commit()?;
        info!(
            "Linked target {} to version {} (previous: {:?})",
            target_id, global_version_id, current
        );
        Ok(true)
    }

    /// Versions compatible with a module list, most referenced first.
    ///
    /// An exact match compares the canonical module set (name and version);
    /// otherwise only the set of module names has to match.
    pub fn find_compatible(
        &self,
        modules: &[ModuleVersionInfo],
        exact_match: bool,
    ) -> Result<Vec<VersionSummary>, RegistryError> {
        let conn = self.store.lock_conn()?;
        let order = "ORDER BY reference_count DESC, first_seen_at DESC, id DESC";

        if exact_match {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM global_versions WHERE fingerprint = ?1 {}",
                VERSION_COLUMNS, order
            ))?;
            let versions = stmt
                .query_map([fingerprint(modules)], summary_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(versions);
        }

        let wanted: BTreeSet<String> = normalize_modules(modules)
            .into_iter()
            .map(|m| m.name)
            .collect();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM global_versions {}",
            VERSION_COLUMNS, order
        ))?;
        let rows = stmt
            .query_map([], version_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut compatible = Vec::new();
        for (summary, modules_json) in rows {
            let stored: Vec<ModuleVersionInfo> = match serde_json::from_str(&modules_json) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Skipping version {} with unreadable module list: {}", summary.id, e);
                    continue;
                }
            };
            let names: BTreeSet<String> = normalize_modules(&stored)
                .into_iter()
                .map(|m| m.name)
                .collect();
            if names == wanted {
                compatible.push(summary);
            }
        }
        Ok(compatible)
    }

    pub fn active_version(&self, target_id: i64) -> Result<Option<GlobalVersion>, RegistryError> {
        let version_id = {
            let conn = self.store.lock_conn()?;
            active_link_version(&conn, target_id)?
        };
        match version_id {
            Some(id) => self.get_version(id),
            None => Ok(None),
        }
    }

    pub fn get_version(&self, id: i64) -> Result<Option<GlobalVersion>, RegistryError> {
        let conn = self.store.lock_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM global_versions WHERE id = ?1", VERSION_COLUMNS),
                [id],
                version_from_row,
            )
            .optional()?;

        match row {
            Some((summary, modules_json)) => Ok(Some(into_global_version(summary, &modules_json)?)),
            None => Ok(None),
        }
    }

    pub fn list_versions(&self) -> Result<Vec<VersionSummary>, RegistryError> {
        let conn = self.store.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM global_versions ORDER BY first_seen_at DESC, id DESC",
            VERSION_COLUMNS
        ))?;
        let versions = stmt
            .query_map([], summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// All links of a target, newest first, including deactivated ones
    pub fn link_history(&self, target_id: i64) -> Result<Vec<TargetVersionLink>, RegistryError> {
        let conn = self.store.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT target_id, global_version_id, is_active, linked_at, deactivated_at
            FROM target_version_links WHERE target_id = ?1
            ORDER BY linked_at DESC, id DESC
            "#,
        )?;
        let links = stmt
            .query_map([target_id], |row| {
                Ok(TargetVersionLink {
                    target_id: row.get(0)?,
                    global_version_id: row.get(1)?,
                    is_active: row.get(2)?,
                    linked_at: ms_to_datetime(row.get(3)?),
                    deactivated_at: row.get::<_, Option<i64>>(4)?.map(ms_to_datetime),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Record that every schema class of a version has been written. Keeps the first
    /// completion time on repeated calls.
    pub fn mark_synced(&self, id: i64) -> Result<(), RegistryError> {
        let conn = self.store.lock_conn()?;
        let updated = conn.execute(
            "UPDATE global_versions SET sync_completed_at = COALESCE(sync_completed_at, ?2) WHERE id = ?1",
            params![id, now_ms()],
        )?;
        if updated == 0 {
            return Err(RegistryError::UnknownVersion(id));
        }
        Ok(())
    }

    /// Delete versions that no target uses and that were first seen more than
    /// `grace_ms` ago, together with their schema rows and link history.
    /// Returns the ids of the deleted versions.
    pub fn prune_unreferenced(&self, grace_ms: i64) -> Result<Vec<i64>, RegistryError> {
        let cutoff = now_ms().saturating_sub(grace_ms);

        let mut conn = self.store.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates: Vec<i64> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id FROM global_versions g
                WHERE reference_count = 0
                  AND first_seen_at <= ?1
                  AND NOT EXISTS (
                      SELECT 1 FROM target_version_links l
                      WHERE l.global_version_id = g.id AND l.is_active = 1
                  )
                ORDER BY id
                "#,
            )?;
            stmt.query_map([cutoff], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        for id in &candidates {
            tx.execute(
                "DELETE FROM target_version_links WHERE global_version_id = ?1 AND is_active = 0",
                [id],
            )?;
            tx.execute("DELETE FROM global_versions WHERE id = ?1", [id])?;
        }

        tx.commit()?;
        if !candidates.is_empty() {
            info!("Pruned {} unreferenced versions: {:?}", candidates.len(), candidates);
        }
        Ok(candidates)
    }
}

fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool, RegistryError> {
    let found = conn
        .query_row(&format!("SELECT 1 FROM {} WHERE id = ?1", table), [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn active_link_version(conn: &Connection, target_id: i64) -> Result<Option<i64>, RegistryError> {
    let version_id = conn
        .query_row(
            "SELECT global_version_id FROM target_version_links WHERE target_id = ?1 AND is_active = 1",
            [target_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version_id)
}
