use std::collections::HashMap;

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::metadata::types::Label;
use crate::store::{MetadataStore, now_ms};

impl MetadataStore {
    /// Save label texts for a version. Rows expire `ttl_ms` after this call;
    /// existing rows are refreshed and keep their hit counts.
    pub fn upsert_labels(
        &self,
        version_id: i64,
        labels: &[Label],
        ttl_ms: i64,
    ) -> Result<usize, StoreError> {
        let now = now_ms();
        let expires_at = now.saturating_add(ttl_ms);

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO labels (global_version_id, label_id, language, value, cached_at, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(global_version_id, label_id, language) DO UPDATE SET
                    value = excluded.value,
                    cached_at = excluded.cached_at,
                    expires_at = excluded.expires_at
                "#,
            )?;
            for label in labels {
                stmt.execute(params![
                    version_id,
                    label.id,
                    label.language,
                    label.value,
                    now,
                    expires_at
                ])?;
            }
        }

        tx.commit()?;
        debug!("Saved {} labels for version {}", labels.len(), version_id);
        Ok(labels.len())
    }

    /// Get unexpired label texts. Ids without a live row are absent from the map.
    pub fn get_labels(
        &self,
        version_id: i64,
        label_ids: &[String],
        language: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let now = now_ms();
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT value FROM labels
            WHERE global_version_id = ?1 AND label_id = ?2 AND language = ?3 AND expires_at > ?4
            "#,
        )?;

        let mut found = HashMap::new();
        for label_id in label_ids {
            let value: Option<String> = stmt
                .query_row(params![version_id, label_id, language, now], |row| row.get(0))
                .optional()?;
            if let Some(value) = value {
                found.insert(label_id.clone(), value);
            }
        }

        Ok(found)
    }

    pub fn record_label_hits(
        &self,
        version_id: i64,
        label_ids: &[String],
        language: &str,
    ) -> Result<(), StoreError> {
        if label_ids.is_empty() {
            return Ok(());
        }

        let now = now_ms();
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                UPDATE labels SET hit_count = hit_count + 1, last_hit_at = ?4
                WHERE global_version_id = ?1 AND label_id = ?2 AND language = ?3
                "#,
            )?;
            for label_id in label_ids {
                stmt.execute(params![version_id, label_id, language, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete expired label rows across all versions
    pub fn purge_expired_labels(&self) -> Result<usize, StoreError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute("DELETE FROM labels WHERE expires_at <= ?1", [now_ms()])?;
        if deleted > 0 {
            debug!("Purged {} expired labels", deleted);
        }
        Ok(deleted)
    }
}
