use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::StoreError;
use crate::store::MetadataStore;
use crate::store::schema::COUNTED_TABLES;

/// Row counts of one global version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCounts {
    pub global_version_id: i64,
    pub data_entities: i64,
    pub public_entities: i64,
    pub entity_actions: i64,
    pub enumerations: i64,
    pub labels: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    /// Row counts per table, in schema order
    pub table_counts: IndexMap<String, i64>,
    pub db_size_bytes: i64,
    /// Counts for the active version of the requested target, if it has one
    pub active_version: Option<VersionCounts>,
}

impl MetadataStore {
    pub fn statistics(&self, target_id: Option<i64>) -> Result<StoreStatistics, StoreError> {
        let conn = self.lock_conn()?;

        let mut table_counts = IndexMap::new();
        for table in COUNTED_TABLES {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            table_counts.insert(table.to_string(), count);
        }

        let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;

        let active_version = match target_id {
            Some(target_id) => active_version_counts(&conn, target_id)?,
            None => None,
        };

        Ok(StoreStatistics {
            table_counts,
            db_size_bytes: page_count * page_size,
            active_version,
        })
    }
}

fn active_version_counts(
    conn: &Connection,
    target_id: i64,
) -> Result<Option<VersionCounts>, StoreError> {
    let version_id: Option<i64> = conn
        .query_row(
            "SELECT global_version_id FROM target_version_links WHERE target_id = ?1 AND is_active = 1",
            [target_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(global_version_id) = version_id else {
        return Ok(None);
    };

    let count = |table: &str| -> Result<i64, StoreError> {
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE global_version_id = ?1", table),
            [global_version_id],
            |row| row.get(0),
        )?)
    };

    Ok(Some(VersionCounts {
        global_version_id,
        data_entities: count("data_entities")?,
        public_entities: count("public_entities")?,
        entity_actions: count("entity_actions")?,
        enumerations: count("enumerations")?,
        labels: count("labels")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::{Enumeration, LabelRef};
    use crate::store::test_support::store_with_version;

    #[test]
    fn statistics_counts_every_table() {
        let (store, version_id) = store_with_version();
        store
            .upsert_enumerations(
                version_id,
                &[Enumeration {
                    name: "NoYes".to_string(),
                    label: LabelRef::default(),
                    members: Vec::new(),
                }],
            )
            .unwrap();

        let stats = store.statistics(None).unwrap();

        assert_eq!(
            stats.table_counts.keys().map(String::as_str).collect::<Vec<_>>(),
            COUNTED_TABLES.to_vec()
        );
        assert_eq!(stats.table_counts["global_versions"], 1);
        assert_eq!(stats.table_counts["enumerations"], 1);
        assert!(stats.db_size_bytes > 0);
        assert_eq!(stats.active_version, None);
    }

    #[test]
    fn statistics_scopes_counts_to_the_active_version_of_a_target() {
        let (store, version_id) = store_with_version();
        {
            let conn = store.lock_conn().unwrap();
            conn.execute(
                "INSERT INTO targets (id, base_url, created_at) VALUES (7, 'https://a', 0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO target_version_links (target_id, global_version_id, is_active, linked_at)
                 VALUES (7, ?1, 1, 0)",
                [version_id],
            )
            .unwrap();
        }
        store
            .upsert_enumerations(
                version_id,
                &[Enumeration {
                    name: "NoYes".to_string(),
                    label: LabelRef::default(),
                    members: Vec::new(),
                }],
            )
            .unwrap();

        let stats = store.statistics(Some(7)).unwrap();
        let counts = stats.active_version.unwrap();

        assert_eq!(counts.global_version_id, version_id);
        assert_eq!(counts.enumerations, 1);
        assert_eq!(counts.data_entities, 0);

        assert_eq!(store.statistics(Some(8)).unwrap().active_version, None);
    }
}
