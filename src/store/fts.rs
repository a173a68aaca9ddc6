//! FTS5 search index over schema object names and label texts
//!
//! The index is kept in sync with `data_entities`, `public_entities` and
//! `enumerations` by triggers. Each source row maps to one index row whose
//! rowid is `source_id * 4 + kind_code`, so rows from the three tables never
//! collide and deletes are a rowid lookup.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;

/// Source tables and their kind code in the index rowid
const INDEXED_TABLES: &[(&str, i64, &str)] = &[
    ("data_entities", 0, "data_entity"),
    ("public_entities", 1, "public_entity"),
    ("enumerations", 2, "enumeration"),
];

/// Configuration for the FTS5 table.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    /// Name of the FTS5 virtual table.
    pub table_name: String,
    /// Tokenizer configuration.
    pub tokenizer: String,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self {
            table_name: "metadata_search".to_string(),
            tokenizer: "unicode61 remove_diacritics 1".to_string(),
        }
    }
}

impl SearchIndex {
    /// Check if the FTS5 table exists.
    pub fn table_exists(&self, conn: &Connection) -> Result<bool, StoreError> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [&self.table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Check if the FTS5 triggers exist.
    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool, StoreError> {
        let mut total = 0;
        for (table, _, _) in INDEXED_TABLES {
            let count: i32 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name=?1",
                [format!("{}_{}_ai", self.table_name, table)],
                |row| row.get(0),
            )?;
            total += count;
        }
        Ok(total as usize == INDEXED_TABLES.len())
    }

    /// Ensure the index is fully set up.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<(), StoreError> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate(conn)?;
        } else if !self.triggers_exist(conn)? {
            // Table exists but triggers missing - rebuild
            self.populate(conn)?;
        }

        self.create_triggers(conn)?;
        Ok(())
    }

    pub fn create_table(&self, conn: &Connection) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                name,
                label_text,
                kind UNINDEXED,
                global_version_id UNINDEXED,
                tokenize='{}'
            )",
            self.table_name, self.tokenizer
        );

        conn.execute(&sql, [])?;
        info!("Created FTS5 table: {}", self.table_name);
        Ok(())
    }

    /// Create triggers to keep the index in sync with the source tables.
    pub fn create_triggers(&self, conn: &Connection) -> Result<(), StoreError> {
        let index = &self.table_name;

        for (table, code, kind) in INDEXED_TABLES {
            let insert_trigger = format!(
                "CREATE TRIGGER IF NOT EXISTS {index}_{table}_ai AFTER INSERT ON {table} BEGIN
                    INSERT INTO {index} (rowid, name, label_text, kind, global_version_id)
                    VALUES (NEW.id * 4 + {code}, NEW.name, NEW.label_text, '{kind}', NEW.global_version_id);
                END"
            );
            conn.execute(&insert_trigger, [])?;

            let update_trigger = format!(
                "CREATE TRIGGER IF NOT EXISTS {index}_{table}_au AFTER UPDATE ON {table} BEGIN
                    DELETE FROM {index} WHERE rowid = OLD.id * 4 + {code};
                    INSERT INTO {index} (rowid, name, label_text, kind, global_version_id)
                    VALUES (NEW.id * 4 + {code}, NEW.name, NEW.label_text, '{kind}', NEW.global_version_id);
                END"
            );
            conn.execute(&update_trigger, [])?;

            let delete_trigger = format!(
                "CREATE TRIGGER IF NOT EXISTS {index}_{table}_ad AFTER DELETE ON {table} BEGIN
                    DELETE FROM {index} WHERE rowid = OLD.id * 4 + {code};
                END"
            );
            conn.execute(&delete_trigger, [])?;
        }

        debug!("Created FTS5 triggers for {}", index);
        Ok(())
    }

    /// Populate the index from the source tables.
    pub fn populate(&self, conn: &Connection) -> Result<(), StoreError> {
        let index = &self.table_name;

        // execute_batch avoids the "returns results" error on FTS deletes
        conn.execute_batch(&format!("DELETE FROM {};", index))?;

        for (table, code, kind) in INDEXED_TABLES {
            let sql = format!(
                "INSERT INTO {index} (rowid, name, label_text, kind, global_version_id)
                 SELECT id * 4 + {code}, name, label_text, '{kind}', global_version_id FROM {table}"
            );
            conn.execute(&sql, [])?;
        }

        info!("Populated FTS5 table from schema tables");
        Ok(())
    }

    /// Rebuild the index completely.
    pub fn rebuild(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", self.table_name), [])?;

        for (table, _, _) in INDEXED_TABLES {
            for suffix in ["ai", "au", "ad"] {
                conn.execute(
                    &format!("DROP TRIGGER IF EXISTS {}_{}_{}", self.table_name, table, suffix),
                    [],
                )?;
            }
        }

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate(conn)?;

        info!("Rebuilt FTS5 index");
        Ok(())
    }

    /// Build an FTS5 MATCH expression from user text.
    ///
    /// Returns `None` when the text contains anything beyond plain words, in
    /// which case callers use the pattern fallback instead.
    pub fn match_expression(text: &str) -> Option<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }

        let is_bareword = |token: &str| {
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii())
        };
        let is_operator = |token: &str| matches!(token, "AND" | "OR" | "NOT" | "NEAR");

        if tokens.iter().any(|t| !is_bareword(t) || is_operator(t)) {
            return None;
        }

        Some(
            tokens
                .iter()
                .map(|t| format!("{}*", t))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}
