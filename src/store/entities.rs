//! Data entity, public entity and enumeration storage
//!
//! Every write is a natural-key upsert inside one transaction per call, so a
//! batch either commits entirely or not at all and retries are idempotent.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::StoreError;
use crate::metadata::types::{
    ActionParameter, DataEntity, EntityAction, EntityCategory, EntityProperty, Enumeration,
    EnumerationMember, LabelRef, NavigationProperty, PublicEntity,
};
use crate::store::fts::SearchIndex;
use crate::store::{MetadataStore, escape_like};

/// Name filter for data entity queries. Both forms are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    Substring(String),
    Regex(String),
}

/// Filters for [`MetadataStore::query_data_entities`], combined with AND
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataEntityFilter {
    pub name_pattern: Option<NamePattern>,
    pub category: Option<EntityCategory>,
    pub data_service_enabled: Option<bool>,
    pub data_management_enabled: Option<bool>,
    pub is_read_only: Option<bool>,
    /// Defaults to [`DEFAULT_PAGE_SIZE`]
    pub limit: Option<usize>,
    pub offset: usize,
}

impl DataEntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_contains(mut self, text: impl Into<String>) -> Self {
        self.name_pattern = Some(NamePattern::Substring(text.into()));
        self
    }

    pub fn name_matches(mut self, regex: impl Into<String>) -> Self {
        self.name_pattern = Some(NamePattern::Regex(regex.into()));
        self
    }

    pub fn category(mut self, category: EntityCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn data_service_enabled(mut self, enabled: bool) -> Self {
        self.data_service_enabled = Some(enabled);
        self
    }

    pub fn data_management_enabled(mut self, enabled: bool) -> Self {
        self.data_management_enabled = Some(enabled);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.is_read_only = Some(read_only);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn page_size(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    DataEntity,
    PublicEntity,
    Enumeration,
}

impl SearchKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "data_entity" => Some(SearchKind::DataEntity),
            "public_entity" => Some(SearchKind::PublicEntity),
            "enumeration" => Some(SearchKind::Enumeration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub kind: SearchKind,
    pub name: String,
    pub label_text: Option<String>,
}

const DATA_ENTITY_COLUMNS: &str = "name, public_entity_name, public_collection_name, label_id, \
     label_text, category, data_service_enabled, data_management_enabled, is_read_only";

fn data_entity_from_row(row: &Row<'_>) -> rusqlite::Result<DataEntity> {
    let category: Option<String> = row.get(5)?;
    Ok(DataEntity {
        name: row.get(0)?,
        public_entity_name: row.get(1)?,
        public_collection_name: row.get(2)?,
        label: LabelRef {
            id: row.get(3)?,
            text: row.get(4)?,
        },
        category: category.and_then(|c| c.parse().ok()),
        data_service_enabled: row.get(6)?,
        data_management_enabled: row.get(7)?,
        is_read_only: row.get(8)?,
    })
}

impl MetadataStore {
    pub fn upsert_data_entities(
        &self,
        version_id: i64,
        entities: &[DataEntity],
    ) -> Result<usize, StoreError> {
        debug!(
            "Saving {} data entities for version {}",
            entities.len(),
            version_id
        );

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO data_entities (
                    global_version_id, name, public_entity_name, public_collection_name,
                    label_id, label_text, category, data_service_enabled,
                    data_management_enabled, is_read_only
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(global_version_id, name) DO UPDATE SET
                    public_entity_name = excluded.public_entity_name,
                    public_collection_name = excluded.public_collection_name,
                    label_id = excluded.label_id,
                    label_text = COALESCE(excluded.label_text, data_entities.label_text),
                    category = excluded.category,
                    data_service_enabled = excluded.data_service_enabled,
                    data_management_enabled = excluded.data_management_enabled,
                    is_read_only = excluded.is_read_only
                "#,
            )?;
            for entity in entities {
                stmt.execute(params![
                    version_id,
                    entity.name,
                    entity.public_entity_name,
                    entity.public_collection_name,
                    entity.label.id,
                    entity.label.text,
                    entity.category.map(|c| c.as_str()),
                    entity.data_service_enabled,
                    entity.data_management_enabled,
                    entity.is_read_only,
                ])?;
            }
        }

        tx.commit()?;
        Ok(entities.len())
    }

    pub fn query_data_entities(
        &self,
        version_id: i64,
        filter: &DataEntityFilter,
    ) -> Result<Vec<DataEntity>, StoreError> {
        let mut clauses = vec!["global_version_id = ?".to_string()];
        let mut values = vec![Value::Integer(version_id)];

        if let Some(category) = filter.category {
            clauses.push("category = ?".to_string());
            values.push(Value::Text(category.as_str().to_string()));
        }
        for (column, flag) in [
            ("data_service_enabled", filter.data_service_enabled),
            ("data_management_enabled", filter.data_management_enabled),
            ("is_read_only", filter.is_read_only),
        ] {
            if let Some(flag) = flag {
                clauses.push(format!("{} = ?", column));
                values.push(Value::Integer(flag as i64));
            }
        }

        let regex = match &filter.name_pattern {
            Some(NamePattern::Substring(text)) if !text.is_empty() => {
                clauses.push("name LIKE ? ESCAPE '\\'".to_string());
                values.push(Value::Text(format!("%{}%", escape_like(text))));
                None
            }
            Some(NamePattern::Regex(pattern)) if !pattern.is_empty() => Some(
                regex::RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()?,
            ),
            _ => None,
        };

        let mut sql = format!(
            "SELECT {} FROM data_entities WHERE {} ORDER BY name",
            DATA_ENTITY_COLUMNS,
            clauses.join(" AND ")
        );
        // Regex filtering happens after the scan, so paging does too
        if regex.is_none() {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(filter.page_size() as i64));
            values.push(Value::Integer(filter.offset as i64));
        }

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), data_entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let Some(regex) = regex else {
            return Ok(rows);
        };

        Ok(rows
            .into_iter()
            .filter(|entity| regex.is_match(&entity.name))
            .skip(filter.offset)
            .take(filter.page_size())
            .collect())
    }

    /// Get a data entity by exact, case-sensitive name
    pub fn get_data_entity(
        &self,
        version_id: i64,
        name: &str,
    ) -> Result<Option<DataEntity>, StoreError> {
        let conn = self.lock_conn()?;
        let entity = conn
            .query_row(
                &format!(
                    "SELECT {} FROM data_entities WHERE global_version_id = ?1 AND name = ?2",
                    DATA_ENTITY_COLUMNS
                ),
                params![version_id, name],
                data_entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }

    pub fn upsert_public_entities(
        &self,
        version_id: i64,
        entities: &[PublicEntity],
    ) -> Result<usize, StoreError> {
        self.write_public_entities(version_id, entities, true)
    }

    /// Upsert public entities and their properties, leaving stored actions untouched
    pub fn upsert_public_entities_without_actions(
        &self,
        version_id: i64,
        entities: &[PublicEntity],
    ) -> Result<usize, StoreError> {
        self.write_public_entities(version_id, entities, false)
    }

    fn write_public_entities(
        &self,
        version_id: i64,
        entities: &[PublicEntity],
        include_actions: bool,
    ) -> Result<usize, StoreError> {
        debug!(
            "Saving {} public entities for version {} (actions: {})",
            entities.len(),
            version_id,
            include_actions
        );

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        for entity in entities {
            let entity_id = upsert_public_entity_row(&tx, version_id, entity)?;
            replace_entity_children(&tx, version_id, entity_id, entity, include_actions)?;
        }

        tx.commit()?;
        Ok(entities.len())
    }

    /// Get a public entity with its properties, navigation properties and
    /// actions. One query per table regardless of entity size.
    pub fn get_public_entity(
        &self,
        version_id: i64,
        name: &str,
    ) -> Result<Option<PublicEntity>, StoreError> {
        let conn = self.lock_conn()?;

        let row = conn
            .query_row(
                r#"
                SELECT id, name, entity_set_name, label_id, label_text, is_read_only,
                       configuration_enabled
                FROM public_entities
                WHERE global_version_id = ?1 AND name = ?2
                "#,
                params![version_id, name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        PublicEntity {
                            name: row.get(1)?,
                            entity_set_name: row.get(2)?,
                            label: LabelRef {
                                id: row.get(3)?,
                                text: row.get(4)?,
                            },
                            is_read_only: row.get(5)?,
                            configuration_enabled: row.get(6)?,
                            properties: Vec::new(),
                            navigation_properties: Vec::new(),
                            actions: Vec::new(),
                        },
                    ))
                },
            )
            .optional()?;

        let Some((entity_id, mut entity)) = row else {
            return Ok(None);
        };

        entity.properties = load_properties(&conn, entity_id)?;
        entity.navigation_properties = load_navigation_properties(&conn, entity_id)?;
        entity.actions = load_actions(&conn, entity_id)?;

        Ok(Some(entity))
    }

    pub fn upsert_enumerations(
        &self,
        version_id: i64,
        enumerations: &[Enumeration],
    ) -> Result<usize, StoreError> {
        debug!(
            "Saving {} enumerations for version {}",
            enumerations.len(),
            version_id
        );

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        for enumeration in enumerations {
            tx.execute(
                r#"
                INSERT INTO enumerations (global_version_id, name, label_id, label_text)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(global_version_id, name) DO UPDATE SET
                    label_id = excluded.label_id,
                    label_text = COALESCE(excluded.label_text, enumerations.label_text)
                "#,
                params![
                    version_id,
                    enumeration.name,
                    enumeration.label.id,
                    enumeration.label.text
                ],
            )?;

            let enumeration_id: i64 = tx.query_row(
                "SELECT id FROM enumerations WHERE global_version_id = ?1 AND name = ?2",
                params![version_id, enumeration.name],
                |row| row.get(0),
            )?;

            tx.execute(
                "DELETE FROM enumeration_members WHERE enumeration_id = ?1",
                [enumeration_id],
            )?;

            let mut stmt = tx.prepare(
                r#"
                INSERT INTO enumeration_members (
                    enumeration_id, global_version_id, name, value, label_id, label_text,
                    configuration_enabled
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for member in &enumeration.members {
                stmt.execute(params![
                    enumeration_id,
                    version_id,
                    member.name,
                    member.value,
                    member.label.id,
                    member.label.text,
                    member.configuration_enabled,
                ])?;
            }
        }

        tx.commit()?;
        Ok(enumerations.len())
    }

    pub fn get_enumeration(
        &self,
        version_id: i64,
        name: &str,
    ) -> Result<Option<Enumeration>, StoreError> {
        let conn = self.lock_conn()?;

        let row = conn
            .query_row(
                r#"
                SELECT id, name, label_id, label_text FROM enumerations
                WHERE global_version_id = ?1 AND name = ?2
                "#,
                params![version_id, name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        Enumeration {
                            name: row.get(1)?,
                            label: LabelRef {
                                id: row.get(2)?,
                                text: row.get(3)?,
                            },
                            members: Vec::new(),
                        },
                    ))
                },
            )
            .optional()?;

        let Some((enumeration_id, mut enumeration)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT name, value, label_id, label_text, configuration_enabled
            FROM enumeration_members WHERE enumeration_id = ?1 ORDER BY value, name
            "#,
        )?;
        enumeration.members = stmt
            .query_map([enumeration_id], |row| {
                Ok(EnumerationMember {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    label: LabelRef {
                        id: row.get(2)?,
                        text: row.get(3)?,
                    },
                    configuration_enabled: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(enumeration))
    }

    /// Full-text search over names and label texts within one version.
    ///
    /// Text that is not plain words, an index miss, or a missing/failing
    /// index falls back to case-insensitive substring matching.
    pub fn search(
        &self,
        version_id: i64,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let conn = self.lock_conn()?;

        if let Some(expression) = SearchIndex::match_expression(text) {
            match self.search_index_query(&conn, version_id, &expression, limit) {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => {}
                Err(e) => warn!("Full-text search failed, using pattern fallback: {}", e),
            }
        } else {
            debug!("Search text {:?} is not index-safe, using pattern fallback", text);
        }

        search_by_pattern(&conn, version_id, text.trim(), limit)
    }

    fn search_index_query(
        &self,
        conn: &Connection,
        version_id: i64,
        expression: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let sql = format!(
            r#"
            SELECT kind, name, label_text FROM {table}
            WHERE {table} MATCH ?1 AND CAST(global_version_id AS INTEGER) = ?2
            ORDER BY rank
            LIMIT ?3
            "#,
            table = self.search_index().table_name
        );

        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params![expression, version_id, limit as i64], search_hit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hits.into_iter().flatten().collect())
    }
}

fn search_hit_from_row(row: &Row<'_>) -> rusqlite::Result<Option<SearchHit>> {
    let kind: String = row.get(0)?;
    let Some(kind) = SearchKind::parse(&kind) else {
        return Ok(None);
    };
    Ok(Some(SearchHit {
        kind,
        name: row.get(1)?,
        label_text: row.get(2)?,
    }))
}

fn search_by_pattern(
    conn: &Connection,
    version_id: i64,
    text: &str,
    limit: usize,
) -> Result<Vec<SearchHit>, StoreError> {
    let pattern = format!("%{}%", escape_like(text));

    let mut stmt = conn.prepare(
        r#"
        SELECT kind, name, label_text FROM (
            SELECT 'data_entity' AS kind, name, label_text FROM data_entities
            WHERE global_version_id = ?1
              AND (name LIKE ?2 ESCAPE '\' OR label_text LIKE ?2 ESCAPE '\')
            UNION ALL
            SELECT 'public_entity', name, label_text FROM public_entities
            WHERE global_version_id = ?1
              AND (name LIKE ?2 ESCAPE '\' OR label_text LIKE ?2 ESCAPE '\')
            UNION ALL
            SELECT 'enumeration', name, label_text FROM enumerations
            WHERE global_version_id = ?1
              AND (name LIKE ?2 ESCAPE '\' OR label_text LIKE ?2 ESCAPE '\')
        )
        ORDER BY name, kind
        LIMIT ?3
        "#,
    )?;

    let hits = stmt
        .query_map(params![version_id, pattern, limit as i64], search_hit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hits.into_iter().flatten().collect())
}

fn upsert_public_entity_row(
    tx: &Transaction<'_>,
    version_id: i64,
    entity: &PublicEntity,
) -> Result<i64, StoreError> {
    tx.execute(
        r#"
        INSERT INTO public_entities (
            global_version_id, name, entity_set_name, label_id, label_text, is_read_only,
            configuration_enabled
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(global_version_id, name) DO UPDATE SET
            entity_set_name = excluded.entity_set_name,
            label_id = excluded.label_id,
            label_text = COALESCE(excluded.label_text, public_entities.label_text),
            is_read_only = excluded.is_read_only,
            configuration_enabled = excluded.configuration_enabled
        "#,
        params![
            version_id,
            entity.name,
            entity.entity_set_name,
            entity.label.id,
            entity.label.text,
            entity.is_read_only,
            entity.configuration_enabled,
        ],
    )?;

    let entity_id = tx.query_row(
        "SELECT id FROM public_entities WHERE global_version_id = ?1 AND name = ?2",
        params![version_id, entity.name],
        |row| row.get(0),
    )?;
    Ok(entity_id)
}

fn replace_entity_children(
    tx: &Transaction<'_>,
    version_id: i64,
    entity_id: i64,
    entity: &PublicEntity,
    include_actions: bool,
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM entity_properties WHERE entity_id = ?1",
        [entity_id],
    )?;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO entity_properties (
                entity_id, global_version_id, name, type_name, data_type, label_id, label_text,
                is_key, is_mandatory, allow_edit, allow_edit_on_create, property_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )?;
        for property in &entity.properties {
            stmt.execute(params![
                entity_id,
                version_id,
                property.name,
                property.type_name,
                property.data_type,
                property.label.id,
                property.label.text,
                property.is_key,
                property.is_mandatory,
                property.allow_edit,
                property.allow_edit_on_create,
                property.property_order,
            ])?;
        }
    }

    tx.execute(
        "DELETE FROM navigation_properties WHERE entity_id = ?1",
        [entity_id],
    )?;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO navigation_properties (
                entity_id, global_version_id, name, related_entity, related_relation_name,
                cardinality
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        for navigation in &entity.navigation_properties {
            stmt.execute(params![
                entity_id,
                version_id,
                navigation.name,
                navigation.related_entity,
                navigation.related_relation_name,
                navigation.cardinality.as_str(),
            ])?;
        }
    }

    if !include_actions {
        return Ok(());
    }

    tx.execute("DELETE FROM entity_actions WHERE entity_id = ?1", [entity_id])?;
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO entity_actions (
            entity_id, global_version_id, name, binding_kind, return_type, parameters_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )?;
    for action in &entity.actions {
        stmt.execute(params![
            entity_id,
            version_id,
            action.name,
            action.binding_kind.as_str(),
            action.return_type,
            serde_json::to_string(&action.parameters)?,
        ])?;
    }

    Ok(())
}

fn load_properties(conn: &Connection, entity_id: i64) -> Result<Vec<EntityProperty>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT name, type_name, data_type, label_id, label_text, is_key, is_mandatory,
               allow_edit, allow_edit_on_create, property_order
        FROM entity_properties WHERE entity_id = ?1 ORDER BY property_order, name
        "#,
    )?;
    let properties = stmt
        .query_map([entity_id], |row| {
            Ok(EntityProperty {
                name: row.get(0)?,
                type_name: row.get(1)?,
                data_type: row.get(2)?,
                label: LabelRef {
                    id: row.get(3)?,
                    text: row.get(4)?,
                },
                is_key: row.get(5)?,
                is_mandatory: row.get(6)?,
                allow_edit: row.get(7)?,
                allow_edit_on_create: row.get(8)?,
                property_order: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(properties)
}

fn load_navigation_properties(
    conn: &Connection,
    entity_id: i64,
) -> Result<Vec<NavigationProperty>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT name, related_entity, related_relation_name, cardinality
        FROM navigation_properties WHERE entity_id = ?1 ORDER BY name
        "#,
    )?;
    let rows = stmt
        .query_map([entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(name, related_entity, related_relation_name, cardinality)| {
            let cardinality = cardinality
                .parse()
                .inspect_err(|e| warn!("Skipping navigation property {}: {}", name, e))
                .ok()?;
            Some(NavigationProperty {
                name,
                related_entity,
                related_relation_name,
                cardinality,
            })
        })
        .collect())
}

fn load_actions(conn: &Connection, entity_id: i64) -> Result<Vec<EntityAction>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT name, binding_kind, return_type, parameters_json
        FROM entity_actions WHERE entity_id = ?1 ORDER BY name
        "#,
    )?;
    let rows = stmt
        .query_map([entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut actions = Vec::with_capacity(rows.len());
    for (name, binding_kind, return_type, parameters_json) in rows {
        let Ok(binding_kind) = binding_kind.parse() else {
            warn!("Skipping action {} with unknown binding kind {}", name, binding_kind);
            continue;
        };
        let parameters: Vec<ActionParameter> = serde_json::from_str(&parameters_json)?;
        actions.push(EntityAction {
            name,
            binding_kind,
            return_type,
            parameters,
        });
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::{BindingKind, Cardinality};
    use crate::store::test_support::{insert_version, store_with_version};
    use rstest::rstest;
    use std::collections::HashSet;

    fn data_entity(name: &str, category: EntityCategory, read_only: bool) -> DataEntity {
        DataEntity {
            name: name.to_string(),
            public_entity_name: Some(format!("{}Entity", name)),
            public_collection_name: Some(format!("{}s", name)),
            label: LabelRef::with_text(format!("@{}", name), format!("{} label", name)),
            category: Some(category),
            data_service_enabled: true,
            data_management_enabled: !read_only,
            is_read_only: read_only,
        }
    }

    fn sample_entities() -> Vec<DataEntity> {
        vec![
            data_entity("CustomersV3", EntityCategory::Master, false),
            data_entity("CustomerGroups", EntityCategory::Reference, false),
            data_entity("SalesOrderHeaders", EntityCategory::Transaction, false),
            data_entity("SalesOrderLines", EntityCategory::Transaction, true),
            data_entity("Vendors_100", EntityCategory::Master, true),
        ]
    }

    fn names(entities: &[DataEntity]) -> Vec<&str> {
        entities.iter().map(|e| e.name.as_str()).collect()
    }

    fn sample_public_entity() -> PublicEntity {
        PublicEntity {
            name: "Customer".to_string(),
            entity_set_name: Some("Customers".to_string()),
            label: LabelRef::new("@SYS7149"),
            is_read_only: false,
            configuration_enabled: true,
            properties: vec![
                EntityProperty {
                    name: "CustomerAccount".to_string(),
                    type_name: "String".to_string(),
                    data_type: "String".to_string(),
                    label: LabelRef::new("@SYS1996"),
                    is_key: true,
                    is_mandatory: true,
                    allow_edit: false,
                    allow_edit_on_create: true,
                    property_order: 1,
                },
                EntityProperty {
                    name: "CreditLimit".to_string(),
                    type_name: "Decimal".to_string(),
                    data_type: "Real".to_string(),
                    label: LabelRef::default(),
                    is_key: false,
                    is_mandatory: false,
                    allow_edit: true,
                    allow_edit_on_create: true,
                    property_order: 2,
                },
            ],
            navigation_properties: vec![NavigationProperty {
                name: "CustomerGroup".to_string(),
                related_entity: "CustomerGroup".to_string(),
                related_relation_name: Some("Customers".to_string()),
                cardinality: Cardinality::Single,
            }],
            actions: vec![EntityAction {
                name: "Recalculate".to_string(),
                binding_kind: BindingKind::BoundToEntityInstance,
                return_type: Some("Edm.Boolean".to_string()),
                parameters: vec![ActionParameter {
                    name: "force".to_string(),
                    type_name: "Edm.Boolean".to_string(),
                    is_collection: false,
                }],
            }],
        }
    }

    fn count(store: &MetadataStore, table: &str) -> i64 {
        let conn = store.lock_conn().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn upsert_data_entities_is_idempotent() {
        let (store, version_id) = store_with_version();

        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();
        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();

        assert_eq!(count(&store, "data_entities"), 5);
    }

    #[test]
    fn upsert_data_entities_rolls_back_whole_batch_for_unknown_version() {
        let (store, _) = store_with_version();

        let result = store.upsert_data_entities(999, &sample_entities());

        assert!(result.is_err());
        assert_eq!(count(&store, "data_entities"), 0);
    }

    #[rstest]
    #[case(DataEntityFilter::new(), vec!["CustomerGroups", "CustomersV3", "SalesOrderHeaders", "SalesOrderLines", "Vendors_100"])]
    #[case(DataEntityFilter::new().name_contains("customer"), vec!["CustomerGroups", "CustomersV3"])]
    #[case(DataEntityFilter::new().name_contains("SALESORDER").read_only(true), vec!["SalesOrderLines"])]
    #[case(DataEntityFilter::new().category(EntityCategory::Master), vec!["CustomersV3", "Vendors_100"])]
    #[case(DataEntityFilter::new().name_contains("_1"), vec!["Vendors_100"])]
    #[case(DataEntityFilter::new().name_matches("^sales.*(headers|lines)$"), vec!["SalesOrderHeaders", "SalesOrderLines"])]
    #[case(DataEntityFilter::new().name_matches("v\\d$").category(EntityCategory::Master), vec!["CustomersV3"])]
    #[case(DataEntityFilter::new().data_management_enabled(false), vec!["SalesOrderLines", "Vendors_100"])]
    #[case(DataEntityFilter::new().limit(2), vec!["CustomerGroups", "CustomersV3"])]
    #[case(DataEntityFilter::new().limit(2).offset(3), vec!["SalesOrderLines", "Vendors_100"])]
    #[case(DataEntityFilter::new().name_matches("s").limit(1).offset(1), vec!["CustomersV3"])]
    fn query_data_entities_combines_filters(
        #[case] filter: DataEntityFilter,
        #[case] expected: Vec<&str>,
    ) {
        let (store, version_id) = store_with_version();
        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();

        let result = store.query_data_entities(version_id, &filter).unwrap();

        assert_eq!(names(&result), expected);
    }

    #[test]
    fn query_data_entities_defaults_to_page_size() {
        let (store, version_id) = store_with_version();
        let entities: Vec<_> = (0..DEFAULT_PAGE_SIZE + 20)
            .map(|i| data_entity(&format!("Entity{:04}", i), EntityCategory::Master, false))
            .collect();
        store.upsert_data_entities(version_id, &entities).unwrap();

        let page = store
            .query_data_entities(version_id, &DataEntityFilter::new())
            .unwrap();
        assert_eq!(page.len(), DEFAULT_PAGE_SIZE);

        let all = store
            .query_data_entities(version_id, &DataEntityFilter::new().limit(1_000))
            .unwrap();
        assert_eq!(all.len(), DEFAULT_PAGE_SIZE + 20);
    }

    #[test]
    fn query_data_entities_rejects_invalid_regex() {
        let (store, version_id) = store_with_version();

        let result = store.query_data_entities(version_id, &DataEntityFilter::new().name_matches("("));

        assert!(matches!(result, Err(StoreError::InvalidPattern(_))));
    }

    #[test]
    fn query_data_entities_is_scoped_by_version() {
        let (store, v1) = store_with_version();
        let v2 = insert_version(&store, "fingerprint-2");
        store.upsert_data_entities(v1, &sample_entities()).unwrap();
        store
            .upsert_data_entities(v2, &[data_entity("OnlyInV2", EntityCategory::Document, false)])
            .unwrap();

        let result = store
            .query_data_entities(v2, &DataEntityFilter::new())
            .unwrap();

        assert_eq!(names(&result), vec!["OnlyInV2"]);
    }

    #[test]
    fn get_data_entity_is_case_sensitive() {
        let (store, version_id) = store_with_version();
        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();

        assert!(store.get_data_entity(version_id, "CustomersV3").unwrap().is_some());
        assert!(store.get_data_entity(version_id, "customersv3").unwrap().is_none());
    }

    #[test]
    fn public_entity_round_trips_with_nested_collections() {
        let (store, version_id) = store_with_version();
        let entity = sample_public_entity();

        store
            .upsert_public_entities(version_id, std::slice::from_ref(&entity))
            .unwrap();
        let loaded = store
            .get_public_entity(version_id, "Customer")
            .unwrap()
            .unwrap();

        assert_eq!(loaded.name, entity.name);
        assert_eq!(loaded.entity_set_name, entity.entity_set_name);
        assert_eq!(loaded.label, entity.label);
        assert_eq!(
            loaded.properties.iter().collect::<HashSet<_>>(),
            entity.properties.iter().collect::<HashSet<_>>()
        );
        assert_eq!(
            loaded.navigation_properties.iter().collect::<HashSet<_>>(),
            entity.navigation_properties.iter().collect::<HashSet<_>>()
        );
        assert_eq!(
            loaded.actions.iter().collect::<HashSet<_>>(),
            entity.actions.iter().collect::<HashSet<_>>()
        );
    }

    #[test]
    fn get_public_entity_returns_none_for_other_case_or_version() {
        let (store, version_id) = store_with_version();
        let other = insert_version(&store, "fingerprint-2");
        store
            .upsert_public_entities(version_id, &[sample_public_entity()])
            .unwrap();

        assert!(store.get_public_entity(version_id, "customer").unwrap().is_none());
        assert!(store.get_public_entity(other, "Customer").unwrap().is_none());
    }

    #[test]
    fn upsert_public_entities_twice_keeps_child_row_counts() {
        let (store, version_id) = store_with_version();

        store
            .upsert_public_entities(version_id, &[sample_public_entity()])
            .unwrap();
        store
            .upsert_public_entities(version_id, &[sample_public_entity()])
            .unwrap();

        assert_eq!(count(&store, "public_entities"), 1);
        assert_eq!(count(&store, "entity_properties"), 2);
        assert_eq!(count(&store, "navigation_properties"), 1);
        assert_eq!(count(&store, "entity_actions"), 1);
    }

    #[test]
    fn upsert_without_actions_keeps_stored_actions() {
        let (store, version_id) = store_with_version();
        store
            .upsert_public_entities(version_id, &[sample_public_entity()])
            .unwrap();

        let mut stripped = sample_public_entity();
        stripped.actions.clear();
        store
            .upsert_public_entities_without_actions(version_id, &[stripped])
            .unwrap();

        let loaded = store
            .get_public_entity(version_id, "Customer")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.actions.len(), 1);
    }

    #[test]
    fn enumeration_round_trips_with_members_ordered_by_value() {
        let (store, version_id) = store_with_version();
        let enumeration = Enumeration {
            name: "NoYes".to_string(),
            label: LabelRef::with_text("@SYS1", "No/Yes"),
            members: vec![
                EnumerationMember {
                    name: "Yes".to_string(),
                    value: 1,
                    label: LabelRef::new("@SYS2"),
                    configuration_enabled: true,
                },
                EnumerationMember {
                    name: "No".to_string(),
                    value: 0,
                    label: LabelRef::new("@SYS3"),
                    configuration_enabled: true,
                },
            ],
        };

        store
            .upsert_enumerations(version_id, &[enumeration.clone()])
            .unwrap();
        store.upsert_enumerations(version_id, &[enumeration]).unwrap();

        let loaded = store.get_enumeration(version_id, "NoYes").unwrap().unwrap();
        assert_eq!(loaded.label.text.as_deref(), Some("No/Yes"));
        assert_eq!(
            loaded.members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            vec!["No", "Yes"]
        );
        assert_eq!(count(&store, "enumeration_members"), 2);
        assert!(store.get_enumeration(version_id, "noyes").unwrap().is_none());
    }

    #[test]
    fn search_uses_index_for_plain_words() {
        let (store, version_id) = store_with_version();
        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();
        store
            .upsert_public_entities(version_id, &[sample_public_entity()])
            .unwrap();

        let hits = store.search(version_id, "Customer", 10).unwrap();

        let found: HashSet<_> = hits.iter().map(|h| (h.kind, h.name.as_str())).collect();
        assert!(found.contains(&(SearchKind::PublicEntity, "Customer")));
        assert!(found.contains(&(SearchKind::DataEntity, "CustomerGroups")));
    }

    #[test]
    fn search_matches_label_text() {
        let (store, version_id) = store_with_version();
        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();

        let hits = store.search(version_id, "label", 100).unwrap();

        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn search_falls_back_to_pattern_for_unsafe_text() {
        let (store, version_id) = store_with_version();
        store
            .upsert_data_entities(version_id, &sample_entities())
            .unwrap();

        let hits = store.search(version_id, "Vendors_1*", 10).unwrap();
        assert!(hits.is_empty());

        let hits = store.search(version_id, "rs_10", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Vendors_100");

        let hits = store.search(version_id, "order\"lines", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn search_is_scoped_by_version_and_limited() {
        let (store, v1) = store_with_version();
        let v2 = insert_version(&store, "fingerprint-2");
        store.upsert_data_entities(v1, &sample_entities()).unwrap();

        assert!(store.search(v2, "Customer", 10).unwrap().is_empty());
        assert_eq!(store.search(v1, "Sales", 1).unwrap().len(), 1);
    }
}
