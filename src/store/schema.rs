//! Table definitions for the metadata database

/// Registry tables: targets, global versions and the links between them
pub(crate) const REGISTRY_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    base_url TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS global_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    modules_json TEXT NOT NULL,
    module_count INTEGER NOT NULL,
    first_seen_at INTEGER NOT NULL,
    reference_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS target_version_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    global_version_id INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    linked_at INTEGER NOT NULL,
    deactivated_at INTEGER,
    FOREIGN KEY (target_id) REFERENCES targets(id) ON DELETE CASCADE,
    FOREIGN KEY (global_version_id) REFERENCES global_versions(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_links_one_active
    ON target_version_links(target_id) WHERE is_active = 1;

CREATE INDEX IF NOT EXISTS idx_links_version
    ON target_version_links(global_version_id);
"#;

/// Version-scoped schema tables
pub(crate) const SCHEMA_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS data_entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    public_entity_name TEXT,
    public_collection_name TEXT,
    label_id TEXT,
    label_text TEXT,
    category TEXT,
    data_service_enabled INTEGER NOT NULL,
    data_management_enabled INTEGER NOT NULL,
    is_read_only INTEGER NOT NULL,
    FOREIGN KEY (global_version_id) REFERENCES global_versions(id) ON DELETE CASCADE,
    UNIQUE(global_version_id, name)
);

CREATE TABLE IF NOT EXISTS public_entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    entity_set_name TEXT,
    label_id TEXT,
    label_text TEXT,
    is_read_only INTEGER NOT NULL,
    configuration_enabled INTEGER NOT NULL,
    FOREIGN KEY (global_version_id) REFERENCES global_versions(id) ON DELETE CASCADE,
    UNIQUE(global_version_id, name)
);

CREATE TABLE IF NOT EXISTS entity_properties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    type_name TEXT NOT NULL,
    data_type TEXT NOT NULL,
    label_id TEXT,
    label_text TEXT,
    is_key INTEGER NOT NULL,
    is_mandatory INTEGER NOT NULL,
    allow_edit INTEGER NOT NULL,
    allow_edit_on_create INTEGER NOT NULL,
    property_order INTEGER NOT NULL,
    FOREIGN KEY (entity_id) REFERENCES public_entities(id) ON DELETE CASCADE,
    UNIQUE(entity_id, name)
);

CREATE TABLE IF NOT EXISTS navigation_properties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    related_entity TEXT NOT NULL,
    related_relation_name TEXT,
    cardinality TEXT NOT NULL,
    FOREIGN KEY (entity_id) REFERENCES public_entities(id) ON DELETE CASCADE,
    UNIQUE(entity_id, name)
);

CREATE TABLE IF NOT EXISTS entity_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    binding_kind TEXT NOT NULL,
    return_type TEXT,
    parameters_json TEXT NOT NULL,
    FOREIGN KEY (entity_id) REFERENCES public_entities(id) ON DELETE CASCADE,
    UNIQUE(entity_id, name)
);

CREATE TABLE IF NOT EXISTS enumerations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    label_id TEXT,
    label_text TEXT,
    FOREIGN KEY (global_version_id) REFERENCES global_versions(id) ON DELETE CASCADE,
    UNIQUE(global_version_id, name)
);

CREATE TABLE IF NOT EXISTS enumeration_members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    enumeration_id INTEGER NOT NULL,
    global_version_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value INTEGER NOT NULL,
    label_id TEXT,
    label_text TEXT,
    configuration_enabled INTEGER NOT NULL,
    FOREIGN KEY (enumeration_id) REFERENCES enumerations(id) ON DELETE CASCADE,
    UNIQUE(enumeration_id, name)
);

CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    global_version_id INTEGER NOT NULL,
    label_id TEXT NOT NULL,
    language TEXT NOT NULL,
    value TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (global_version_id) REFERENCES global_versions(id) ON DELETE CASCADE,
    UNIQUE(global_version_id, label_id, language)
);

CREATE INDEX IF NOT EXISTS idx_data_entities_version ON data_entities(global_version_id);
CREATE INDEX IF NOT EXISTS idx_public_entities_version ON public_entities(global_version_id);
CREATE INDEX IF NOT EXISTS idx_entity_properties_entity ON entity_properties(entity_id);
CREATE INDEX IF NOT EXISTS idx_navigation_properties_entity ON navigation_properties(entity_id);
CREATE INDEX IF NOT EXISTS idx_entity_actions_entity ON entity_actions(entity_id);
CREATE INDEX IF NOT EXISTS idx_enumerations_version ON enumerations(global_version_id);
CREATE INDEX IF NOT EXISTS idx_enumeration_members_enum ON enumeration_members(enumeration_id);
CREATE INDEX IF NOT EXISTS idx_labels_expires ON labels(expires_at);
"#;

/// Schema migrations
/// Each version contains a list of SQL statements to execute
pub(crate) const MIGRATIONS: &[&[&str]] = &[
    // v1: sync completion marker on global versions
    &["ALTER TABLE global_versions ADD COLUMN sync_completed_at INTEGER"],
    // v2: last hit timestamp on labels
    &["ALTER TABLE labels ADD COLUMN last_hit_at INTEGER"],
];

/// Tables reported by store statistics, in display order
pub(crate) const COUNTED_TABLES: &[&str] = &[
    "targets",
    "global_versions",
    "target_version_links",
    "data_entities",
    "public_entities",
    "entity_properties",
    "navigation_properties",
    "entity_actions",
    "enumerations",
    "enumeration_members",
    "labels",
];
