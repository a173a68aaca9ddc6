//! Schema object types captured from the remote system

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One installed module as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVersionInfo {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ModuleVersionInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            publisher: None,
            display_name: None,
        }
    }
}

/// Label reference carried by schema objects: the label id and, once
/// resolved, its text in the configured language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRef {
    pub id: Option<String>,
    pub text: Option<String>,
}

impl LabelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: None,
        }
    }

    pub fn with_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: Some(text.into()),
        }
    }

    /// True when the id looks like a label reference (`@File123`) whose text
    /// has not been filled in yet.
    pub fn needs_resolution(&self) -> bool {
        self.text.is_none() && self.id.as_deref().is_some_and(|id| id.starts_with('@'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Master,
    Configuration,
    Transaction,
    Reference,
    Document,
    Parameters,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Master => "Master",
            EntityCategory::Configuration => "Configuration",
            EntityCategory::Transaction => "Transaction",
            EntityCategory::Reference => "Reference",
            EntityCategory::Document => "Document",
            EntityCategory::Parameters => "Parameters",
        }
    }
}

impl FromStr for EntityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Master" => Ok(EntityCategory::Master),
            "Configuration" => Ok(EntityCategory::Configuration),
            "Transaction" => Ok(EntityCategory::Transaction),
            "Reference" => Ok(EntityCategory::Reference),
            "Document" => Ok(EntityCategory::Document),
            "Parameters" => Ok(EntityCategory::Parameters),
            _ => Err(format!("Unknown entity category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntity {
    pub name: String,
    pub public_entity_name: Option<String>,
    pub public_collection_name: Option<String>,
    #[serde(default)]
    pub label: LabelRef,
    pub category: Option<EntityCategory>,
    pub data_service_enabled: bool,
    pub data_management_enabled: bool,
    pub is_read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProperty {
    pub name: String,
    pub type_name: String,
    pub data_type: String,
    #[serde(default)]
    pub label: LabelRef,
    pub is_key: bool,
    pub is_mandatory: bool,
    pub allow_edit: bool,
    pub allow_edit_on_create: bool,
    pub property_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    Multiple,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "Single",
            Cardinality::Multiple => "Multiple",
        }
    }
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Single" => Ok(Cardinality::Single),
            "Multiple" => Ok(Cardinality::Multiple),
            _ => Err(format!("Unknown cardinality: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationProperty {
    pub name: String,
    pub related_entity: String,
    pub related_relation_name: Option<String>,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    BoundToEntityInstance,
    BoundToEntitySet,
    Unbound,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::BoundToEntityInstance => "BoundToEntityInstance",
            BindingKind::BoundToEntitySet => "BoundToEntitySet",
            BindingKind::Unbound => "Unbound",
        }
    }
}

impl FromStr for BindingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BoundToEntityInstance" => Ok(BindingKind::BoundToEntityInstance),
            "BoundToEntitySet" => Ok(BindingKind::BoundToEntitySet),
            "Unbound" => Ok(BindingKind::Unbound),
            _ => Err(format!("Unknown binding kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameter {
    pub name: String,
    pub type_name: String,
    pub is_collection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAction {
    pub name: String,
    pub binding_kind: BindingKind,
    pub return_type: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEntity {
    pub name: String,
    pub entity_set_name: Option<String>,
    #[serde(default)]
    pub label: LabelRef,
    pub is_read_only: bool,
    pub configuration_enabled: bool,
    #[serde(default)]
    pub properties: Vec<EntityProperty>,
    #[serde(default)]
    pub navigation_properties: Vec<NavigationProperty>,
    #[serde(default)]
    pub actions: Vec<EntityAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationMember {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub label: LabelRef,
    pub configuration_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enumeration {
    pub name: String,
    #[serde(default)]
    pub label: LabelRef,
    #[serde(default)]
    pub members: Vec<EnumerationMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub language: String,
    pub value: String,
}

/// Category of metadata fetched and written as one unit during a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaClass {
    DataEntities,
    PublicEntities,
    Enumerations,
    Labels,
}

impl SchemaClass {
    pub const ALL: [SchemaClass; 4] = [
        SchemaClass::DataEntities,
        SchemaClass::PublicEntities,
        SchemaClass::Enumerations,
        SchemaClass::Labels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaClass::DataEntities => "data_entities",
            SchemaClass::PublicEntities => "public_entities",
            SchemaClass::Enumerations => "enumerations",
            SchemaClass::Labels => "labels",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            SchemaClass::DataEntities => "data entities",
            SchemaClass::PublicEntities => "public entities",
            SchemaClass::Enumerations => "enumerations",
            SchemaClass::Labels => "labels",
        }
    }
}

impl fmt::Display for SchemaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
