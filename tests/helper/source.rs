//! Fake metadata source for integration tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use metadata_cache::MetadataSource;
use metadata_cache::error::SourceError;
use metadata_cache::metadata::types::{
    ActionParameter, BindingKind, Cardinality, DataEntity, EntityAction, EntityCategory,
    EntityProperty, Enumeration, EnumerationMember, LabelRef, ModuleVersionInfo,
    NavigationProperty, PublicEntity, SchemaClass,
};

#[derive(Default)]
struct Calls {
    modules: AtomicUsize,
    data_entities: AtomicUsize,
    public_entities: AtomicUsize,
    enumerations: AtomicUsize,
    single_labels: AtomicUsize,
}

/// Scriptable remote target.
///
/// Serves the sample schema below unless a class is marked as failing, and
/// records every call so tests can assert what reached the remote.
pub struct FakeSource {
    base_url: String,
    modules: Mutex<Vec<ModuleVersionInfo>>,
    module_delay: Option<Duration>,
    class_delay: Option<(SchemaClass, Duration)>,
    failing: Mutex<Vec<SchemaClass>>,
    labels: HashMap<String, String>,
    calls: Calls,
    label_batches: Mutex<Vec<Vec<String>>>,
}

impl FakeSource {
    pub fn new(base_url: &str, modules: &[(&str, &str)]) -> Self {
        Self {
            base_url: base_url.to_string(),
            modules: Mutex::new(to_modules(modules)),
            module_delay: None,
            class_delay: None,
            failing: Mutex::new(Vec::new()),
            labels: sample_labels(),
            calls: Calls::default(),
            label_batches: Mutex::new(Vec::new()),
        }
    }

    /// Delay the module list response, e.g. to trigger detection timeouts
    pub fn with_module_delay(mut self, delay: Duration) -> Self {
        self.module_delay = Some(delay);
        self
    }

    /// Delay every fetch of one schema class
    pub fn with_class_delay(mut self, class: SchemaClass, delay: Duration) -> Self {
        self.class_delay = Some((class, delay));
        self
    }

    pub fn failing(self, class: SchemaClass) -> Self {
        self.set_failing(&[class]);
        self
    }

    pub fn set_failing(&self, classes: &[SchemaClass]) {
        *self.failing.lock().unwrap() = classes.to_vec();
    }

    /// Simulate a software update on the target
    pub fn set_modules(&self, modules: &[(&str, &str)]) {
        *self.modules.lock().unwrap() = to_modules(modules);
    }

    pub fn fetch_count(&self, class: SchemaClass) -> usize {
        let counter = match class {
            SchemaClass::DataEntities => &self.calls.data_entities,
            SchemaClass::PublicEntities => &self.calls.public_entities,
            SchemaClass::Enumerations => &self.calls.enumerations,
            SchemaClass::Labels => return self.label_batches().len(),
        };
        counter.load(Ordering::SeqCst)
    }

    /// Number of schema fetches of any class, labels included
    pub fn schema_fetches(&self) -> usize {
        SchemaClass::ALL
            .into_iter()
            .map(|class| self.fetch_count(class))
            .sum()
    }

    pub fn module_fetches(&self) -> usize {
        self.calls.modules.load(Ordering::SeqCst)
    }

    pub fn single_label_fetches(&self) -> usize {
        self.calls.single_labels.load(Ordering::SeqCst)
    }

    /// Ids requested by each batch label call, in call order
    pub fn label_batches(&self) -> Vec<Vec<String>> {
        self.label_batches.lock().unwrap().clone()
    }

    async fn check(&self, class: SchemaClass) -> Result<(), SourceError> {
        if let Some((slow, delay)) = self.class_delay {
            if slow == class {
                tokio::time::sleep(delay).await;
            }
        }
        if self.failing.lock().unwrap().contains(&class) {
            return Err(SourceError::Transport(format!("{} unavailable", class)));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    fn base_url(&self) -> String {
        self.base_url.clone()
    }

    async fn fetch_installed_modules(&self) -> Result<Vec<ModuleVersionInfo>, SourceError> {
        self.calls.modules.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.module_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.modules.lock().unwrap().clone())
    }

    async fn fetch_data_entities(&self) -> Result<Vec<DataEntity>, SourceError> {
        self.calls.data_entities.fetch_add(1, Ordering::SeqCst);
        self.check(SchemaClass::DataEntities).await?;
        Ok(sample_data_entities())
    }

    async fn fetch_public_entities(&self) -> Result<Vec<PublicEntity>, SourceError> {
        self.calls.public_entities.fetch_add(1, Ordering::SeqCst);
        self.check(SchemaClass::PublicEntities).await?;
        Ok(sample_public_entities())
    }

    async fn fetch_enumerations(&self) -> Result<Vec<Enumeration>, SourceError> {
        self.calls.enumerations.fetch_add(1, Ordering::SeqCst);
        self.check(SchemaClass::Enumerations).await?;
        Ok(sample_enumerations())
    }

    async fn fetch_label(
        &self,
        label_id: &str,
        _language: &str,
    ) -> Result<Option<String>, SourceError> {
        self.calls.single_labels.fetch_add(1, Ordering::SeqCst);
        self.check(SchemaClass::Labels).await?;
        Ok(self.labels.get(label_id).cloned())
    }

    async fn fetch_labels_batch(
        &self,
        label_ids: &[String],
        _language: &str,
    ) -> Result<HashMap<String, String>, SourceError> {
        self.label_batches.lock().unwrap().push(label_ids.to_vec());
        self.check(SchemaClass::Labels).await?;
        Ok(label_ids
            .iter()
            .filter_map(|id| self.labels.get(id).map(|text| (id.clone(), text.clone())))
            .collect())
    }
}

fn to_modules(modules: &[(&str, &str)]) -> Vec<ModuleVersionInfo> {
    modules
        .iter()
        .map(|(name, version)| ModuleVersionInfo::new(*name, *version))
        .collect()
}

pub fn sample_labels() -> HashMap<String, String> {
    [
        ("@SYS100", "Customers"),
        ("@SYS101", "Customer account"),
        ("@SYS102", "Name"),
        ("@SYS200", "Sales orders"),
        ("@SYS300", "No / yes"),
        ("@SYS301", "No"),
        ("@SYS302", "Yes"),
        ("@A", "Label A"),
        ("@B", "Label B"),
    ]
    .into_iter()
    .map(|(id, text)| (id.to_string(), text.to_string()))
    .collect()
}

pub fn sample_data_entities() -> Vec<DataEntity> {
    vec![
        DataEntity {
            name: "CustomersV3".to_string(),
            public_entity_name: Some("CustomerV3".to_string()),
            public_collection_name: Some("CustomersV3".to_string()),
            label: LabelRef::new("@SYS100"),
            category: Some(EntityCategory::Master),
            data_service_enabled: true,
            data_management_enabled: true,
            is_read_only: false,
        },
        DataEntity {
            name: "SalesOrderHeadersV2".to_string(),
            public_entity_name: Some("SalesOrderHeaderV2".to_string()),
            public_collection_name: Some("SalesOrderHeadersV2".to_string()),
            label: LabelRef::new("@SYS200"),
            category: Some(EntityCategory::Document),
            data_service_enabled: true,
            data_management_enabled: false,
            is_read_only: true,
        },
    ]
}

pub fn sample_public_entities() -> Vec<PublicEntity> {
    vec![PublicEntity {
        name: "CustomerV3".to_string(),
        entity_set_name: Some("CustomersV3".to_string()),
        label: LabelRef::new("@SYS100"),
        is_read_only: false,
        configuration_enabled: true,
        properties: vec![
            EntityProperty {
                name: "CustomerAccount".to_string(),
                type_name: "CustAccount".to_string(),
                data_type: "String".to_string(),
                label: LabelRef::new("@SYS101"),
                is_key: true,
                is_mandatory: true,
                allow_edit: false,
                allow_edit_on_create: true,
                property_order: 1,
            },
            EntityProperty {
                name: "Name".to_string(),
                type_name: "Name".to_string(),
                data_type: "String".to_string(),
                label: LabelRef::new("@SYS102"),
                is_key: false,
                is_mandatory: false,
                allow_edit: true,
                allow_edit_on_create: true,
                property_order: 2,
            },
        ],
        navigation_properties: vec![NavigationProperty {
            name: "SalesOrders".to_string(),
            related_entity: "SalesOrderHeaderV2".to_string(),
            related_relation_name: Some("Customer".to_string()),
            cardinality: Cardinality::Multiple,
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
    }]
}

pub fn sample_enumerations() -> Vec<Enumeration> {
    vec![Enumeration {
        name: "NoYes".to_string(),
        label: LabelRef::new("@SYS300"),
        members: vec![
            EnumerationMember {
                name: "No".to_string(),
                value: 0,
                label: LabelRef::new("@SYS301"),
                configuration_enabled: true,
            },
            EnumerationMember {
                name: "Yes".to_string(),
                value: 1,
                label: LabelRef::new("@SYS302"),
                configuration_enabled: true,
            },
        ],
    }]
}
