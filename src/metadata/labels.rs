//! Label references across schema object graphs
//!
//! Every schema type that carries labels implements [`Labelled`] and visits
//! its own [`LabelRef`]s plus those of its children. The walker functions
//! below only ever go through that trait, so new schema types get label
//! resolution by implementing it.

use std::collections::{BTreeSet, HashMap};

use crate::metadata::types::{
    DataEntity, EntityProperty, Enumeration, EnumerationMember, LabelRef, PublicEntity,
};

pub trait Labelled {
    fn visit_labels(&self, visit: &mut dyn FnMut(&LabelRef));

    fn visit_labels_mut(&mut self, visit: &mut dyn FnMut(&mut LabelRef));
}

impl Labelled for DataEntity {
    fn visit_labels(&self, visit: &mut dyn FnMut(&LabelRef)) {
        visit(&self.label);
    }

    fn visit_labels_mut(&mut self, visit: &mut dyn FnMut(&mut LabelRef)) {
        visit(&mut self.label);
    }
}

impl Labelled for EntityProperty {
    fn visit_labels(&self, visit: &mut dyn FnMut(&LabelRef)) {
        visit(&self.label);
    }

    fn visit_labels_mut(&mut self, visit: &mut dyn FnMut(&mut LabelRef)) {
        visit(&mut self.label);
    }
}

impl Labelled for PublicEntity {
    fn visit_labels(&self, visit: &mut dyn FnMut(&LabelRef)) {
        visit(&self.label);
        for property in &self.properties {
            property.visit_labels(visit);
        }
    }

    fn visit_labels_mut(&mut self, visit: &mut dyn FnMut(&mut LabelRef)) {
        visit(&mut self.label);
        for property in &mut self.properties {
            property.visit_labels_mut(visit);
        }
    }
}

impl Labelled for EnumerationMember {
    fn visit_labels(&self, visit: &mut dyn FnMut(&LabelRef)) {
        visit(&self.label);
    }

    fn visit_labels_mut(&mut self, visit: &mut dyn FnMut(&mut LabelRef)) {
        visit(&mut self.label);
    }
}

impl Labelled for Enumeration {
    fn visit_labels(&self, visit: &mut dyn FnMut(&LabelRef)) {
        visit(&self.label);
        for member in &self.members {
            member.visit_labels(visit);
        }
    }

    fn visit_labels_mut(&mut self, visit: &mut dyn FnMut(&mut LabelRef)) {
        visit(&mut self.label);
        for member in &mut self.members {
            member.visit_labels_mut(visit);
        }
    }
}

/// Collect the distinct label ids that still need their text resolved.
/// Ids are returned sorted so batch requests are deterministic.
pub fn unresolved_label_ids<T: Labelled>(items: &[T]) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for item in items {
        item.visit_labels(&mut |label| {
            if label.needs_resolution() {
                if let Some(id) = &label.id {
                    ids.insert(id.clone());
                }
            }
        });
    }
    ids.into_iter().collect()
}

/// Fill in label texts from `resolved`. Returns the number of labels filled.
pub fn apply_label_texts<T: Labelled>(items: &mut [T], resolved: &HashMap<String, String>) -> usize {
    let mut applied = 0;
    for item in items {
        item.visit_labels_mut(&mut |label| {
            if !label.needs_resolution() {
                return;
            }
            let Some(text) = label.id.as_ref().and_then(|id| resolved.get(id)) else {
                return;
            };
            label.text = Some(text.clone());
            applied += 1;
        });
    }
    applied
}
