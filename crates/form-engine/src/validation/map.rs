use super::{ValidationMask, ValidationRecord, ValidationTarget};
use crate::node::{NodePath, NodeTree};
use indexmap::IndexMap;

/// Aggregated records keyed by field and by component path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationMap {
    fields: IndexMap<String, Vec<ValidationRecord>>,
    components: IndexMap<NodePath, Vec<ValidationRecord>>,
}

impl ValidationMap {
    pub fn insert(&mut self, record: ValidationRecord) {
        match &record.target {
            ValidationTarget::Field { field, .. } => self.fields.entry(field.clone()).or_default().push(record),
            ValidationTarget::Component { node } => self.components.entry(node.clone()).or_default().push(record),
        }
    }

    pub fn field(&self, field: &str) -> &[ValidationRecord] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn component(&self, path: &NodePath) -> &[ValidationRecord] {
        self.components.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[ValidationRecord])> {
        self.fields.iter().map(|(field, records)| (field.as_str(), records.as_slice()))
    }

    pub fn components(&self) -> impl Iterator<Item = (&NodePath, &[ValidationRecord])> {
        self.components.iter().map(|(path, records)| (path, records.as_slice()))
    }

    pub fn records(&self) -> impl Iterator<Item = &ValidationRecord> {
        self.fields.values().chain(self.components.values()).flatten()
    }

    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.components.is_empty()
    }

    /// Records shown on `path`: its own component records plus field records of
    /// each binding, where a record naming a binding key only matches that key.
    /// A path not in `tree` has none.
    pub fn for_node(&self, tree: &NodeTree, path: &NodePath) -> NodeValidations {
        let mut records: Vec<ValidationRecord> = self.component(path).to_vec();
        if let Some(node) = tree.get(path) {
            for (key, field) in node.bindings() {
                records.extend(
                    self.field(&field.to_string())
                        .iter()
                        .filter(|record| record.binding_key().is_none_or(|bound| bound == key))
                        .cloned(),
                );
            }
        }
        NodeValidations {
            path: path.clone(),
            records,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeValidations {
    pub path: NodePath,
    pub records: Vec<ValidationRecord>,
}

impl NodeValidations {
    pub fn visible(&self, mask: ValidationMask) -> impl Iterator<Item = &ValidationRecord> {
        self.records.iter().filter(move |record| record.is_visible(mask))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
