//! JSON data model with path lookups and array-row queries.

use super::path::{DataPath, PathIndex, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataModelError {
    #[error("path '{0}' contains an unresolved placeholder")]
    Placeholder(String),
    #[error("cannot descend into '{path}': found {found}")]
    NotContainer { path: String, found: &'static str },
    #[error("'{0}' is not an array")]
    NotArray(String),
}

/// Outcome of reading the rows of a repeating binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowsLookup<'a> {
    Rows(&'a [Value]),
    /// Nothing stored at the path yet; zero rows without complaint.
    Missing,
    /// Something other than an array is stored at the path.
    NotArray(&'a Value),
}

/// Immutable snapshot of a data model. Cloning is cheap; writes copy on demand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct DataModel {
    root: Arc<Value>,
}

impl From<Value> for DataModel {
    fn from(root: Value) -> Self {
        Self { root: Arc::new(root) }
    }
}

impl From<DataModel> for Value {
    fn from(model: DataModel) -> Self {
        Arc::unwrap_or_clone(model.root)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn step<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    let field = value.as_object()?.get(&*segment.name)?;
    match &segment.index {
        None => Some(field),
        Some(PathIndex::At(index)) => field.as_array()?.get(*index),
        Some(PathIndex::Placeholder(_)) => None,
    }
}

impl DataModel {
    pub fn new(root: Value) -> Self {
        Self::from(root)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn ptr_eq(&self, other: &DataModel) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    pub fn get(&self, path: &DataPath) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        path.segments()
            .iter()
            .try_fold(&*self.root, |value, segment| step(value, segment))
    }

    pub fn rows(&self, path: &DataPath) -> RowsLookup<'_> {
        match self.get(path) {
            None | Some(Value::Null) => RowsLookup::Missing,
            Some(Value::Array(rows)) => RowsLookup::Rows(rows),
            Some(other) => RowsLookup::NotArray(other),
        }
    }

    pub fn set(&mut self, path: &DataPath, value: Value) -> Result<(), DataModelError> {
        if path.has_placeholders() {
            return Err(DataModelError::Placeholder(path.to_string()));
        }
        let root = Arc::make_mut(&mut self.root);
        let slot = slot_mut(root, path)?;
        *slot = value;
        Ok(())
    }

    /// Appends `row` to the array at `path`, creating the array when missing.
    pub fn append_row(&mut self, path: &DataPath, row: Value) -> Result<usize, DataModelError> {
        if path.has_placeholders() {
            return Err(DataModelError::Placeholder(path.to_string()));
        }
        let root = Arc::make_mut(&mut self.root);
        let slot = slot_mut(root, path)?;
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        let rows = slot
            .as_array_mut()
            .ok_or_else(|| DataModelError::NotArray(path.to_string()))?;
        rows.push(row);
        Ok(rows.len() - 1)
    }

    pub fn remove_row(&mut self, path: &DataPath, index: usize) -> Result<Option<Value>, DataModelError> {
        if !matches!(self.rows(path), RowsLookup::Rows(rows) if index < rows.len()) {
            return Ok(None);
        }
        let root = Arc::make_mut(&mut self.root);
        let rows = slot_mut(root, path)?
            .as_array_mut()
            .ok_or_else(|| DataModelError::NotArray(path.to_string()))?;
        Ok(Some(rows.remove(index)))
    }

    /// Copy of the model where every object inside an array carries a row id in
    /// `field`. Existing ids are kept.
    pub fn with_row_ids(&self, field: &str) -> DataModel {
        let mut root = Value::clone(&self.root);
        assign_row_ids(&mut root, field, false);
        if root == *self.root {
            return self.clone();
        }
        DataModel::from(root)
    }

    /// Paths whose value differs between `self` and `other`, as coarse as possible.
    pub fn changed_paths(&self, other: &DataModel) -> Vec<DataPath> {
        let mut changed = Vec::new();
        if self.ptr_eq(other) {
            return changed;
        }
        diff(&self.root, &other.root, &mut Vec::new(), &mut changed);
        changed
    }
}

fn slot_mut<'a>(root: &'a mut Value, path: &DataPath) -> Result<&'a mut Value, DataModelError> {
    let mut current = root;
    for segment in path.segments() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let found = type_name(current);
        let object = current.as_object_mut().ok_or_else(|| DataModelError::NotContainer {
            path: path.to_string(),
            found,
        })?;
        let field = object
            .entry(segment.name.to_string())
            .or_insert(Value::Null);
        current = match segment.index.as_ref().and_then(PathIndex::concrete) {
            None => field,
            Some(index) => {
                if field.is_null() {
                    *field = Value::Array(Vec::new());
                }
                let found = type_name(field);
                let rows = field.as_array_mut().ok_or_else(|| DataModelError::NotContainer {
                    path: path.to_string(),
                    found,
                })?;
                if rows.len() <= index {
                    rows.resize(index + 1, Value::Null);
                }
                &mut rows[index]
            }
        };
    }
    Ok(current)
}

fn assign_row_ids(value: &mut Value, field: &str, in_array: bool) {
    match value {
        Value::Array(items) => {
            for item in items {
                assign_row_ids(item, field, true);
            }
        }
        Value::Object(object) => {
            if in_array && !object.get(field).is_some_and(Value::is_string) {
                object.insert(field.to_owned(), Value::String(Ulid::new().to_string()));
            }
            for (_, child) in object.iter_mut() {
                assign_row_ids(child, field, false);
            }
        }
        _ => {}
    }
}

fn diff(old: &Value, new: &Value, at: &mut Vec<PathSegment>, changed: &mut Vec<DataPath>) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_child) in a {
                let new_child = b.get(key).unwrap_or(&Value::Null);
                diff_field(key, old_child, new_child, at, changed);
            }
            for (key, new_child) in b {
                if !a.contains_key(key) {
                    diff_field(key, &Value::Null, new_child, at, changed);
                }
            }
        }
        _ => changed.push(DataPath::from_segments(at.iter().cloned())),
    }
}

fn diff_field(key: &str, old: &Value, new: &Value, at: &mut Vec<PathSegment>, changed: &mut Vec<DataPath>) {
    if old == new {
        return;
    }
    match (old, new) {
        // Same-length arrays diff per element; anything else marks the whole field.
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (index, (old_item, new_item)) in a.iter().zip(b.iter()).enumerate() {
                at.push(PathSegment::at(key, index));
                diff(old_item, new_item, at, changed);
                at.pop();
            }
        }
        _ => {
            at.push(PathSegment::new(key));
            diff(old, new, at, changed);
            at.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(input: &str) -> DataPath {
        DataPath::parse(input).unwrap()
    }

    #[test]
    fn lookups_and_rows() {
        let model = DataModel::new(json!({ "items": [{ "a": 1 }, { "a": 2 }], "name": "x", "flag": true }));
        assert_eq!(model.get(&path("items[1].a")), Some(&json!(2)));
        assert_eq!(model.get(&path("items[5].a")), None);
        assert!(matches!(model.rows(&path("items")), RowsLookup::Rows(rows) if rows.len() == 2));
        assert_eq!(model.rows(&path("missing")), RowsLookup::Missing);
        assert!(matches!(model.rows(&path("name")), RowsLookup::NotArray(_)));
    }

    #[test]
    fn writes_create_containers() {
        let mut model = DataModel::default();
        model.set(&path("a.b[1].c"), json!("v")).unwrap();
        assert_eq!(model.root(), &json!({ "a": { "b": [null, { "c": "v" }] } }));
        assert!(model.set(&path("a.b[{i}].c"), json!(1)).is_err());

        let index = model.append_row(&path("list"), json!({ "x": 1 })).unwrap();
        assert_eq!(index, 0);
        assert_eq!(model.remove_row(&path("list"), 0).unwrap(), Some(json!({ "x": 1 })));
        assert_eq!(model.remove_row(&path("list"), 0).unwrap(), None);
    }

    #[test]
    fn snapshots_are_copy_on_write() {
        let original = DataModel::new(json!({ "a": 1 }));
        let mut copy = original.clone();
        assert!(copy.ptr_eq(&original));
        copy.set(&path("a"), json!(2)).unwrap();
        assert_eq!(original.get(&path("a")), Some(&json!(1)));
        assert!(!copy.ptr_eq(&original));
    }

    #[test]
    fn row_ids_are_assigned_once() {
        let model = DataModel::new(json!({ "items": [{ "a": 1 }, { "a": 2, "rowId": "keep" }] }));
        let with_ids = model.with_row_ids("rowId");
        assert_eq!(with_ids.get(&path("items[1].rowId")), Some(&json!("keep")));
        assert!(with_ids.get(&path("items[0].rowId")).is_some_and(Value::is_string));
        let again = with_ids.with_row_ids("rowId");
        assert!(again.ptr_eq(&with_ids));
    }

    #[test]
    fn diff_reports_changed_leaves() {
        let old = DataModel::new(json!({ "items": [{ "a": 1 }, { "a": 2 }], "x": 1 }));
        let new = DataModel::new(json!({ "items": [{ "a": 1 }, { "a": 3 }], "x": 1, "y": true }));
        let changed: Vec<String> = old.changed_paths(&new).iter().map(ToString::to_string).collect();
        assert_eq!(changed, vec!["items[1].a", "y"]);

        let grown = DataModel::new(json!({ "items": [{ "a": 1 }, { "a": 2 }, {}], "x": 1 }));
        let changed: Vec<String> = old.changed_paths(&grown).iter().map(ToString::to_string).collect();
        assert_eq!(changed, vec!["items"]);
    }
}
