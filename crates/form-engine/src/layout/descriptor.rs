use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A component as authored in a layout page.
///
/// Per-row copies produced by the row expander carry the authored id in
/// `base_id` and the sub-page of a multi-page repeating group in `multi_page_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data_model_bindings: IndexMap<String, String>,
    #[serde(default, rename = "baseComponentId", skip_serializing_if = "Option::is_none")]
    pub base_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_page_index: Option<usize>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl ComponentDescriptor {
    pub fn new(id: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component_type: component_type.into(),
            children: None,
            data_model_bindings: IndexMap::new(),
            base_id: None,
            multi_page_index: None,
            properties: Map::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The authored id, also for per-row copies.
    pub fn base_id(&self) -> &str {
        self.base_id.as_deref().unwrap_or(&self.id)
    }

    pub fn binding(&self, key: &str) -> Option<&str> {
        self.data_model_bindings.get(key).map(String::as_str)
    }

    /// Reads a nested property such as `edit.multiPage`.
    pub fn property(&self, path: &str) -> Option<&Value> {
        let mut keys = path.split('.');
        let first = self.properties.get(keys.next()?)?;
        keys.try_fold(first, |value, key| value.as_object()?.get(key))
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = Some(children.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_binding(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.data_model_bindings.insert(key.into(), path.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_unknown_properties() {
        let value = json!({
            "id": "group",
            "type": "RepeatingGroup",
            "children": ["a", "b"],
            "dataModelBindings": { "group": "items" },
            "edit": { "multiPage": true },
            "hidden": ["equals", 1, 1]
        });
        let descriptor = ComponentDescriptor::from_value(value.clone()).unwrap();
        assert_eq!(descriptor.binding("group"), Some("items"));
        assert_eq!(descriptor.property("edit.multiPage"), Some(&json!(true)));
        assert_eq!(descriptor.base_id(), "group");
        assert_eq!(descriptor.to_value(), value);
    }
}
