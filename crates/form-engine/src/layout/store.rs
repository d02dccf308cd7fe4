use super::descriptor::ComponentDescriptor;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("page '{page}' has no component list (expected an array or {{\"data\": {{\"layout\": [...]}}}})")]
    Shape { page: String },
    #[error("page '{page}', component #{index}: {source}")]
    Component {
        page: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageDescriptor {
    pub name: Arc<str>,
    pub components: Vec<Arc<ComponentDescriptor>>,
    /// Page-level `hidden` expression or literal.
    pub hidden: Option<Value>,
}

impl PageDescriptor {
    pub fn new(name: impl Into<Arc<str>>, components: impl IntoIterator<Item = ComponentDescriptor>) -> Self {
        Self {
            name: name.into(),
            components: components.into_iter().map(Arc::new).collect(),
            hidden: None,
        }
    }

    /// Accepts a bare component array or a page file `{ "data": { "layout": [...], "hidden": ... } }`.
    pub fn parse(name: &str, value: &Value) -> Result<Self, LayoutError> {
        let (list, hidden) = match value {
            Value::Array(list) => (list, None),
            Value::Object(object) => {
                let data = object.get("data").and_then(Value::as_object);
                let list = data
                    .and_then(|data| data.get("layout"))
                    .and_then(Value::as_array)
                    .ok_or_else(|| LayoutError::Shape { page: name.to_owned() })?;
                (list, data.and_then(|data| data.get("hidden")).cloned())
            }
            _ => return Err(LayoutError::Shape { page: name.to_owned() }),
        };
        let components = list
            .iter()
            .enumerate()
            .map(|(index, component)| {
                ComponentDescriptor::from_value(component.clone())
                    .map(Arc::new)
                    .map_err(|source| LayoutError::Component {
                        page: name.to_owned(),
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            components,
            hidden,
        })
    }

    pub fn component(&self, id: &str) -> Option<&Arc<ComponentDescriptor>> {
        self.components.iter().find(|component| component.id == id)
    }
}

/// Per-page flat descriptor lists for one layout generation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutStore {
    generation: u64,
    pages: IndexMap<Arc<str>, PageDescriptor>,
}

impl LayoutStore {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            pages: IndexMap::new(),
        }
    }

    pub fn from_json<'a>(
        generation: u64,
        pages: impl IntoIterator<Item = (&'a str, &'a Value)>,
    ) -> Result<Self, LayoutError> {
        let mut store = Self::new(generation);
        for (name, value) in pages {
            store.insert_page(PageDescriptor::parse(name, value)?);
        }
        Ok(store)
    }

    pub fn with_page(mut self, page: PageDescriptor) -> Self {
        self.insert_page(page);
        self
    }

    pub fn insert_page(&mut self, page: PageDescriptor) {
        self.pages.insert(page.name.clone(), page);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pages(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.pages.values()
    }

    pub fn page(&self, name: &str) -> Option<&PageDescriptor> {
        self.pages.get(name)
    }

    /// First page declaring a component with this id.
    pub fn page_of(&self, id: &str) -> Option<&Arc<str>> {
        self.pages
            .values()
            .find(|page| page.component(id).is_some())
            .map(|page| &page.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_page_files_and_bare_lists() {
        let file = json!({ "data": { "layout": [{ "id": "a", "type": "Input" }], "hidden": true } });
        let bare = json!([{ "id": "b", "type": "Paragraph" }]);
        let store = LayoutStore::from_json(3, [("P1", &file), ("P2", &bare)]).unwrap();
        assert_eq!(store.generation(), 3);
        assert_eq!(store.page("P1").unwrap().hidden, Some(json!(true)));
        assert_eq!(store.page_of("b").map(|name| &**name), Some("P2"));
        let names: Vec<&str> = store.pages().map(|page| &*page.name).collect();
        assert_eq!(names, ["P1", "P2"]);
    }

    #[test]
    fn reports_bad_components() {
        let bad = json!([{ "id": "a" }]);
        let error = LayoutStore::from_json(0, [("P1", &bad)]).unwrap_err();
        assert!(matches!(error, LayoutError::Component { index: 0, .. }));
        assert!(matches!(
            LayoutStore::from_json(0, [("P1", &json!(1))]),
            Err(LayoutError::Shape { .. })
        ));
    }
}
