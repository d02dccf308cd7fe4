//! Read-only inputs of one pipeline run besides the layout.

use crate::data::{DataModel, DataPath};
use crate::node::NodePath;
use crate::rows::RowUuid;
use crate::validation::SchemaIssue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataSourceBundle {
    /// Fresh data model, used to detect rows.
    pub data_model: DataModel,
    /// Debounced data model read by expressions. Falls back to the fresh one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounced_data_model: Option<DataModel>,
    pub language: String,
    pub text_resources: Vec<TextResource>,
    pub instance_context: Map<String, Value>,
    pub frontend_settings: Map<String, Value>,
    pub auth_context: Map<String, Value>,
    /// Uploaded files per upload component instance.
    pub attachments: Vec<NodeAttachments>,
    /// Resolved option lists keyed by `optionsId`.
    pub options: IndexMap<String, Vec<OptionEntry>>,
    /// Externally evaluated JSON Schema findings.
    pub schema_issues: Vec<SchemaIssue>,
    pub devtools: DevtoolsOverrides,
}

impl Default for DataSourceBundle {
    fn default() -> Self {
        Self {
            data_model: DataModel::default(),
            debounced_data_model: None,
            language: "nb".to_owned(),
            text_resources: Vec::new(),
            instance_context: Map::new(),
            frontend_settings: Map::new(),
            auth_context: Map::new(),
            attachments: Vec::new(),
            options: IndexMap::new(),
            schema_issues: Vec::new(),
            devtools: DevtoolsOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResource {
    pub id: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<TextVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextVariable {
    pub key: String,
    pub data_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The files of one upload component instance. Rows are named by uuid, so the
/// owner survives index shifts when rows before it are removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttachments {
    /// Base id of the upload component.
    pub component: String,
    /// Row uuids of the enclosing repeating containers, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<RowUuid>,
    pub files: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub value: Value,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HiddenComponentsMode {
    #[default]
    Hide,
    /// Render hidden components anyway.
    Show,
    /// Render hidden components greyed out.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevtoolsOverrides {
    pub hidden_components: HiddenComponentsMode,
}

/// A text resource with its variables filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLookup {
    pub value: String,
    /// Data model paths read while filling variables.
    pub data_paths: Vec<DataPath>,
}

impl DataSourceBundle {
    pub fn new(data_model: DataModel) -> Self {
        Self {
            data_model,
            ..Self::default()
        }
    }

    /// The model expressions read.
    pub fn expression_data(&self) -> &DataModel {
        self.debounced_data_model.as_ref().unwrap_or(&self.data_model)
    }

    /// Everything expressions read, other than the data models, is equal.
    pub fn context_eq(&self, other: &DataSourceBundle) -> bool {
        self.language == other.language
            && self.text_resources == other.text_resources
            && self.instance_context == other.instance_context
            && self.frontend_settings == other.frontend_settings
            && self.auth_context == other.auth_context
            && self.attachments == other.attachments
            && self.options == other.options
            && self.devtools == other.devtools
    }

    /// Files uploaded through the node at `path`.
    pub fn attachments_of(&self, path: &NodePath) -> &[Attachment] {
        let Some(base_id) = path.base_id() else {
            return &[];
        };
        self.attachments
            .iter()
            .find(|owned| owned.component == base_id && owned.rows.iter().eq(path.row_uuids()))
            .map(|owned| owned.files.as_slice())
            .unwrap_or_default()
    }

    /// Replaces the files of one upload component instance.
    pub fn set_attachments(&mut self, component: &str, rows: Vec<RowUuid>, files: Vec<Attachment>) {
        match self
            .attachments
            .iter_mut()
            .find(|owned| owned.component == component && owned.rows == rows)
        {
            Some(owned) => owned.files = files,
            None => self.attachments.push(NodeAttachments {
                component: component.to_owned(),
                rows,
                files,
            }),
        }
    }

    pub fn text_resource(&self, key: &str) -> Option<&TextResource> {
        self.text_resources.iter().find(|resource| resource.id == key)
    }

    /// Looks up a text resource and fills `{n}` variables. Data model variables are
    /// read relative to `row_context`. Unknown keys resolve to the key itself.
    pub fn text(&self, key: &str, row_context: Option<&DataPath>) -> TextLookup {
        let Some(resource) = self.text_resource(key) else {
            return TextLookup {
                value: key.to_owned(),
                data_paths: Vec::new(),
            };
        };
        let mut value = resource.value.clone();
        let mut data_paths = Vec::new();
        for (index, variable) in resource.variables.iter().enumerate() {
            let replacement = match variable.data_source.as_str() {
                source if source.starts_with("dataModel") => match DataPath::parse(&variable.key) {
                    Ok(path) => {
                        let path = match row_context {
                            Some(context) => path.transpose(context),
                            None => path,
                        };
                        let found = self.expression_data().get(&path).map(scalar_text);
                        data_paths.push(path);
                        found.unwrap_or_default()
                    }
                    Err(_) => String::new(),
                },
                "instanceContext" => self.instance_context.get(&variable.key).map(scalar_text).unwrap_or_default(),
                "applicationSettings" => self.frontend_settings.get(&variable.key).map(scalar_text).unwrap_or_default(),
                _ => String::new(),
            };
            value = value.replace(&format!("{{{index}}}"), &replacement);
        }
        TextLookup { value, data_paths }
    }

    pub fn option_label(&self, options_id: &str, value: &str) -> Option<&str> {
        self.options
            .get(options_id)?
            .iter()
            .find(|option| scalar_text(&option.value) == value)
            .map(|option| option.label.as_str())
    }
}

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
