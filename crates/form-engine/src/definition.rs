//! Component definitions: what a `type` can do, looked up by name.
//!
//! A definition is a plain record (category, capability bits, claim style,
//! expression properties) instead of a class hierarchy. The engine dispatches
//! on these fields only.

use crate::expr::ExprType;
use crate::layout::ComponentDescriptor;
use crate::validation::{ValidationRecord, ValidationSource};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentCategory {
    Container,
    Form,
    Presentation,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u16 {
        const CLAIMS_CHILDREN = 1 << 0;
        /// Multiplies its children once per element of a bound array.
        const REPEATING = 1 << 1;
        const DATA_BINDING = 1 << 2;
        const OPTIONS = 1 << 3;
        const ATTACHMENTS = 1 << 4;
        const RENDER_IN_TABLE = 1 << 5;
        const RENDER_IN_BUTTON_GROUP = 1 << 6;
        const RENDER_IN_LIKERT = 1 << 7;
    }
}

/// Where a container finds the ids it claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimStyle {
    None,
    /// `children: [...]`
    Children,
    /// `children: [...]`, entries may be `"<page>:<id>"` when `edit.multiPage` is set.
    MultiPageChildren,
    /// `rows[].cells[].component`
    GridCells,
    /// `tabs[].children[]`
    Tabs,
    /// One child generated from the container itself.
    Generated,
}

/// Built-in checks run by the component validation producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentValidator {
    /// `required` and `maxLength` on bound fields.
    Field,
    /// `minCount` / `maxCount` on the number of rows.
    RowCount,
    /// `minNumberOfAttachments` / `maxNumberOfAttachments`.
    Attachments,
}

/// Returns false for records the component wants suppressed.
pub type ValidationFilter = fn(&ValidationRecord, &ComponentDescriptor) -> bool;

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionProperty {
    /// Dotted property path. A trailing `.*` covers every key of that object.
    pub path: &'static str,
    pub ty: ExprType,
    pub default: Value,
}

impl ExpressionProperty {
    pub fn new(path: &'static str, ty: ExprType, default: Value) -> Self {
        Self { path, ty, default }
    }

    /// Concrete property paths this declaration covers on `descriptor`.
    pub fn paths_on(&self, descriptor: &ComponentDescriptor) -> Vec<String> {
        match self.path.strip_suffix(".*") {
            Some(object) => descriptor
                .property(object)
                .and_then(Value::as_object)
                .map(|keys| keys.keys().map(|key| format!("{object}.{key}")).collect())
                .unwrap_or_default(),
            None => vec![self.path.to_owned()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    pub type_name: String,
    pub category: ComponentCategory,
    pub capabilities: Capabilities,
    pub claim_style: ClaimStyle,
    /// Binding key holding the array a repeating container multiplies over.
    pub repetition: Option<&'static str>,
    /// Children must carry one of these capabilities.
    pub accepts: Option<Capabilities>,
    pub properties: Vec<ExpressionProperty>,
    /// Evaluated once per row instead of once per node.
    pub row_properties: Vec<ExpressionProperty>,
    pub filter: Option<ValidationFilter>,
    pub validator: Option<ComponentValidator>,
}

impl PartialEq for ComponentDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

fn common_properties(category: ComponentCategory) -> Vec<ExpressionProperty> {
    let mut properties = vec![
        ExpressionProperty::new("hidden", ExprType::Boolean, Value::Bool(false)),
        ExpressionProperty::new("textResourceBindings.*", ExprType::String, Value::Null),
    ];
    if category == ComponentCategory::Form {
        properties.push(ExpressionProperty::new("required", ExprType::Boolean, Value::Bool(false)));
        properties.push(ExpressionProperty::new("readOnly", ExprType::Boolean, Value::Bool(false)));
    }
    properties
}

impl ComponentDefinition {
    pub fn new(type_name: impl Into<String>, category: ComponentCategory) -> Self {
        let capabilities = match category {
            ComponentCategory::Form => Capabilities::DATA_BINDING | Capabilities::RENDER_IN_TABLE,
            ComponentCategory::Presentation => Capabilities::RENDER_IN_TABLE,
            ComponentCategory::Container => Capabilities::empty(),
        };
        Self {
            type_name: type_name.into(),
            category,
            capabilities,
            claim_style: ClaimStyle::None,
            repetition: None,
            accepts: None,
            properties: common_properties(category),
            row_properties: Vec::new(),
            filter: None,
            validator: (category == ComponentCategory::Form).then_some(ComponentValidator::Field),
        }
    }

    pub fn container(type_name: impl Into<String>, claim_style: ClaimStyle) -> Self {
        let mut definition = Self::new(type_name, ComponentCategory::Container);
        definition.claim_style = claim_style;
        definition.capabilities |= Capabilities::CLAIMS_CHILDREN;
        definition
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    pub fn repeating(mut self, binding_key: &'static str) -> Self {
        self.repetition = Some(binding_key);
        self.capabilities |= Capabilities::REPEATING;
        self
    }

    pub fn accepting(mut self, capabilities: Capabilities) -> Self {
        self.accepts = Some(capabilities);
        self
    }

    pub fn with_property(mut self, path: &'static str, ty: ExprType, default: Value) -> Self {
        self.properties.push(ExpressionProperty::new(path, ty, default));
        self
    }

    pub fn with_row_property(mut self, path: &'static str, ty: ExprType, default: Value) -> Self {
        self.row_properties.push(ExpressionProperty::new(path, ty, default));
        self
    }

    pub fn with_filter(mut self, filter: ValidationFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_validator(mut self, validator: Option<ComponentValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn claims_children(&self) -> bool {
        self.claim_style != ClaimStyle::None
    }

    pub fn accepts_child(&self, child: &ComponentDefinition) -> bool {
        self.accepts
            .is_none_or(|accepted| child.capabilities.intersects(accepted))
    }

    /// Properties and row properties in one list, looked up by concrete path.
    pub fn property(&self, path: &str) -> Option<&ExpressionProperty> {
        self.properties
            .iter()
            .chain(&self.row_properties)
            .find(|property| match property.path.strip_suffix(".*") {
                Some(object) => path
                    .strip_prefix(object)
                    .is_some_and(|rest| rest.starts_with('.')),
                None => property.path == path,
            })
    }
}

/// A repeating container with its own row limits reports them itself; the
/// schema's `minItems`/`maxItems` for the same array would be a duplicate.
fn suppress_schema_item_counts(record: &ValidationRecord, descriptor: &ComponentDescriptor) -> bool {
    if record.source != ValidationSource::Schema {
        return true;
    }
    let own_limit = match record.keyword.as_deref() {
        Some("minItems") => "minCount",
        Some("maxItems") => "maxCount",
        _ => return true,
    };
    !descriptor.properties.contains_key(own_limit)
}

#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    definitions: IndexMap<String, Arc<ComponentDefinition>>,
    unknown: Arc<ComponentDefinition>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self {
            definitions: IndexMap::new(),
            unknown: Arc::new(
                ComponentDefinition::new("Unknown", ComponentCategory::Presentation).with_capabilities(
                    Capabilities::RENDER_IN_BUTTON_GROUP | Capabilities::RENDER_IN_LIKERT,
                ),
            ),
        }
    }

    pub fn standard() -> Self {
        use ComponentCategory::{Form, Presentation};
        use ExprType::Boolean;

        let row_buttons = |definition: ComponentDefinition| {
            definition
                .with_row_property("hiddenRow", Boolean, Value::Bool(false))
                .with_row_property("edit.editButton", Boolean, Value::Bool(true))
                .with_row_property("edit.deleteButton", Boolean, Value::Bool(true))
                .with_row_property("edit.saveButton", Boolean, Value::Bool(true))
                .with_row_property("edit.saveAndNextButton", Boolean, Value::Bool(false))
                .with_row_property("edit.alertOnDelete", Boolean, Value::Bool(false))
        };

        let mut registry = Self::empty();
        for definition in [
            ComponentDefinition::container("Group", ClaimStyle::Children),
            row_buttons(
                ComponentDefinition::container("RepeatingGroup", ClaimStyle::MultiPageChildren)
                    .repeating("group")
                    .with_filter(suppress_schema_item_counts)
                    .with_validator(Some(ComponentValidator::RowCount)),
            ),
            ComponentDefinition::container("Likert", ClaimStyle::Generated)
                .repeating("questions")
                .accepting(Capabilities::RENDER_IN_LIKERT)
                .with_property("required", Boolean, Value::Bool(false))
                .with_property("readOnly", Boolean, Value::Bool(false)),
            ComponentDefinition::new("LikertItem", Form)
                .with_capabilities(Capabilities::OPTIONS | Capabilities::RENDER_IN_LIKERT),
            ComponentDefinition::container("Grid", ClaimStyle::GridCells).accepting(Capabilities::RENDER_IN_TABLE),
            ComponentDefinition::container("Tabs", ClaimStyle::Tabs),
            ComponentDefinition::container("Accordion", ClaimStyle::Children),
            ComponentDefinition::container("ButtonGroup", ClaimStyle::Children)
                .accepting(Capabilities::RENDER_IN_BUTTON_GROUP),
            ComponentDefinition::new("Input", Form),
            ComponentDefinition::new("TextArea", Form),
            ComponentDefinition::new("Checkboxes", Form).with_capabilities(Capabilities::OPTIONS),
            ComponentDefinition::new("RadioButtons", Form).with_capabilities(Capabilities::OPTIONS),
            ComponentDefinition::new("Dropdown", Form).with_capabilities(Capabilities::OPTIONS),
            ComponentDefinition::new("Datepicker", Form),
            ComponentDefinition::new("FileUpload", Form)
                .with_capabilities(Capabilities::ATTACHMENTS)
                .with_validator(Some(ComponentValidator::Attachments)),
            ComponentDefinition::new("Header", Presentation),
            ComponentDefinition::new("Paragraph", Presentation),
            ComponentDefinition::new("Image", Presentation),
            ComponentDefinition::new("Button", Presentation).with_capabilities(Capabilities::RENDER_IN_BUTTON_GROUP),
            ComponentDefinition::new("NavigationButtons", Presentation)
                .with_capabilities(Capabilities::RENDER_IN_BUTTON_GROUP),
        ] {
            registry.register(definition);
        }
        registry
    }

    pub fn register(&mut self, definition: ComponentDefinition) {
        self.definitions
            .insert(definition.type_name.clone(), Arc::new(definition));
    }

    pub fn lookup(&self, type_name: &str) -> Option<&Arc<ComponentDefinition>> {
        self.definitions.get(type_name)
    }

    /// Like [`lookup`](Self::lookup), with unknown types treated as childless
    /// presentation components.
    pub fn resolve(&self, type_name: &str) -> &Arc<ComponentDefinition> {
        self.lookup(type_name).unwrap_or(&self.unknown)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodePath;
    use crate::validation::{Severity, ValidationMask, ValidationMessage, ValidationTarget};
    use serde_json::json;

    fn record(source: ValidationSource, keyword: &str, key: &str) -> ValidationRecord {
        ValidationRecord {
            message: ValidationMessage::new(key),
            severity: Severity::Error,
            source,
            keyword: Some(keyword.to_owned()),
            category: ValidationMask::SCHEMA,
            target: ValidationTarget::Component {
                node: NodePath::page("P1").child("group"),
            },
        }
    }

    #[test]
    fn standard_registry_dispatch() {
        let registry = ComponentRegistry::standard();
        let group = registry.resolve("RepeatingGroup");
        assert_eq!(group.category, ComponentCategory::Container);
        assert!(group.capabilities.contains(Capabilities::REPEATING | Capabilities::CLAIMS_CHILDREN));
        assert_eq!(group.repetition, Some("group"));
        assert!(group.property("hiddenRow").is_some());

        let unknown = registry.resolve("Fancy");
        assert!(registry.lookup("Fancy").is_none());
        assert!(!unknown.claims_children());

        let buttons = registry.resolve("ButtonGroup");
        assert!(buttons.accepts_child(registry.resolve("Button")));
        assert!(!buttons.accepts_child(registry.resolve("Input")));
    }

    #[test]
    fn wildcard_properties() {
        let input = ComponentRegistry::standard().resolve("Input").clone();
        let descriptor = ComponentDescriptor::new("a", "Input")
            .with_property("textResourceBindings", json!({ "title": "t", "description": "d" }));
        let declared = input.property("textResourceBindings.title").unwrap();
        assert_eq!(
            declared.paths_on(&descriptor),
            ["textResourceBindings.title", "textResourceBindings.description"]
        );
        assert!(input.property("textResourceBindingsX").is_none());
    }

    #[test]
    fn repeating_group_filters_duplicate_schema_counts() {
        let filter = ComponentRegistry::standard().resolve("RepeatingGroup").filter.unwrap();
        let with_limit = ComponentDescriptor::new("group", "RepeatingGroup").with_property("minCount", json!(1));
        let without = ComponentDescriptor::new("group", "RepeatingGroup");
        let schema = record(ValidationSource::Schema, "minItems", "validation_errors.minItems");
        assert!(!filter(&schema, &with_limit));
        assert!(filter(&schema, &without));
        let custom = record(ValidationSource::Schema, "minItems", "app.too_few_items");
        assert!(!filter(&custom, &with_limit));
        let component = record(ValidationSource::Component, "minItems", "validation_errors.minItems");
        assert!(filter(&component, &with_limit));
        let pattern = record(ValidationSource::Schema, "pattern", "validation_errors.minItems");
        assert!(filter(&pattern, &with_limit));
    }
}
