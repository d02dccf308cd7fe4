//! Independent sources of validation records.
//!
//! Every producer appends to a shared list; none of them sees or suppresses the
//! others' output. Suppression happens later, in the aggregator, through the
//! component definitions' filters.

use super::{
    Severity, ValidationContext, ValidationError, ValidationMask, ValidationMessage, ValidationRecord,
    ValidationSource, ValidationTarget,
};
use crate::data::DataPath;
use crate::definition::ComponentValidator;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::expr::{evaluate_value, EvalContext, ExprError, ExprValue};
use crate::node::{Node, NodePath, NodeTree};
use crate::resolver::ResolvedItem;
use crate::sources::scalar_text;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub trait ValidationProducer {
    fn produce(&self, ctx: &ValidationContext<'_>, out: &mut Vec<ValidationRecord>) -> Result<(), ValidationError>;
}

/// A finding of the externally evaluated JSON Schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Data model path, `items[0].name`.
    pub field: String,
    /// Failing schema keyword, e.g. `minItems`.
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    /// Custom `errorMessage` text key from the schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Canonical form of a field path, or the input when it does not parse.
fn canonical_field(field: &str) -> String {
    DataPath::parse(field).map_or_else(|_| field.to_owned(), |path| path.to_string())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaProducer;

impl ValidationProducer for SchemaProducer {
    fn produce(&self, ctx: &ValidationContext<'_>, out: &mut Vec<ValidationRecord>) -> Result<(), ValidationError> {
        for issue in &ctx.sources.schema_issues {
            let key = issue
                .message
                .clone()
                .unwrap_or_else(|| format!("validation_errors.{}", issue.keyword));
            out.push(ValidationRecord {
                message: ValidationMessage::with_params(key, issue.params.iter().cloned()),
                severity: Severity::Error,
                source: ValidationSource::Schema,
                keyword: Some(issue.keyword.clone()),
                category: ValidationMask::SCHEMA,
                target: ValidationTarget::Field {
                    field: canonical_field(&issue.field),
                    binding_key: None,
                },
            });
        }
        Ok(())
    }
}

/// Built-in checks driven by each node's [`ComponentValidator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentProducer;

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn limit(item: &ResolvedItem, property: &str) -> Option<usize> {
    item.get(property)?.as_u64().and_then(|value| usize::try_from(value).ok())
}

fn component_error(node: &Node, key: &str, params: Vec<String>) -> ValidationRecord {
    ValidationRecord {
        message: ValidationMessage::with_params(key, params),
        severity: Severity::Error,
        source: ValidationSource::Component,
        keyword: None,
        category: ValidationMask::COMPONENT,
        target: ValidationTarget::Component {
            node: node.path.clone(),
        },
    }
}

impl ComponentProducer {
    fn field_checks(ctx: &ValidationContext<'_>, node: &Node, item: &ResolvedItem, out: &mut Vec<ValidationRecord>) {
        let title = item
            .text_binding("title")
            .map(|key| ctx.sources.text(key, node.row_context.as_ref()).value);
        let max_length = limit(item, "maxLength");
        for (key, field) in node.bindings() {
            let value = ctx.sources.data_model.get(&field);
            let target = ValidationTarget::Field {
                field: field.to_string(),
                binding_key: Some(key.to_owned()),
            };
            if item.is_required() && is_empty_value(value) {
                out.push(ValidationRecord {
                    message: ValidationMessage::with_params(
                        "form_filler.error_required",
                        [title.clone().unwrap_or_else(|| field.to_string())],
                    ),
                    severity: Severity::Error,
                    source: ValidationSource::Component,
                    keyword: None,
                    category: ValidationMask::REQUIRED,
                    target: target.clone(),
                });
            }
            let length = value.filter(|value| !value.is_null()).map(|value| scalar_text(value).chars().count());
            if let (Some(max), Some(length)) = (max_length, length) {
                if length <= max {
                    continue;
                }
                out.push(ValidationRecord {
                    message: ValidationMessage::with_params("validation_errors.maxLength", [max.to_string()]),
                    severity: Severity::Error,
                    source: ValidationSource::Component,
                    keyword: None,
                    category: ValidationMask::COMPONENT,
                    target,
                });
            }
        }
    }

    fn row_count_checks(node: &Node, item: &ResolvedItem, out: &mut Vec<ValidationRecord>) {
        let Some(binding) = node.definition.repetition.and_then(|key| node.descriptor.binding(key)) else {
            return;
        };
        let rows = node.rows().len();
        let field = canonical_field(binding);
        let mut push = |key: &str, bound: usize| {
            out.push(ValidationRecord {
                message: ValidationMessage::with_params(key, [bound.to_string()]),
                severity: Severity::Error,
                source: ValidationSource::Component,
                keyword: None,
                category: ValidationMask::COMPONENT,
                target: ValidationTarget::Field {
                    field: field.clone(),
                    binding_key: node.definition.repetition.map(str::to_owned),
                },
            });
        };
        if let Some(min) = limit(item, "minCount").filter(|min| rows < *min) {
            push("validation_errors.minItems", min);
        }
        if let Some(max) = limit(item, "maxCount").filter(|max| rows > *max) {
            push("validation_errors.maxItems", max);
        }
    }

    fn attachment_checks(ctx: &ValidationContext<'_>, node: &Node, item: &ResolvedItem, out: &mut Vec<ValidationRecord>) {
        let count = ctx.sources.attachments_of(&node.path).len();
        if let Some(min) = limit(item, "minNumberOfAttachments").filter(|min| count < *min) {
            out.push(component_error(
                node,
                "form_filler.file_uploader_validation_error_file_number_min",
                vec![min.to_string()],
            ));
        }
        if let Some(max) = limit(item, "maxNumberOfAttachments").filter(|max| count > *max) {
            out.push(component_error(
                node,
                "form_filler.file_uploader_validation_error_file_number_max",
                vec![max.to_string()],
            ));
        }
    }
}

impl ValidationProducer for ComponentProducer {
    fn produce(&self, ctx: &ValidationContext<'_>, out: &mut Vec<ValidationRecord>) -> Result<(), ValidationError> {
        for node in ctx.tree.nodes() {
            let Some(validator) = node.definition.validator else {
                continue;
            };
            if ctx.resolved.is_hidden_by_expression(&node.path) {
                continue;
            }
            let Some(item) = ctx.resolved.get(&node.path) else {
                continue;
            };
            match validator {
                ComponentValidator::Field => Self::field_checks(ctx, node, item, out),
                ComponentValidator::RowCount => Self::row_count_checks(node, item, out),
                ComponentValidator::Attachments => Self::attachment_checks(ctx, node, item, out),
            }
        }
        Ok(())
    }
}

/// One entry of a field's validation list: a definition name or an inline
/// definition, which may extend a named one through `$ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpressionValidationRef {
    Named(String),
    Inline(ExpressionValidationDefinition),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpressionValidationDefinition {
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl ExpressionValidationDefinition {
    /// Fields set here win over the referenced definition.
    fn merged_over(&self, base: &ExpressionValidationDefinition) -> ExpressionValidationDefinition {
        ExpressionValidationDefinition {
            reference: None,
            condition: self.condition.clone().or_else(|| base.condition.clone()),
            message: self.message.clone().or_else(|| base.message.clone()),
            severity: self.severity.or(base.severity),
        }
    }
}

/// Expression validations keyed by index-less field path (`items.amount`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionValidationConfig {
    pub validations: IndexMap<String, Vec<ExpressionValidationRef>>,
    pub definitions: IndexMap<String, ExpressionValidationDefinition>,
}

impl ExpressionValidationConfig {
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }

    /// The definitions that apply to `field`, with references followed.
    pub fn definitions_for(&self, field: &str) -> Result<Vec<ExpressionValidationDefinition>, ValidationError> {
        let Some(entries) = self.validations.get(field) else {
            return Ok(Vec::new());
        };
        let standalone = ExpressionValidationDefinition::default();
        entries
            .iter()
            .map(|entry| {
                let (inline, reference) = match entry {
                    ExpressionValidationRef::Named(name) => (None, Some(name)),
                    ExpressionValidationRef::Inline(definition) => (Some(definition), definition.reference.as_ref()),
                };
                let base = match reference {
                    Some(name) => self.definitions.get(name).ok_or_else(|| ValidationError::UnknownDefinition {
                        field: field.to_owned(),
                        reference: name.clone(),
                    })?,
                    None => &standalone,
                };
                Ok(match inline {
                    Some(inline) => inline.merged_over(base),
                    None => base.clone(),
                })
            })
            .collect()
    }
}

/// Evaluates configured conditions per bound field. A condition evaluating to
/// true produces its message. Broken conditions fail the run.
#[derive(Debug, Clone, Default)]
pub struct ExpressionProducer {
    pub config: ExpressionValidationConfig,
}

impl ExpressionProducer {
    pub fn new(config: ExpressionValidationConfig) -> Self {
        Self { config }
    }
}

impl ValidationProducer for ExpressionProducer {
    fn produce(&self, ctx: &ValidationContext<'_>, out: &mut Vec<ValidationRecord>) -> Result<(), ValidationError> {
        if self.config.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::new();
        for node in ctx.tree.nodes() {
            if ctx.resolved.is_hidden_by_expression(&node.path) {
                continue;
            }
            for (key, field) in node.bindings() {
                let concrete = field.to_string();
                if !seen.insert(concrete.clone()) {
                    continue;
                }
                let pattern = field.without_indices().to_string();
                for definition in self.config.definitions_for(&pattern)? {
                    let (Some(condition), Some(message)) = (&definition.condition, &definition.message) else {
                        ctx.sink.report(
                            Diagnostic::new(
                                DiagnosticKind::Validation,
                                format!("expression validation for '{pattern}' needs both a condition and a message"),
                            )
                            .on_page(node.page())
                            .on_component(&node.id),
                        );
                        continue;
                    };
                    let value = ctx
                        .sources
                        .expression_data()
                        .get(&field)
                        .map_or(ExprValue::Null, ExprValue::from_json);
                    let argv = [value.clone()];
                    let eval = EvalContext::new(ctx.sources, ctx.tree, ctx.resolved.hidden_paths(), ctx.functions)
                        .for_node(node)
                        .with_value(&value)
                        .with_argv(&argv);
                    let failed = evaluate_value(condition, &eval)
                        .and_then(|result| Ok(result.to_bool()?))
                        .map_err(|error| match error {
                            ExprError::Parse(source) => ValidationError::MalformedCondition {
                                field: concrete.clone(),
                                source,
                            },
                            ExprError::Eval(source) => ValidationError::Condition {
                                field: concrete.clone(),
                                source,
                            },
                        })?;
                    if failed == Some(true) {
                        out.push(ValidationRecord {
                            message: ValidationMessage::new(message.clone()),
                            severity: definition.severity.unwrap_or(Severity::Error),
                            source: ValidationSource::Expression,
                            keyword: None,
                            category: ValidationMask::EXPRESSION,
                            target: ValidationTarget::Field {
                                field: concrete.clone(),
                                binding_key: Some(key.to_owned()),
                            },
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// An issue returned by the backend, addressed by field or by rendered component id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// `Custom` marks app-specific backend validators.
    #[serde(default)]
    pub source: String,
}

fn default_severity() -> Severity {
    Severity::Error
}

impl BackendIssue {
    pub fn category(&self) -> ValidationMask {
        if self.source == "Custom" {
            ValidationMask::CUSTOM_BACKEND
        } else {
            ValidationMask::BACKEND
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StoredIssue {
    binding_key: Option<String>,
    message: ValidationMessage,
    severity: Severity,
    category: ValidationMask,
}

/// Backend issues attached to node paths when received.
///
/// Field issues remember the binding key instead of the field, and the field is
/// re-rendered from the node's current binding on every run. Rows keep their
/// issues across re-indexing; removed nodes lose theirs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendValidations {
    by_node: IndexMap<NodePath, Vec<StoredIssue>>,
    /// Field issues no node was bound to when they arrived.
    unbound: Vec<ValidationRecord>,
}

impl BackendValidations {
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty() && self.unbound.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_node.values().map(Vec::len).sum::<usize>() + self.unbound.len()
    }

    /// Replaces every stored issue with `issues`.
    pub fn ingest(&mut self, tree: &NodeTree, issues: impl IntoIterator<Item = BackendIssue>, sink: &dyn DiagnosticsSink) {
        self.by_node.clear();
        self.unbound.clear();
        for issue in issues {
            let category = issue.category();
            let message = ValidationMessage::with_params(issue.key, issue.params);
            match (issue.field, issue.component) {
                (Some(field), _) => {
                    let field = canonical_field(&field);
                    match tree.nodes_for_field(&field).first() {
                        Some((path, key)) => self.by_node.entry(path.clone()).or_default().push(StoredIssue {
                            binding_key: Some(key.clone()),
                            message,
                            severity: issue.severity,
                            category,
                        }),
                        None => self.unbound.push(ValidationRecord {
                            message,
                            severity: issue.severity,
                            source: ValidationSource::Backend,
                            keyword: None,
                            category,
                            target: ValidationTarget::Field {
                                field,
                                binding_key: None,
                            },
                        }),
                    }
                }
                (None, Some(component)) => match tree.find_by_id(&component) {
                    Some(node) => self.by_node.entry(node.path.clone()).or_default().push(StoredIssue {
                        binding_key: None,
                        message,
                        severity: issue.severity,
                        category,
                    }),
                    None => sink.report(
                        Diagnostic::new(
                            DiagnosticKind::Validation,
                            format!("backend issue '{}' targets an unknown component", message.key),
                        )
                        .on_component(component),
                    ),
                },
                (None, None) => sink.report(Diagnostic::new(
                    DiagnosticKind::Validation,
                    format!("backend issue '{}' has neither field nor component", message.key),
                )),
            }
        }
        log::debug!(target: "form_engine::validation", "ingested backend issues for {} node(s)", self.by_node.len());
    }

    /// Drops issues of nodes no longer in `tree`.
    pub fn prune(&mut self, tree: &NodeTree) {
        self.by_node.retain(|path, _| tree.contains(path));
    }
}

impl ValidationProducer for BackendValidations {
    fn produce(&self, ctx: &ValidationContext<'_>, out: &mut Vec<ValidationRecord>) -> Result<(), ValidationError> {
        for (path, issues) in &self.by_node {
            let Some(node) = ctx.tree.get(path) else {
                continue;
            };
            for issue in issues {
                let target = match &issue.binding_key {
                    Some(key) => match node.descriptor.binding(key) {
                        Some(field) => ValidationTarget::Field {
                            field: canonical_field(field),
                            binding_key: Some(key.clone()),
                        },
                        None => continue,
                    },
                    None => ValidationTarget::Component { node: path.clone() },
                };
                out.push(ValidationRecord {
                    message: issue.message.clone(),
                    severity: issue.severity,
                    source: ValidationSource::Backend,
                    keyword: None,
                    category: issue.category,
                    target,
                });
            }
        }
        out.extend(self.unbound.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn follows_definition_references() {
        let config = ExpressionValidationConfig::from_json(json!({
            "validations": {
                "items.amount": [
                    "positive",
                    { "$ref": "positive", "severity": "warning", "message": "amount.low" }
                ]
            },
            "definitions": {
                "positive": { "condition": ["lessThan", ["value"], 0], "message": "amount.negative" }
            }
        }))
        .unwrap();
        let definitions = config.definitions_for("items.amount").unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].message.as_deref(), Some("amount.negative"));
        assert_eq!(definitions[1].message.as_deref(), Some("amount.low"));
        assert_eq!(definitions[1].severity, Some(Severity::Warning));
        assert_eq!(definitions[1].condition, definitions[0].condition);
        assert!(config.definitions_for("other").unwrap().is_empty());
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let config = ExpressionValidationConfig::from_json(json!({
            "validations": { "a": ["missing"] }
        }))
        .unwrap();
        assert_eq!(
            config.definitions_for("a"),
            Err(ValidationError::UnknownDefinition {
                field: "a".into(),
                reference: "missing".into()
            })
        );
    }

    #[test]
    fn backend_category_by_source() {
        let issue: BackendIssue = serde_json::from_value(json!({ "field": "a", "key": "k", "source": "Custom" })).unwrap();
        assert_eq!(issue.category(), ValidationMask::CUSTOM_BACKEND);
        assert_eq!(issue.severity, Severity::Error);
        let issue: BackendIssue = serde_json::from_value(json!({ "component": "c", "key": "k" })).unwrap();
        assert_eq!(issue.category(), ValidationMask::BACKEND);
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some(&json!("  "))));
        assert!(is_empty_value(Some(&json!([]))));
        assert!(!is_empty_value(Some(&json!(0))));
        assert!(!is_empty_value(Some(&json!(false))));
    }
}
