//! Validation records, producers and aggregation.

mod aggregator;
mod map;
pub mod producers;

pub use aggregator::{ValidationAggregator, ValidationContext};
pub use map::{NodeValidations, ValidationMap};
pub use producers::{
    BackendIssue, BackendValidations, ComponentProducer, ExpressionProducer, ExpressionValidationConfig,
    SchemaIssue, SchemaProducer, ValidationProducer,
};

use crate::node::NodePath;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Validation categories. A record is visible when `record.category & mask` is non-empty.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValidationMask: u8 {
        const SCHEMA = 1 << 0;
        const COMPONENT = 1 << 1;
        const EXPRESSION = 1 << 2;
        const CUSTOM_BACKEND = 1 << 3;
        const REQUIRED = 1 << 4;
        const BACKEND = 1 << 5;

        const ALL_EXCEPT_REQUIRED = Self::SCHEMA.bits()
            | Self::COMPONENT.bits()
            | Self::EXPRESSION.bits()
            | Self::CUSTOM_BACKEND.bits()
            | Self::BACKEND.bits();
        const ALL = Self::ALL_EXCEPT_REQUIRED.bits() | Self::REQUIRED.bits();
    }
}

impl ValidationMask {
    /// Parses the category names used in layouts (`"Required"`, `"AllExceptRequired"`, ...).
    pub fn from_category(name: &str) -> Option<Self> {
        Some(match name {
            "Schema" => Self::SCHEMA,
            "Component" => Self::COMPONENT,
            "Expression" => Self::EXPRESSION,
            "CustomBackend" => Self::CUSTOM_BACKEND,
            "Required" => Self::REQUIRED,
            "Backend" => Self::BACKEND,
            "AllExceptRequired" => Self::ALL_EXCEPT_REQUIRED,
            "All" => Self::ALL,
            _ => return None,
        })
    }

    pub fn from_categories<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .filter_map(Self::from_category)
            .fold(Self::empty(), |mask, category| mask | category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSource {
    Schema,
    Component,
    Expression,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

impl ValidationMessage {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(key: impl Into<String>, params: impl IntoIterator<Item = String>) -> Self {
        Self {
            key: key.into(),
            params: params.into_iter().collect(),
        }
    }
}

/// What a record is about: a data-model field or a whole component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationTarget {
    Field {
        field: String,
        binding_key: Option<String>,
    },
    Component {
        node: NodePath,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationRecord {
    pub message: ValidationMessage,
    pub severity: Severity,
    pub source: ValidationSource,
    /// JSON Schema keyword of a schema record, independent of its message.
    pub keyword: Option<String>,
    pub category: ValidationMask,
    pub target: ValidationTarget,
}

impl ValidationRecord {
    pub fn field(&self) -> Option<&str> {
        match &self.target {
            ValidationTarget::Field { field, .. } => Some(field),
            ValidationTarget::Component { .. } => None,
        }
    }

    pub fn binding_key(&self) -> Option<&str> {
        match &self.target {
            ValidationTarget::Field { binding_key, .. } => binding_key.as_deref(),
            ValidationTarget::Component { .. } => None,
        }
    }

    pub fn is_visible(&self, mask: ValidationMask) -> bool {
        self.category.intersects(mask)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("validation condition for '{field}' failed to evaluate: {source}")]
    Condition {
        field: String,
        #[source]
        source: crate::expr::EvalError,
    },
    #[error("validation condition for '{field}' is malformed: {source}")]
    MalformedCondition {
        field: String,
        #[source]
        source: crate::expr::ExprParseError,
    },
    #[error("unknown validation definition '{reference}' used for '{field}'")]
    UnknownDefinition { field: String, reference: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_disjoint_bits() {
        let all = [
            ValidationMask::SCHEMA,
            ValidationMask::COMPONENT,
            ValidationMask::EXPRESSION,
            ValidationMask::CUSTOM_BACKEND,
            ValidationMask::REQUIRED,
            ValidationMask::BACKEND,
        ];
        for (i, a) in all.iter().enumerate() {
            assert_eq!(a.bits().count_ones(), 1);
            for b in &all[i + 1..] {
                assert!(!a.intersects(*b));
            }
        }
        assert!(!ValidationMask::ALL_EXCEPT_REQUIRED.contains(ValidationMask::REQUIRED));
    }

    #[test]
    fn parses_layout_category_names() {
        assert_eq!(
            ValidationMask::from_categories(["Required", "Schema", "Nope"]),
            ValidationMask::REQUIRED | ValidationMask::SCHEMA
        );
        assert_eq!(ValidationMask::from_category("All"), Some(ValidationMask::ALL));
    }
}
