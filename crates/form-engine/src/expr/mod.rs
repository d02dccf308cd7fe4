//! The expression language embedded in component configuration.
//!
//! Expressions are JSON arrays in prefix form, `["equals", ["dataModel", "a.b"], "yes"]`,
//! evaluated synchronously against a [`DataSourceBundle`](crate::DataSourceBundle)
//! and the current node tree.

mod ast;
mod eval;
mod functions;
mod value;

pub use ast::{Expr, ExprParseError};
pub use eval::{evaluate, ComponentRead, Dependencies, EvalContext};
pub use functions::{CustomFunction, CustomFunctionRegistry};
pub use value::{ExprType, ExprValue};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("'{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("expected {expected}, found {found}")]
    Type { expected: &'static str, found: String },
    #[error("invalid data model path '{path}': {reason}")]
    InvalidDataPath { path: String, reason: String },
    #[error("unknown component '{id}'")]
    UnknownComponent { id: String },
    #[error("'{function}' has no key '{key}'")]
    UnknownKey { function: String, key: String },
    #[error("no argument at position {index}")]
    Argv { index: f64 },
    #[error("round precision {decimals} is outside 0..=100")]
    Precision { decimals: f64 },
    #[error("value() used outside a validation")]
    NoValueContext,
    #[error("custom function '{function}' failed: {message}")]
    Custom { function: String, message: String },
}

/// Either half of turning a JSON value into a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error(transparent)]
    Parse(#[from] ExprParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Parses and evaluates `value` when it is an expression; literals convert directly.
pub fn evaluate_value(value: &serde_json::Value, ctx: &EvalContext<'_>) -> Result<ExprValue, ExprError> {
    if !Expr::is_expression(value) {
        return Ok(ExprValue::from_json(value));
    }
    let expr = Expr::parse(value)?;
    Ok(evaluate(&expr, ctx)?)
}
