use crate::expr::ExprError;
use crate::validation::ValidationError;

/// Failures that abort a pipeline run.
///
/// Everything else (bad claims, non-array bindings, broken property expressions)
/// is reported to the diagnostics sink and resolved by a fallback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A property expression failed with `catchExpressionErrors` off.
    #[error("expression for '{property}' on component '{component}' failed: {source}")]
    Expression {
        component: String,
        property: String,
        #[source]
        source: ExprError,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
