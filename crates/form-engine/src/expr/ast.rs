use super::ExprValue;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Parsed expression: a literal or a `["function", arg, ...]` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ExprValue),
    Call { name: Arc<str>, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprParseError {
    #[error("expected a function call, found an empty array")]
    EmptyCall,
    #[error("function name must be a string, found {found}")]
    FunctionName { found: String },
    #[error("objects are not valid expression arguments: {found}")]
    UnsupportedLiteral { found: String },
}

impl Expr {
    /// True for values authored as expressions (arrays starting with a function name).
    pub fn is_expression(value: &Value) -> bool {
        matches!(value, Value::Array(items) if matches!(items.first(), Some(Value::String(_))))
    }

    pub fn parse(value: &Value) -> Result<Expr, ExprParseError> {
        match value {
            Value::Array(items) => {
                let (name, args) = items.split_first().ok_or(ExprParseError::EmptyCall)?;
                let Value::String(name) = name else {
                    return Err(ExprParseError::FunctionName { found: name.to_string() });
                };
                Ok(Expr::Call {
                    name: name.as_str().into(),
                    args: args.iter().map(Expr::parse).collect::<Result<_, _>>()?,
                })
            }
            Value::Object(_) => Err(ExprParseError::UnsupportedLiteral { found: value.to_string() }),
            literal => Ok(Expr::Literal(ExprValue::from_json(literal))),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Expr::Call { name, .. } => Some(name),
            Expr::Literal(_) => None,
        }
    }

    /// The literal string argument, used for the `"else"` marker of `if`.
    pub(crate) fn as_keyword(&self) -> Option<&str> {
        match self {
            Expr::Literal(ExprValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Call { name, args } => {
                write!(f, "[\"{name}\"")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_calls() {
        let expr = Expr::parse(&json!(["equals", ["dataModel", "a.b"], 3])).unwrap();
        assert_eq!(expr.name(), Some("equals"));
        assert_eq!(expr.to_string(), "[\"equals\", [\"dataModel\", \"a.b\"], 3]");
        assert!(Expr::is_expression(&json!(["not", true])));
        assert!(!Expr::is_expression(&json!([1, 2])));
        assert!(!Expr::is_expression(&json!(true)));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(Expr::parse(&json!([])), Err(ExprParseError::EmptyCall));
        assert!(matches!(Expr::parse(&json!([1])), Err(ExprParseError::FunctionName { .. })));
        assert!(matches!(
            Expr::parse(&json!(["not", { "a": 1 }])),
            Err(ExprParseError::UnsupportedLiteral { .. })
        ));
    }
}
