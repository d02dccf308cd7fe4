use super::EvalError;
use serde_json::{Number, Value};
use std::fmt;

/// Runtime value of the expression language.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExprValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Declared result type of an expression-valued property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprType {
    Any,
    Boolean,
    Number,
    String,
}

impl ExprType {
    pub fn name(self) -> &'static str {
        match self {
            ExprType::Any => "any",
            ExprType::Boolean => "boolean",
            ExprType::Number => "number",
            ExprType::String => "string",
        }
    }

    pub fn coerce(self, value: ExprValue) -> Result<ExprValue, EvalError> {
        match self {
            ExprType::Any => Ok(value),
            ExprType::Boolean => Ok(value.to_bool()?.map_or(ExprValue::Null, ExprValue::Bool)),
            ExprType::Number => Ok(value.to_number()?.map_or(ExprValue::Null, ExprValue::Number)),
            ExprType::String => Ok(value.to_text().map_or(ExprValue::Null, ExprValue::String)),
        }
    }
}

fn looks_numeric(input: &str) -> bool {
    let digits = input.strip_prefix('-').unwrap_or(input);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

pub(crate) fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

impl ExprValue {
    /// Objects and arrays have no expression counterpart and read as null.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null | Value::Array(_) | Value::Object(_) => ExprValue::Null,
            Value::Bool(b) => ExprValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(ExprValue::Null, ExprValue::Number),
            Value::String(s) => ExprValue::String(s.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExprValue::Null => Value::Null,
            ExprValue::Bool(b) => Value::Bool(*b),
            ExprValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Value::Number(Number::from(*n as i64))
                } else {
                    Number::from_f64(*n).map_or(Value::Null, Value::Number)
                }
            }
            ExprValue::String(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ExprValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ExprValue::Null => "null",
            ExprValue::Bool(_) => "boolean",
            ExprValue::Number(_) => "number",
            ExprValue::String(_) => "string",
        }
    }

    /// `"true"`/`"false"` and `1`/`0` count as booleans; null stays null.
    pub fn to_bool(&self) -> Result<Option<bool>, EvalError> {
        match self {
            ExprValue::Null => Ok(None),
            ExprValue::Bool(b) => Ok(Some(*b)),
            ExprValue::Number(n) if *n == 1.0 => Ok(Some(true)),
            ExprValue::Number(n) if *n == 0.0 => Ok(Some(false)),
            ExprValue::String(s) => match s.as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                "" => Ok(None),
                _ => Err(self.mismatch(ExprType::Boolean)),
            },
            ExprValue::Number(_) => Err(self.mismatch(ExprType::Boolean)),
        }
    }

    /// Numeric strings count as numbers; null and the empty string stay null.
    pub fn to_number(&self) -> Result<Option<f64>, EvalError> {
        match self {
            ExprValue::Null => Ok(None),
            ExprValue::Number(n) => Ok(Some(*n)),
            ExprValue::String(s) if s.is_empty() => Ok(None),
            ExprValue::String(s) if looks_numeric(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.mismatch(ExprType::Number)),
            ExprValue::String(_) | ExprValue::Bool(_) => Err(self.mismatch(ExprType::Number)),
        }
    }

    pub fn to_text(&self) -> Option<String> {
        match self {
            ExprValue::Null => None,
            ExprValue::Bool(b) => Some(b.to_string()),
            ExprValue::Number(n) => Some(format_number(*n)),
            ExprValue::String(s) => Some(s.clone()),
        }
    }

    /// Equality as the form runtime does it: compare string forms.
    pub fn loose_eq(&self, other: &ExprValue) -> bool {
        self.to_text() == other.to_text()
    }

    fn mismatch(&self, expected: ExprType) -> EvalError {
        EvalError::Type {
            expected: expected.name(),
            found: self.to_string(),
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Null => f.write_str("null"),
            ExprValue::String(s) => write!(f, "\"{s}\""),
            other => f.write_str(&other.to_text().unwrap_or_default()),
        }
    }
}

impl From<bool> for ExprValue {
    fn from(value: bool) -> Self {
        ExprValue::Bool(value)
    }
}

impl From<f64> for ExprValue {
    fn from(value: f64) -> Self {
        ExprValue::Number(value)
    }
}

impl From<&str> for ExprValue {
    fn from(value: &str) -> Self {
        ExprValue::String(value.to_owned())
    }
}

impl From<String> for ExprValue {
    fn from(value: String) -> Self {
        ExprValue::String(value)
    }
}

impl<T: Into<ExprValue>> From<Option<T>> for ExprValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ExprValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coercions() {
        assert_eq!(ExprValue::from("true").to_bool(), Ok(Some(true)));
        assert_eq!(ExprValue::Number(0.0).to_bool(), Ok(Some(false)));
        assert!(ExprValue::from("yes").to_bool().is_err());
        assert_eq!(ExprValue::from("-1.5").to_number(), Ok(Some(-1.5)));
        assert!(ExprValue::from("1e3").to_number().is_err());
        assert_eq!(ExprValue::Number(3.0).to_text().as_deref(), Some("3"));
        assert!(ExprValue::Number(5.0).loose_eq(&ExprValue::from("5")));
        assert!(!ExprValue::Null.loose_eq(&ExprValue::from("")));
    }

    #[test]
    fn json_bridge() {
        assert_eq!(ExprValue::from_json(&json!(2)).to_json(), json!(2));
        assert_eq!(ExprValue::from_json(&json!({ "a": 1 })), ExprValue::Null);
        assert_eq!(ExprValue::Number(0.5).to_json(), json!(0.5));
        assert_eq!(ExprType::String.coerce(ExprValue::Bool(true)), Ok(ExprValue::from("true")));
    }
}
