//! Injected custom functions and the pure helpers behind a few builtins.

use super::{EvalError, ExprType, ExprValue};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

type Body = dyn Fn(&[ExprValue]) -> Result<ExprValue, String> + Send + Sync;

#[derive(Clone)]
pub struct CustomFunction {
    pub args: Vec<ExprType>,
    pub returns: ExprType,
    body: Arc<Body>,
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("args", &self.args)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl CustomFunction {
    pub fn call(&self, name: &str, args: Vec<ExprValue>) -> Result<ExprValue, EvalError> {
        if args.len() != self.args.len() {
            return Err(EvalError::Arity {
                function: name.to_owned(),
                expected: self.args.len().to_string(),
                found: args.len(),
            });
        }
        let args = self
            .args
            .iter()
            .zip(args)
            .map(|(ty, value)| ty.coerce(value))
            .collect::<Result<Vec<_>, _>>()?;
        let result = (self.body)(&args).map_err(|message| EvalError::Custom {
            function: name.to_owned(),
            message,
        })?;
        self.returns.coerce(result)
    }
}

/// Functions available to expressions on top of the builtins.
///
/// Builtins win over custom functions with the same name.
#[derive(Debug, Clone, Default)]
pub struct CustomFunctionRegistry {
    functions: IndexMap<String, CustomFunction>,
}

impl CustomFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, args: Vec<ExprType>, returns: ExprType, body: F)
    where
        F: Fn(&[ExprValue]) -> Result<ExprValue, String> + Send + Sync + 'static,
    {
        self.functions.insert(
            name.into(),
            CustomFunction {
                args,
                returns,
                body: Arc::new(body),
            },
        );
    }

    pub fn with<F>(mut self, name: impl Into<String>, args: Vec<ExprType>, returns: ExprType, body: F) -> Self
    where
        F: Fn(&[ExprValue]) -> Result<ExprValue, String> + Send + Sync + 'static,
    {
        self.register(name, args, returns, body);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CustomFunction> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

/// Largest `decimals` accepted by `round`.
pub(crate) const MAX_ROUND_DECIMALS: usize = 100;

/// `round(number, decimals)` renders with a fixed number of decimals.
pub(crate) fn round(number: f64, decimals: usize) -> String {
    let factor = 10f64.powi(decimals as i32);
    // Half away from zero, like the form runtime.
    let rounded = (number * factor).round() / factor;
    format!("{rounded:.decimals$}")
}

struct DateParts {
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

fn parse_date(input: &str) -> Option<DateParts> {
    let (date, time) = match input.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (input, None),
    };
    let mut date = date.splitn(3, '-');
    let year = date.next()?.parse().ok()?;
    let month = date.next()?.parse().ok()?;
    let day = date.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let mut parts = DateParts {
        year,
        month,
        day,
        hour: 0,
        minute: 0,
        second: 0,
    };
    if let Some(time) = time {
        let time = time.trim_end_matches('Z');
        let time = time.split(['+', '.']).next().unwrap_or(time);
        let mut fields = time.splitn(3, ':');
        parts.hour = fields.next().and_then(|h| h.parse().ok()).unwrap_or(0);
        parts.minute = fields.next().and_then(|m| m.parse().ok()).unwrap_or(0);
        parts.second = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    }
    Some(parts)
}

pub(crate) fn default_date_format(language: &str) -> &'static str {
    match language {
        "en" => "MM/dd/yyyy",
        _ => "dd.MM.yyyy",
    }
}

/// Formats an ISO date with `yyyy`, `yy`, `MM`, `dd`, `HH`, `mm` and `ss` tokens.
pub(crate) fn format_date(input: &str, format: &str) -> Option<String> {
    let date = parse_date(input)?;
    let tokens: [(&str, String); 7] = [
        ("yyyy", format!("{:04}", date.year)),
        ("yy", format!("{:02}", date.year % 100)),
        ("MM", format!("{:02}", date.month)),
        ("dd", format!("{:02}", date.day)),
        ("HH", format!("{:02}", date.hour)),
        ("mm", format!("{:02}", date.minute)),
        ("ss", format!("{:02}", date.second)),
    ];
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    'outer: while !rest.is_empty() {
        for (token, value) in &tokens {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(value);
                rest = after;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_functions_coerce_arguments() {
        let registry = CustomFunctionRegistry::new().with(
            "double",
            vec![ExprType::Number],
            ExprType::Number,
            |args| match args {
                [ExprValue::Number(n)] => Ok(ExprValue::Number(n * 2.0)),
                _ => Err("expected a number".into()),
            },
        );
        let double = registry.get("double").unwrap();
        assert_eq!(double.call("double", vec!["21".into()]), Ok(ExprValue::Number(42.0)));
        assert!(matches!(double.call("double", vec![]), Err(EvalError::Arity { .. })));
        assert!(matches!(
            double.call("double", vec![ExprValue::Null]),
            Err(EvalError::Custom { .. })
        ));
    }

    #[test]
    fn rounding_and_dates() {
        assert_eq!(round(2.346, 2), "2.35");
        assert_eq!(round(2.5, 0), "3");
        assert_eq!(format_date("2024-03-07", "dd.MM.yyyy").as_deref(), Some("07.03.2024"));
        assert_eq!(
            format_date("2024-03-07T09:05:00Z", "yy-MM-dd HH:mm").as_deref(),
            Some("24-03-07 09:05")
        );
        assert_eq!(format_date("not a date", "yyyy"), None);
    }
}
