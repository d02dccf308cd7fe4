//! Tree-walking evaluator for the builtin function set.

use super::functions::{default_date_format, format_date, round, CustomFunctionRegistry, MAX_ROUND_DECIMALS};
use super::{EvalError, Expr, ExprValue};
use crate::data::DataPath;
use crate::node::{Node, NodePath, NodeTree};
use crate::sources::{scalar_text, DataSourceBundle};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

/// A component reference made by an expression: the id looked up, where from,
/// and the node it resolved to at the time.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRead {
    pub id: String,
    pub from: Option<NodePath>,
    pub node: Option<Arc<Node>>,
}

impl ComponentRead {
    /// Whether the same lookup in `tree` still lands on the very same node.
    pub fn still_resolves(&self, tree: &NodeTree) -> bool {
        match (tree.find_nearest(&self.id, self.from.as_ref()), &self.node) {
            (Some(current), Some(recorded)) => Arc::ptr_eq(current, recorded),
            (None, None) => true,
            _ => false,
        }
    }
}

/// What an evaluation read, for invalidation of memoized results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dependencies {
    pub data: SmallVec<[DataPath; 4]>,
    pub components: SmallVec<[ComponentRead; 2]>,
}

impl Dependencies {
    pub fn add_data(&mut self, path: DataPath) {
        if !self.data.contains(&path) {
            self.data.push(path);
        }
    }

    pub fn add_component(&mut self, read: ComponentRead) {
        if !self.components.contains(&read) {
            self.components.push(read);
        }
    }

    pub fn extend(&mut self, other: Dependencies) {
        for path in other.data {
            self.add_data(path);
        }
        for read in other.components {
            self.add_component(read);
        }
    }

    pub fn reads_any(&self, changed: &[DataPath]) -> bool {
        self.data
            .iter()
            .any(|read| changed.iter().any(|path| path.overlaps(read)))
    }
}

pub struct EvalContext<'a> {
    pub sources: &'a DataSourceBundle,
    pub tree: &'a NodeTree,
    /// Effective hidden set of the current resolve pass.
    pub hidden: &'a HashSet<NodePath>,
    pub functions: &'a CustomFunctionRegistry,
    pub node: Option<&'a Node>,
    pub row_context: Option<&'a DataPath>,
    pub value: Option<&'a ExprValue>,
    pub argv: &'a [ExprValue],
    deps: RefCell<Dependencies>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        sources: &'a DataSourceBundle,
        tree: &'a NodeTree,
        hidden: &'a HashSet<NodePath>,
        functions: &'a CustomFunctionRegistry,
    ) -> Self {
        Self {
            sources,
            tree,
            hidden,
            functions,
            node: None,
            row_context: None,
            value: None,
            argv: &[],
            deps: RefCell::default(),
        }
    }

    /// Evaluates relative to `node` and its enclosing row.
    pub fn for_node(mut self, node: &'a Node) -> Self {
        self.node = Some(node);
        self.row_context = node.row_context.as_ref();
        self
    }

    pub fn in_row(mut self, row_context: Option<&'a DataPath>) -> Self {
        self.row_context = row_context;
        self
    }

    pub fn with_value(mut self, value: &'a ExprValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_argv(mut self, argv: &'a [ExprValue]) -> Self {
        self.argv = argv;
        self
    }

    pub fn take_dependencies(&self) -> Dependencies {
        self.deps.take()
    }

    fn read_data(&self, path: DataPath) -> ExprValue {
        let path = match self.row_context {
            Some(context) => path.transpose(context),
            None => path,
        };
        let value = self
            .sources
            .expression_data()
            .get(&path)
            .map_or(ExprValue::Null, ExprValue::from_json);
        self.deps.borrow_mut().add_data(path);
        value
    }

    fn component_node(&self, id: &str) -> Result<&'a Node, EvalError> {
        let from = self.node.map(|node| &node.path);
        let found = self.tree.find_nearest(id, from);
        self.deps.borrow_mut().add_component(ComponentRead {
            id: id.to_owned(),
            from: from.cloned(),
            node: found.cloned(),
        });
        found
            .map(|node| &**node)
            .ok_or_else(|| EvalError::UnknownComponent { id: id.to_owned() })
    }

    /// Value bound to a component's `simpleBinding`; null when the component is hidden.
    fn component_value(&self, node: &Node) -> ExprValue {
        if self.hidden.contains(&node.path) {
            return ExprValue::Null;
        }
        match node.descriptor.binding("simpleBinding").map(DataPath::parse) {
            Some(Ok(path)) => {
                let value = self
                    .sources
                    .expression_data()
                    .get(&path)
                    .map_or(ExprValue::Null, ExprValue::from_json);
                self.deps.borrow_mut().add_data(path);
                value
            }
            _ => ExprValue::Null,
        }
    }
}

pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<ExprValue, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Call { name, args } => call(name, args, ctx),
    }
}

fn arity(function: &str, found: usize, min: usize, max: usize) -> Result<(), EvalError> {
    if (min..=max).contains(&found) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    };
    Err(EvalError::Arity {
        function: function.to_owned(),
        expected,
        found,
    })
}

fn text_arg(function: &str, value: &ExprValue) -> Result<String, EvalError> {
    value.to_text().ok_or_else(|| EvalError::Type {
        expected: "string",
        found: format!("null (argument of {function})"),
    })
}

fn numbers(values: &[ExprValue]) -> Result<Option<(f64, f64)>, EvalError> {
    match (values[0].to_number()?, values[1].to_number()?) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        _ => Ok(None),
    }
}

fn texts(values: &[ExprValue]) -> Option<(String, String)> {
    Some((values[0].to_text()?, values[1].to_text()?))
}

fn call(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<ExprValue, EvalError> {
    // Lazily evaluated forms.
    match name {
        "if" => return eval_if(args, ctx),
        "and" | "or" => {
            arity(name, args.len(), 1, usize::MAX)?;
            let short = name == "or";
            for arg in args {
                if evaluate(arg, ctx)?.to_bool()?.unwrap_or(false) == short {
                    return Ok(ExprValue::Bool(short));
                }
            }
            return Ok(ExprValue::Bool(!short));
        }
        _ => {}
    }

    let values = args
        .iter()
        .map(|arg| evaluate(arg, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let n = values.len();

    let result = match name {
        "dataModel" => {
            arity(name, n, 1, 2)?;
            let raw = text_arg(name, &values[0])?;
            let path = DataPath::parse(&raw).map_err(|error| EvalError::InvalidDataPath {
                path: raw.clone(),
                reason: error.reason,
            })?;
            ctx.read_data(path)
        }
        "component" => {
            arity(name, n, 1, 1)?;
            let node = ctx.component_node(&text_arg(name, &values[0])?)?;
            ctx.component_value(node)
        }
        "displayValue" => {
            arity(name, n, 1, 1)?;
            let node = ctx.component_node(&text_arg(name, &values[0])?)?;
            let raw = ctx.component_value(node).to_text().unwrap_or_default();
            let display = match node.descriptor.properties.get("optionsId").and_then(|id| id.as_str()) {
                Some(options_id) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(|value| match ctx.sources.option_label(options_id, value) {
                        Some(label) => ctx.sources.text(label, ctx.row_context).value,
                        None => value.to_owned(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                None => raw,
            };
            ExprValue::String(display)
        }
        "text" => {
            arity(name, n, 1, 1)?;
            match values[0].to_text() {
                Some(key) => {
                    let lookup = ctx.sources.text(&key, ctx.row_context);
                    let mut deps = ctx.deps.borrow_mut();
                    for path in lookup.data_paths {
                        deps.add_data(path);
                    }
                    ExprValue::String(lookup.value)
                }
                None => ExprValue::Null,
            }
        }
        "language" => {
            arity(name, n, 0, 0)?;
            ExprValue::String(ctx.sources.language.clone())
        }
        "instanceContext" => {
            arity(name, n, 1, 1)?;
            let key = text_arg(name, &values[0])?;
            if !matches!(
                key.as_str(),
                "instanceOwnerPartyId" | "instanceId" | "appId" | "instanceOwnerPartyType"
            ) {
                return Err(EvalError::UnknownKey {
                    function: name.to_owned(),
                    key,
                });
            }
            ctx.sources
                .instance_context
                .get(&key)
                .map_or(ExprValue::Null, |value| ExprValue::String(scalar_text(value)))
        }
        "frontendSettings" => {
            arity(name, n, 1, 1)?;
            let key = text_arg(name, &values[0])?;
            ctx.sources
                .frontend_settings
                .get(&key)
                .map_or(ExprValue::Null, ExprValue::from_json)
        }
        "authContext" => {
            arity(name, n, 1, 1)?;
            let key = text_arg(name, &values[0])?;
            if !matches!(
                key.as_str(),
                "read" | "write" | "instantiate" | "confirm" | "sign" | "reject" | "complete"
            ) {
                return Err(EvalError::UnknownKey {
                    function: name.to_owned(),
                    key,
                });
            }
            let granted = ctx.sources.auth_context.get(&key).and_then(|value| value.as_bool());
            ExprValue::Bool(granted.unwrap_or(false))
        }
        "argv" => {
            arity(name, n, 1, 1)?;
            let index = values[0].to_number()?.unwrap_or(-1.0);
            let found = (index >= 0.0).then(|| ctx.argv.get(index as usize)).flatten();
            found.cloned().ok_or(EvalError::Argv { index })?
        }
        "value" => {
            arity(name, n, 0, 0)?;
            ctx.value.cloned().ok_or(EvalError::NoValueContext)?
        }
        "equals" => {
            arity(name, n, 2, 2)?;
            ExprValue::Bool(values[0].loose_eq(&values[1]))
        }
        "notEquals" => {
            arity(name, n, 2, 2)?;
            ExprValue::Bool(!values[0].loose_eq(&values[1]))
        }
        "not" => {
            arity(name, n, 1, 1)?;
            ExprValue::Bool(!values[0].to_bool()?.unwrap_or(false))
        }
        "greaterThan" | "greaterThanEq" | "lessThan" | "lessThanEq" => {
            arity(name, n, 2, 2)?;
            let holds = numbers(&values)?.is_some_and(|(a, b)| match name {
                "greaterThan" => a > b,
                "greaterThanEq" => a >= b,
                "lessThan" => a < b,
                _ => a <= b,
            });
            ExprValue::Bool(holds)
        }
        "concat" => ExprValue::String(values.iter().filter_map(ExprValue::to_text).collect()),
        "contains" | "notContains" => {
            arity(name, n, 2, 2)?;
            let contains = texts(&values).is_some_and(|(haystack, needle)| haystack.contains(&needle));
            ExprValue::Bool(contains == (name == "contains"))
        }
        "commaContains" => {
            arity(name, n, 2, 2)?;
            let found = texts(&values)
                .is_some_and(|(list, item)| list.split(',').any(|entry| entry.trim() == item.trim()));
            ExprValue::Bool(found)
        }
        "startsWith" => {
            arity(name, n, 2, 2)?;
            ExprValue::Bool(texts(&values).is_some_and(|(s, prefix)| s.starts_with(&prefix)))
        }
        "endsWith" => {
            arity(name, n, 2, 2)?;
            ExprValue::Bool(texts(&values).is_some_and(|(s, suffix)| s.ends_with(&suffix)))
        }
        "stringLength" => {
            arity(name, n, 1, 1)?;
            let length = values[0].to_text().map_or(0, |s| s.chars().count());
            ExprValue::Number(length as f64)
        }
        "lowerCase" | "upperCase" => {
            arity(name, n, 1, 1)?;
            match values[0].to_text() {
                Some(s) if name == "lowerCase" => ExprValue::String(s.to_lowercase()),
                Some(s) => ExprValue::String(s.to_uppercase()),
                None => ExprValue::Null,
            }
        }
        "round" => {
            arity(name, n, 1, 2)?;
            let number = values[0].to_number()?.unwrap_or(0.0);
            let decimals = match values.get(1) {
                Some(value) => value.to_number()?.unwrap_or(0.0),
                None => 0.0,
            };
            if !(0.0..=MAX_ROUND_DECIMALS as f64).contains(&decimals) {
                return Err(EvalError::Precision { decimals });
            }
            ExprValue::String(round(number, decimals as usize))
        }
        "formatDate" => {
            arity(name, n, 1, 2)?;
            let Some(date) = values[0].to_text() else {
                return Ok(ExprValue::Null);
            };
            let format = match values.get(1).and_then(ExprValue::to_text) {
                Some(format) => format,
                None => default_date_format(&ctx.sources.language).to_owned(),
            };
            format_date(&date, &format).map_or(ExprValue::Null, ExprValue::String)
        }
        "plus" | "minus" | "multiply" | "divide" => {
            arity(name, n, 2, 2)?;
            match numbers(&values)? {
                Some((_, b)) if name == "divide" && b == 0.0 => ExprValue::Null,
                Some((a, b)) => ExprValue::Number(match name {
                    "plus" => a + b,
                    "minus" => a - b,
                    "multiply" => a * b,
                    _ => a / b,
                }),
                None => ExprValue::Null,
            }
        }
        _ => match ctx.functions.get(name) {
            Some(function) => function.call(name, values)?,
            None => return Err(EvalError::UnknownFunction { name: name.to_owned() }),
        },
    };
    Ok(result)
}

/// `["if", cond, then]` or `["if", cond, then, "else", otherwise]`.
fn eval_if(args: &[Expr], ctx: &EvalContext<'_>) -> Result<ExprValue, EvalError> {
    let otherwise = match args {
        [_, _] => None,
        [_, _, marker, otherwise] if marker.as_keyword() == Some("else") => Some(otherwise),
        _ => {
            return Err(EvalError::Arity {
                function: "if".to_owned(),
                expected: "2, or 4 with \"else\"".to_owned(),
                found: args.len(),
            });
        }
    };
    if evaluate(&args[0], ctx)?.to_bool()?.unwrap_or(false) {
        evaluate(&args[1], ctx)
    } else {
        otherwise.map_or(Ok(ExprValue::Null), |expr| evaluate(expr, ctx))
    }
}
