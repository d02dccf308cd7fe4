//! Expression resolution: every node's descriptor with its expression-valued
//! properties replaced by values.
//!
//! Resolution runs in passes. A pass evaluates every node against the hidden
//! set of the previous pass (`component(...)` reads null for hidden nodes), so
//! hidden-ness that depends on other hidden-ness settles over a few passes. The
//! number of passes is bounded; hitting the bound is reported as non-convergence
//! and the last pass is kept.
//!
//! Results are memoized per path across runs. A node whose `Arc` is unchanged,
//! whose recorded data dependencies saw no change and whose component references
//! still land on the same node `Arc` with the same hidden state reuses the
//! previous [`ResolvedItem`].

use crate::config::EngineConfig;
use crate::data::DataPath;
use crate::definition::ExpressionProperty;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::expr::{evaluate_value, CustomFunctionRegistry, Dependencies, EvalContext, ExprError};
use crate::layout::ComponentDescriptor;
use crate::node::{Node, NodePath, NodeTree};
use crate::rows::Row;
use crate::sources::{DataSourceBundle, HiddenComponentsMode};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Row-local values of a repeating container, e.g. `hiddenRow`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub row: Arc<Row>,
    /// Only the per-row properties.
    pub values: Map<String, Value>,
}

impl ResolvedRow {
    pub fn is_hidden(&self) -> bool {
        self.values.get("hiddenRow") == Some(&Value::Bool(true))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub path: NodePath,
    /// The descriptor as JSON with expressions replaced by their values.
    pub item: Value,
    pub rows: Vec<ResolvedRow>,
}

impl ResolvedItem {
    /// Reads a dotted property such as `textResourceBindings.title`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.item, |value, key| value.as_object()?.get(key))
    }

    pub fn bool(&self, path: &str) -> bool {
        self.get(path) == Some(&Value::Bool(true))
    }

    pub fn is_hidden(&self) -> bool {
        self.bool("hidden")
    }

    pub fn is_required(&self) -> bool {
        self.bool("required")
    }

    pub fn text_binding(&self, key: &str) -> Option<&str> {
        self.get("textResourceBindings")?.get(key)?.as_str()
    }

    pub fn row(&self, row: &Row) -> Option<&ResolvedRow> {
        self.rows.iter().find(|resolved| resolved.row.uuid == row.uuid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MemoEntry {
    pub node: Arc<Node>,
    pub dependencies: Dependencies,
}

/// Output of one resolution run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedStore {
    items: IndexMap<NodePath, Arc<ResolvedItem>>,
    /// Effective hidden state from expressions: own flag, hidden ancestor,
    /// hidden row or hidden page.
    hidden_by_expression: HashSet<NodePath>,
    mode: HiddenComponentsMode,
    pub(crate) memo: IndexMap<NodePath, MemoEntry>,
    passes: usize,
}

impl ResolvedStore {
    pub fn get(&self, path: &NodePath) -> Option<&Arc<ResolvedItem>> {
        self.items.get(path)
    }

    pub fn items(&self) -> impl Iterator<Item = &Arc<ResolvedItem>> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Hidden as far as rendering is concerned; devtools can force nodes visible.
    pub fn is_hidden(&self, path: &NodePath) -> bool {
        self.mode == HiddenComponentsMode::Hide && self.hidden_by_expression.contains(path)
    }

    pub fn is_hidden_by_expression(&self, path: &NodePath) -> bool {
        self.hidden_by_expression.contains(path)
    }

    pub fn hidden_paths(&self) -> &HashSet<NodePath> {
        &self.hidden_by_expression
    }

    /// Passes the last run needed.
    pub fn passes(&self) -> usize {
        self.passes
    }
}

/// What changed since the previous run, for memo invalidation.
#[derive(Debug, Clone, Default)]
pub struct ResolveInputs<'a> {
    pub previous: Option<&'a ResolvedStore>,
    pub changed_data: &'a [DataPath],
    /// Anything but the data models differs from the previous bundle.
    pub context_changed: bool,
}

pub struct Resolver<'a> {
    pub tree: &'a NodeTree,
    pub sources: &'a DataSourceBundle,
    pub functions: &'a CustomFunctionRegistry,
    pub config: &'a EngineConfig,
    pub sink: &'a dyn DiagnosticsSink,
}

struct Resolution {
    item: Arc<ResolvedItem>,
    dependencies: Dependencies,
}

impl Resolver<'_> {
    pub fn resolve(&self, inputs: ResolveInputs<'_>) -> Result<ResolvedStore, crate::EngineError> {
        let max_passes = self.config.max_resolve_passes.max(1);
        let mut hidden = inputs
            .previous
            .map(|store| {
                store
                    .hidden_by_expression
                    .iter()
                    .filter(|path| self.tree.contains(path))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let mut passes = 0;
        loop {
            passes += 1;
            let (items, memo) = self.pass(&hidden, &inputs, passes == 1)?;
            let next = self.hidden_set(&items);
            if next == hidden || passes >= max_passes {
                if next != hidden {
                    self.report_non_convergence(&hidden, &next, passes);
                }
                log::debug!(target: "form_engine::resolver", "resolved {} items in {passes} pass(es)", items.len());
                return Ok(ResolvedStore {
                    items,
                    hidden_by_expression: next,
                    mode: self.sources.devtools.hidden_components,
                    memo,
                    passes,
                });
            }
            hidden = next;
        }
    }

    fn report_non_convergence(&self, before: &HashSet<NodePath>, after: &HashSet<NodePath>, passes: usize) {
        let mut flipped: Vec<String> = before
            .symmetric_difference(after)
            .map(|path| self.tree.render_path(path))
            .collect();
        flipped.sort();
        self.sink.report(Diagnostic::new(
            DiagnosticKind::NonConvergence,
            format!(
                "hidden state did not settle after {passes} pass(es); still changing: {}",
                flipped.join(", ")
            ),
        ));
    }

    #[allow(clippy::type_complexity)]
    fn pass(
        &self,
        hidden: &HashSet<NodePath>,
        inputs: &ResolveInputs<'_>,
        first: bool,
    ) -> Result<(IndexMap<NodePath, Arc<ResolvedItem>>, IndexMap<NodePath, MemoEntry>), crate::EngineError> {
        let mut items = IndexMap::with_capacity(self.tree.len());
        let mut memo = IndexMap::with_capacity(self.tree.len());
        for node in self.tree.nodes() {
            let previous_item = inputs.previous.and_then(|store| store.items.get(&node.path));
            let previous_memo = inputs.previous.and_then(|store| store.memo.get(&node.path));

            let reusable = match (previous_item, previous_memo) {
                (Some(item), Some(entry))
                    if !inputs.context_changed
                        && Arc::ptr_eq(&entry.node, node)
                        && !entry.dependencies.reads_any(inputs.changed_data)
                        && entry.dependencies.components.iter().all(|read| {
                            read.still_resolves(self.tree)
                                && read.node.as_ref().is_none_or(|target| {
                                    inputs.previous.is_some_and(|store| {
                                        store.hidden_by_expression.contains(&target.path)
                                            == hidden.contains(&target.path)
                                    })
                                })
                        }) =>
                {
                    Some((item.clone(), entry.dependencies.clone()))
                }
                _ => None,
            };

            let (item, dependencies) = match reusable {
                Some(found) => found,
                None => {
                    let resolution = self.resolve_node(node, hidden, first)?;
                    // Intern: an equal result keeps the previous allocation.
                    let item = match previous_item {
                        Some(previous) if **previous == *resolution.item => previous.clone(),
                        _ => resolution.item,
                    };
                    (item, resolution.dependencies)
                }
            };
            items.insert(node.path.clone(), item);
            memo.insert(
                node.path.clone(),
                MemoEntry {
                    node: node.clone(),
                    dependencies,
                },
            );
        }
        Ok((items, memo))
    }

    fn resolve_node(&self, node: &Node, hidden: &HashSet<NodePath>, report: bool) -> Result<Resolution, crate::EngineError> {
        let ctx = EvalContext::new(self.sources, self.tree, hidden, self.functions).for_node(node);
        let item = self.resolve_properties(node, &node.descriptor, &node.definition.properties, &ctx, false, report)?;
        let mut dependencies = ctx.take_dependencies();

        let mut rows = Vec::with_capacity(node.rows().len());
        if !node.definition.row_properties.is_empty() {
            for row in node.rows() {
                // Row properties are evaluated once per row, in the context of the row's first child.
                let first_child = row.children.first().and_then(|path| self.tree.get(path));
                let row_ctx = EvalContext::new(self.sources, self.tree, hidden, self.functions);
                let row_ctx = match first_child {
                    Some(child) => row_ctx.for_node(child),
                    None => row_ctx.in_row(Some(&row.path)),
                };
                let resolved = self.resolve_properties(
                    node,
                    &node.descriptor,
                    &node.definition.row_properties,
                    &row_ctx,
                    true,
                    report,
                )?;
                dependencies.extend(row_ctx.take_dependencies());
                let values = match resolved {
                    Value::Object(values) => values,
                    _ => Map::new(),
                };
                rows.push(ResolvedRow {
                    row: row.row.clone(),
                    values,
                });
            }
        }

        Ok(Resolution {
            item: Arc::new(ResolvedItem {
                path: node.path.clone(),
                item,
                rows,
            }),
            dependencies,
        })
    }

    /// Per node: the whole descriptor, declared properties evaluated, row
    /// properties left as authored. Per row: only the row properties.
    fn resolve_properties(
        &self,
        node: &Node,
        descriptor: &ComponentDescriptor,
        declared: &[ExpressionProperty],
        ctx: &EvalContext<'_>,
        per_row: bool,
        report: bool,
    ) -> Result<Value, crate::EngineError> {
        let mut item = if per_row { Value::Object(Map::new()) } else { descriptor.to_value() };
        for property in declared {
            let paths = property.paths_on(descriptor);
            for path in paths {
                let authored = descriptor.property(&path);
                let value = match authored {
                    Some(value) => match evaluate_value(value, ctx) {
                        Ok(result) => property.ty.coerce(result).map_err(ExprError::from),
                        Err(error) => Err(error),
                    },
                    None if per_row => Ok(crate::expr::ExprValue::from_json(&property.default)),
                    None => continue,
                };
                let value = match value {
                    Ok(value) => value.to_json(),
                    Err(error) if self.config.catch_expression_errors => {
                        if report {
                            self.sink.report(
                                Diagnostic::new(
                                    DiagnosticKind::Expression,
                                    format!("'{path}' failed, using default {}: {error}", property.default),
                                )
                                .on_page(node.page())
                                .on_component(&node.id),
                            );
                        }
                        property.default.clone()
                    }
                    Err(source) => {
                        return Err(crate::EngineError::Expression {
                            component: node.id.clone(),
                            property: path,
                            source,
                        });
                    }
                };
                set_path(&mut item, &path, value);
            }
        }
        Ok(item)
    }

    /// Own `hidden` flag, hidden page, hidden row, or any hidden ancestor.
    fn hidden_set(&self, items: &IndexMap<NodePath, Arc<ResolvedItem>>) -> HashSet<NodePath> {
        let hidden_pages = self.hidden_pages();
        let mut hidden = HashSet::new();
        // Nodes are stored parents-first.
        for node in self.tree.nodes() {
            let own = items.get(&node.path).is_some_and(|item| item.is_hidden());
            let page = hidden_pages.contains(node.page());
            let inherited = node.parent.as_ref().is_some_and(|parent| hidden.contains(parent));
            let row = match (&node.parent, &node.row) {
                (Some(parent), Some(row)) => items
                    .get(parent)
                    .and_then(|item| item.row(row))
                    .is_some_and(ResolvedRow::is_hidden),
                _ => false,
            };
            if own || page || inherited || row {
                hidden.insert(node.path.clone());
            }
        }
        hidden
    }

    fn hidden_pages(&self) -> HashSet<&str> {
        let empty = HashSet::new();
        self.tree
            .pages()
            .filter(|page| {
                let Some(expression) = &page.hidden else {
                    return false;
                };
                let ctx = EvalContext::new(self.sources, self.tree, &empty, self.functions);
                match evaluate_value(expression, &ctx).and_then(|value| Ok(value.to_bool()?)) {
                    Ok(hidden) => hidden.unwrap_or(false),
                    Err(error) => {
                        self.sink.report(
                            Diagnostic::new(DiagnosticKind::Expression, format!("page hidden expression failed: {error}"))
                                .on_page(&*page.name),
                        );
                        false
                    }
                }
            })
            .map(|page| &*page.name)
            .collect()
    }
}

fn set_path(item: &mut Value, path: &str, value: Value) {
    let mut current = item;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(object) = current else {
            return;
        };
        if keys.peek().is_none() {
            object.insert(key.to_owned(), value);
            return;
        }
        current = object.entry(key.to_owned()).or_insert(Value::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_path_creates_objects() {
        let mut item = json!({ "edit": { "mode": "x" } });
        set_path(&mut item, "edit.deleteButton", json!(false));
        set_path(&mut item, "a.b", json!(1));
        assert_eq!(item, json!({ "edit": { "mode": "x", "deleteButton": false }, "a": { "b": 1 } }));
    }

    #[test]
    fn resolved_item_accessors() {
        let item = ResolvedItem {
            path: NodePath::page("P1").child("a"),
            item: json!({ "hidden": false, "required": true, "textResourceBindings": { "title": "t" } }),
            rows: Vec::new(),
        };
        assert!(!item.is_hidden());
        assert!(item.is_required());
        assert_eq!(item.text_binding("title"), Some("t"));
        assert_eq!(item.get("textResourceBindings.title"), Some(&json!("t")));
    }
}
