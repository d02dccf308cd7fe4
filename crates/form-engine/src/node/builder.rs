//! Materializes nodes from claims and rows.
//!
//! Nodes are rebuilt on every run. A rebuilt node that equals its predecessor at
//! the same path is replaced by the previous `Arc`, so unchanged subtrees stay
//! reference-stable for the resolver's memo.

use super::path::NodePath;
use super::tree::{Node, NodeChildren, NodeTree, PageNodes, RowChildren};
use crate::assembler::{PageStructure, Structure};
use crate::config::EngineConfig;
use crate::data::{DataModel, DataPath};
use crate::definition::ComponentRegistry;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::rows::{self, Row, RowFrame, RowWarning};
use std::sync::Arc;

pub struct TreeBuilder<'a> {
    structure: &'a Structure,
    registry: &'a ComponentRegistry,
    data: &'a DataModel,
    previous: Option<&'a NodeTree>,
    config: &'a EngineConfig,
    sink: &'a dyn DiagnosticsSink,
    tree: NodeTree,
    /// Nodes in pre-order; a parent's slot is reserved before its children are built.
    ordered: Vec<Option<(NodePath, Arc<Node>)>>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        structure: &'a Structure,
        registry: &'a ComponentRegistry,
        data: &'a DataModel,
        config: &'a EngineConfig,
        sink: &'a dyn DiagnosticsSink,
    ) -> Self {
        Self {
            structure,
            registry,
            data,
            previous: None,
            config,
            sink,
            tree: NodeTree::default(),
            ordered: Vec::new(),
        }
    }

    pub fn reusing(mut self, previous: Option<&'a NodeTree>) -> Self {
        self.previous = previous;
        self
    }

    pub fn build(mut self) -> NodeTree {
        let structure = self.structure;
        self.tree.generation = structure.generation;
        for page in structure.pages.values() {
            let root = NodePath::page(page.name.clone());
            let mut top_level = Vec::with_capacity(page.top_level.len());
            for id in &page.top_level {
                let path = root.child(id.clone());
                self.build_node(page, id, path.clone(), None, &[], None);
                top_level.push(path);
            }
            self.tree.pages.insert(
                page.name.clone(),
                PageNodes {
                    name: page.name.clone(),
                    top_level,
                    hidden: page.hidden.clone(),
                },
            );
        }
        self.tree.nodes = self.ordered.drain(..).flatten().collect();
        log::debug!(target: "form_engine::node", "built {} nodes", self.tree.nodes.len());
        self.tree
    }

    fn report(&self, kind: DiagnosticKind, page: &PageStructure, component: &str, message: String) {
        self.sink.report(
            Diagnostic::new(kind, message)
                .on_page(&*page.name)
                .on_component(component),
        );
    }

    /// Rows of a repeating node, reusing the previous node's rows where unchanged.
    fn expand_rows(
        &self,
        page: &PageStructure,
        id: &str,
        binding: Option<&str>,
        previous: Option<&Arc<Node>>,
    ) -> Option<(DataPath, Vec<Arc<Row>>)> {
        let Some(raw) = binding else {
            self.report(DiagnosticKind::RowBinding, page, id, "repeating component has no array binding".into());
            return None;
        };
        let binding = match DataPath::parse(raw) {
            Ok(binding) => binding,
            Err(error) => {
                self.report(DiagnosticKind::DataPath, page, id, error.to_string());
                return None;
            }
        };
        let previous_rows: Vec<Arc<Row>> = previous
            .map(|node| node.rows().iter().map(|row| row.row.clone()).collect())
            .unwrap_or_default();
        let expansion = rows::expand(&binding, self.data, &previous_rows, &self.config.row_id_field);
        for warning in expansion.warnings {
            if matches!(warning, RowWarning::NotArray { .. }) && !self.config.warn_on_non_array_binding {
                continue;
            }
            self.report(DiagnosticKind::RowBinding, page, id, warning.to_string());
        }
        Some((binding, expansion.rows))
    }

    fn build_node(
        &mut self,
        page: &'a PageStructure,
        id: &Arc<str>,
        path: NodePath,
        parent: Option<NodePath>,
        frames: &[RowFrame],
        multi_page_index: Option<usize>,
    ) {
        let Some(authored) = page.component(id) else {
            return;
        };
        let previous = self.previous.and_then(|tree| tree.get(&path));

        let mut descriptor = if frames.is_empty() {
            authored.clone()
        } else {
            Arc::new(rows::mutate_descriptor(authored, frames, multi_page_index))
        };
        if let Some(previous) = previous.filter(|node| node.descriptor == descriptor) {
            descriptor = previous.descriptor.clone();
        }
        let definition = self.registry.resolve(&descriptor.component_type).clone();

        let slot = self.ordered.len();
        self.ordered.push(None);
        let claims = page.claims_of(id);
        let children = match definition.repetition {
            Some(key) => {
                let expanded = self.expand_rows(page, &descriptor.id, descriptor.binding(key), previous);
                let (binding, rows) = expanded.unwrap_or_default();
                let mut row_children = Vec::with_capacity(rows.len());
                for row in rows {
                    let frame = RowFrame {
                        group_binding: binding.clone(),
                        row: row.clone(),
                    };
                    let row_path = frame.row_path();
                    let nested: Vec<RowFrame> = frames.iter().cloned().chain([frame]).collect();
                    let row_node = path.row(row.uuid.clone());
                    let mut children = Vec::with_capacity(claims.len());
                    for claim in claims {
                        let child = row_node.child(claim.child.clone());
                        self.build_node(page, &claim.child, child.clone(), Some(path.clone()), &nested, claim.multi_page_index);
                        children.push(child);
                    }
                    row_children.push(RowChildren {
                        row,
                        path: row_path,
                        children,
                    });
                }
                NodeChildren::Rows(row_children)
            }
            None if claims.is_empty() => NodeChildren::None,
            None => {
                let mut children = Vec::with_capacity(claims.len());
                for claim in claims {
                    let child = path.child(claim.child.clone());
                    let index = claim.multi_page_index.or(multi_page_index);
                    self.build_node(page, &claim.child, child.clone(), Some(path.clone()), frames, index);
                    children.push(child);
                }
                NodeChildren::Static(children)
            }
        };

        let node = Node {
            path: path.clone(),
            id: descriptor.id.clone(),
            base_id: descriptor.base_id().into(),
            definition,
            parent,
            children,
            row: frames.last().map(|frame| frame.row.clone()),
            row_context: frames.last().map(RowFrame::row_path),
            multi_page_index: multi_page_index.or(descriptor.multi_page_index),
            descriptor,
        };
        let node = match previous {
            Some(previous) if **previous == node => previous.clone(),
            _ => Arc::new(node),
        };

        self.tree.by_id.insert(node.id.clone(), path.clone());
        self.tree
            .by_base_id
            .entry(node.base_id.clone())
            .or_default()
            .push(path.clone());
        for (key, field) in node.bindings() {
            self.tree
                .by_field
                .entry(field.to_string())
                .or_default()
                .push((path.clone(), key.to_owned()));
        }
        self.ordered[slot] = Some((path, node));
    }
}

/// Builds the node tree for `structure` over the fresh data model.
pub fn build_tree(
    structure: &Structure,
    registry: &ComponentRegistry,
    data: &DataModel,
    previous: Option<&NodeTree>,
    config: &EngineConfig,
    sink: &dyn DiagnosticsSink,
) -> NodeTree {
    TreeBuilder::new(structure, registry, data, config, sink)
        .reusing(previous)
        .build()
}
