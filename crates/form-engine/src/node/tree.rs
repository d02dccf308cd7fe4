use super::path::{NodePath, NodeSegment};
use crate::data::DataPath;
use crate::definition::ComponentDefinition;
use crate::layout::ComponentDescriptor;
use crate::rows::{Row, RowUuid};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Direct children of a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeChildren {
    #[default]
    None,
    Static(Vec<NodePath>),
    /// One child list per row of a repeating container.
    Rows(Vec<RowChildren>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowChildren {
    pub row: Arc<Row>,
    /// Data path of the row, e.g. `items[1]`.
    pub path: DataPath,
    pub children: Vec<NodePath>,
}

/// A materialized component instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub path: NodePath,
    /// Rendered id, `a-0` inside row 0. Display only.
    pub id: String,
    pub base_id: Arc<str>,
    /// Per-row copy of the authored descriptor.
    pub descriptor: Arc<ComponentDescriptor>,
    pub definition: Arc<ComponentDefinition>,
    /// Back-reference for traversal.
    pub parent: Option<NodePath>,
    pub children: NodeChildren,
    /// Innermost enclosing row.
    pub row: Option<Arc<Row>>,
    /// Data path of the innermost enclosing row.
    pub row_context: Option<DataPath>,
    pub multi_page_index: Option<usize>,
}

impl Node {
    pub fn page(&self) -> &str {
        self.path.page_name()
    }

    pub fn component_type(&self) -> &str {
        &self.descriptor.component_type
    }

    /// Every child path, across rows.
    pub fn child_paths(&self) -> impl Iterator<Item = &NodePath> {
        let (flat, rows): (&[NodePath], &[RowChildren]) = match &self.children {
            NodeChildren::None => (&[], &[]),
            NodeChildren::Static(children) => (children.as_slice(), &[]),
            NodeChildren::Rows(rows) => (&[], rows.as_slice()),
        };
        flat.iter().chain(rows.iter().flat_map(|row| row.children.iter()))
    }

    pub fn rows(&self) -> &[RowChildren] {
        match &self.children {
            NodeChildren::Rows(rows) => rows,
            _ => &[],
        }
    }

    /// Concrete data paths of every binding, keyed by binding name.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, DataPath)> {
        self.descriptor
            .data_model_bindings
            .iter()
            .filter_map(|(key, path)| Some((key.as_str(), DataPath::parse(path).ok()?)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageNodes {
    pub name: Arc<str>,
    pub top_level: Vec<NodePath>,
    pub hidden: Option<Value>,
}

/// Every node of every page, addressable by [`NodePath`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeTree {
    pub(crate) generation: u64,
    pub(crate) nodes: IndexMap<NodePath, Arc<Node>>,
    pub(crate) pages: IndexMap<Arc<str>, PageNodes>,
    /// Rendered id to path.
    pub(crate) by_id: IndexMap<String, NodePath>,
    pub(crate) by_base_id: IndexMap<Arc<str>, Vec<NodePath>>,
    /// Concrete binding path to the nodes bound to it.
    pub(crate) by_field: IndexMap<String, Vec<(NodePath, String)>>,
}

impl NodeTree {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    pub fn pages(&self) -> impl Iterator<Item = &PageNodes> {
        self.pages.values()
    }

    pub fn page(&self, name: &str) -> Option<&PageNodes> {
        self.pages.get(name)
    }

    pub fn get(&self, path: &NodePath) -> Option<&Arc<Node>> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.nodes.contains_key(path)
    }

    /// Exact lookup by rendered id (`a-1`) or, for nodes outside rows, base id.
    pub fn find_by_id(&self, id: &str) -> Option<&Arc<Node>> {
        self.by_id.get(id).and_then(|path| self.nodes.get(path))
    }

    pub fn find_by_base_id(&self, base_id: &str) -> impl Iterator<Item = &Arc<Node>> {
        self.by_base_id
            .get(base_id)
            .into_iter()
            .flatten()
            .filter_map(|path| self.nodes.get(path))
    }

    /// Resolves a component reference the way expressions do: the instance of base
    /// id `id` sharing the most enclosing rows with `from`, else an exact rendered id.
    pub fn find_nearest(&self, id: &str, from: Option<&NodePath>) -> Option<&Arc<Node>> {
        let mut best: Option<(&Arc<Node>, usize)> = None;
        for node in self.find_by_base_id(id) {
            let shared = from.map_or(0, |from| {
                node.path
                    .row_uuids()
                    .zip(from.row_uuids())
                    .take_while(|(a, b)| a == b)
                    .count()
            });
            let same_page = from.is_none_or(|from| from.page_name() == node.page());
            let score = shared * 2 + usize::from(same_page);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((node, score));
            }
        }
        best.map(|(node, _)| node).or_else(|| self.find_by_id(id))
    }

    /// Direct children, optionally restricted to one row of a repeating container.
    pub fn children(&self, path: &NodePath, row: Option<&RowUuid>) -> Vec<&Arc<Node>> {
        let Some(node) = self.nodes.get(path) else {
            return Vec::new();
        };
        let paths: Vec<&NodePath> = match (row, &node.children) {
            (Some(uuid), NodeChildren::Rows(rows)) => rows
                .iter()
                .filter(|row| &row.row.uuid == uuid)
                .flat_map(|row| row.children.iter())
                .collect(),
            (Some(_), _) => Vec::new(),
            (None, _) => node.child_paths().collect(),
        };
        paths.into_iter().filter_map(|path| self.nodes.get(path)).collect()
    }

    /// Ancestors from the top-level node down to the direct parent.
    pub fn parents(&self, path: &NodePath) -> Vec<&Arc<Node>> {
        let mut parents = Vec::new();
        let mut current = self.nodes.get(path).and_then(|node| node.parent.as_ref());
        while let Some(parent) = current.and_then(|path| self.nodes.get(path)) {
            parents.push(parent);
            current = parent.parent.as_ref();
        }
        parents.reverse();
        parents
    }

    /// Current index of a row of `container`.
    pub fn row_index(&self, container: &NodePath, uuid: &RowUuid) -> Option<usize> {
        self.nodes
            .get(container)?
            .rows()
            .iter()
            .find(|row| &row.row.uuid == uuid)
            .map(|row| row.row.index)
    }

    /// Renders a path with row indices instead of uuids: `P1/group/row0/a`.
    pub fn render_path(&self, path: &NodePath) -> String {
        let mut rendered = path.page_name().to_owned();
        let mut container = NodePath::page(path.page_key().clone());
        for segment in path.segments() {
            match segment {
                NodeSegment::Component(id) => {
                    rendered.push('/');
                    rendered.push_str(id);
                    container = container.child(id.clone());
                }
                NodeSegment::Row(uuid) => {
                    match self.row_index(&container, uuid) {
                        Some(index) => rendered.push_str(&format!("/row{index}")),
                        None => rendered.push_str(&format!("/row?{uuid}")),
                    }
                    container = container.row(uuid.clone());
                }
            }
        }
        rendered
    }

    /// Nodes bound to a concrete data path, with the binding key used.
    pub fn nodes_for_field(&self, field: &str) -> &[(NodePath, String)] {
        self.by_field.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Paths present in `self` but not in `newer`.
    pub fn removed_in(&self, newer: &NodeTree) -> Vec<NodePath> {
        self.nodes
            .keys()
            .filter(|path| !newer.contains(path))
            .cloned()
            .collect()
    }
}
