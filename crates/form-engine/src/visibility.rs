//! Which validation categories each node currently shows.
//!
//! The tree mirrors [`NodePath`] segment by segment, so an entry is found from a
//! node's own path. Entries appear when their node first exists, change only
//! through the `reveal_*` / [`set`](VisibilityTree::set) calls and disappear
//! with their node, attachment entries included. Lookups of paths without an
//! entry return an empty mask.

use crate::config::EngineConfig;
use crate::definition::Capabilities;
use crate::node::{NodePath, NodeSegment, NodeTree};
use crate::sources::DataSourceBundle;
use crate::validation::ValidationMask;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibilityNode {
    pub mask: ValidationMask,
    pub children: IndexMap<NodeSegment, VisibilityNode>,
    /// Keyed by attachment id.
    pub attachments: IndexMap<String, ValidationMask>,
}

impl VisibilityNode {
    fn reveal_all(&mut self, mask: ValidationMask) {
        self.mask |= mask;
        for attachment in self.attachments.values_mut() {
            *attachment |= mask;
        }
        for child in self.children.values_mut() {
            child.reveal_all(mask);
        }
    }

    fn count(&self) -> usize {
        1 + self.children.values().map(VisibilityNode::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibilityTree {
    pages: IndexMap<Arc<str>, VisibilityNode>,
}

impl VisibilityTree {
    fn node(&self, path: &NodePath) -> Option<&VisibilityNode> {
        path.segments()
            .iter()
            .try_fold(self.pages.get(path.page_name())?, |node, segment| node.children.get(segment))
    }

    fn node_mut(&mut self, path: &NodePath) -> Option<&mut VisibilityNode> {
        path.segments()
            .iter()
            .try_fold(self.pages.get_mut(path.page_name())?, |node, segment| node.children.get_mut(segment))
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.node(path).is_some()
    }

    /// Number of entries, page roots included.
    pub fn len(&self) -> usize {
        self.pages.values().map(VisibilityNode::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, path: &NodePath) -> ValidationMask {
        self.node(path).map_or(ValidationMask::empty(), |node| node.mask)
    }

    pub fn get_attachment(&self, path: &NodePath, attachment: &str) -> ValidationMask {
        self.node(path)
            .and_then(|node| node.attachments.get(attachment))
            .copied()
            .unwrap_or_default()
    }

    /// Creates the entry for `path` with `initial` unless it exists. Missing
    /// intermediate entries are created empty.
    pub fn ensure(&mut self, path: &NodePath, initial: ValidationMask) -> &mut VisibilityNode {
        let mut node = self.pages.entry(path.page_key().clone()).or_default();
        let Some((last, parents)) = path.segments().split_last() else {
            return node;
        };
        for segment in parents {
            node = node.children.entry(segment.clone()).or_default();
        }
        node.children.entry(last.clone()).or_insert_with(|| VisibilityNode {
            mask: initial,
            ..VisibilityNode::default()
        })
    }

    /// Replaces the mask of an existing entry.
    pub fn set(&mut self, path: &NodePath, mask: ValidationMask) -> bool {
        match self.node_mut(path) {
            Some(node) => {
                node.mask = mask;
                true
            }
            None => false,
        }
    }

    /// Adds `mask` to one node, e.g. a field losing focus.
    pub fn reveal_node(&mut self, path: &NodePath, mask: ValidationMask) -> bool {
        match self.node_mut(path) {
            Some(node) => {
                node.mask |= mask;
                true
            }
            None => false,
        }
    }

    /// Adds `mask` to a node, its descendants and their attachments.
    pub fn reveal_subtree(&mut self, path: &NodePath, mask: ValidationMask) -> bool {
        match self.node_mut(path) {
            Some(node) => {
                node.reveal_all(mask);
                true
            }
            None => false,
        }
    }

    /// Adds `mask` to every node of a page, e.g. on page submit.
    pub fn reveal_page(&mut self, page: &str, mask: ValidationMask) -> bool {
        self.reveal_subtree(&NodePath::page(page), mask)
    }

    pub fn reveal_attachment(&mut self, path: &NodePath, attachment: &str, mask: ValidationMask) -> bool {
        match self
            .node_mut(path)
            .and_then(|node| node.attachments.get_mut(attachment))
        {
            Some(current) => {
                *current |= mask;
                true
            }
            None => false,
        }
    }

    /// Deletes the entry for `path` with everything below it.
    pub fn remove(&mut self, path: &NodePath) -> Option<VisibilityNode> {
        let Some(parent) = path.truncated() else {
            return self.pages.shift_remove(path.page_name());
        };
        let last = path.segments().last()?;
        self.node_mut(&parent)?.children.shift_remove(last)
    }

    /// Brings the tree in line with `tree`: entries of vanished nodes, rows and
    /// attachments are removed, new nodes get their initial mask.
    pub fn sync(&mut self, tree: &NodeTree, sources: &DataSourceBundle, config: &EngineConfig) {
        let stale = self.stale_paths(tree);
        for path in &stale {
            self.remove(path);
        }
        self.pages.retain(|page, _| tree.page(page).is_some());

        let always = config.always_visible_mask();
        for page in tree.pages() {
            self.ensure(&NodePath::page(page.name.clone()), ValidationMask::empty());
        }
        for node in tree.nodes() {
            let initial = always | initial_mask(node.descriptor.properties.get("showValidations"));
            let entry = self.ensure(&node.path, initial);
            if node.definition.capabilities.contains(Capabilities::ATTACHMENTS) {
                let current = sources.attachments_of(&node.path);
                entry
                    .attachments
                    .retain(|id, _| current.iter().any(|attachment| &attachment.id == id));
                for attachment in current {
                    entry.attachments.entry(attachment.id.clone()).or_insert(initial);
                }
            }
        }
        if !stale.is_empty() {
            log::debug!(target: "form_engine::visibility", "pruned {} stale visibility entries", stale.len());
        }
    }

    /// Top-most entries whose node, or whose row, no longer exists.
    fn stale_paths(&self, tree: &NodeTree) -> Vec<NodePath> {
        fn walk(node: &VisibilityNode, path: NodePath, tree: &NodeTree, stale: &mut Vec<NodePath>) {
            for (segment, child) in &node.children {
                let child_path = match segment {
                    NodeSegment::Component(id) => path.child(id.clone()),
                    NodeSegment::Row(uuid) => path.row(uuid.clone()),
                };
                let exists = match segment {
                    NodeSegment::Component(_) => tree.contains(&child_path),
                    NodeSegment::Row(uuid) => tree.row_index(&path, uuid).is_some(),
                };
                if exists {
                    walk(child, child_path, tree, stale);
                } else {
                    stale.push(child_path);
                }
            }
        }
        let mut stale = Vec::new();
        for (page, node) in &self.pages {
            walk(node, NodePath::page(page.clone()), tree, &mut stale);
        }
        stale
    }
}

fn initial_mask(show_validations: Option<&Value>) -> ValidationMask {
    show_validations
        .and_then(Value::as_array)
        .map(|names| ValidationMask::from_categories(names.iter().filter_map(Value::as_str)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::RowUuid;

    fn leaf(uuid: &str) -> NodePath {
        NodePath::page("P1").child("group").row(RowUuid::new(uuid)).child("a")
    }

    #[test]
    fn missing_paths_read_as_empty() {
        let tree = VisibilityTree::default();
        assert_eq!(tree.get(&leaf("x")), ValidationMask::empty());
        assert_eq!(tree.get_attachment(&leaf("x"), "file"), ValidationMask::empty());
    }

    #[test]
    fn ensure_keeps_existing_mask() {
        let mut tree = VisibilityTree::default();
        tree.ensure(&leaf("x"), ValidationMask::REQUIRED);
        assert!(tree.reveal_node(&leaf("x"), ValidationMask::SCHEMA));
        tree.ensure(&leaf("x"), ValidationMask::REQUIRED);
        assert_eq!(tree.get(&leaf("x")), ValidationMask::REQUIRED | ValidationMask::SCHEMA);
    }

    #[test]
    fn reveal_subtree_and_remove_cascade() {
        let mut tree = VisibilityTree::default();
        let group = NodePath::page("P1").child("group");
        tree.ensure(&group, ValidationMask::empty());
        tree.ensure(&leaf("x"), ValidationMask::empty())
            .attachments
            .insert("file".into(), ValidationMask::empty());
        tree.ensure(&leaf("y"), ValidationMask::empty());

        assert!(tree.reveal_page("P1", ValidationMask::ALL));
        assert_eq!(tree.get(&leaf("y")), ValidationMask::ALL);
        assert_eq!(tree.get_attachment(&leaf("x"), "file"), ValidationMask::ALL);

        tree.remove(&group.row(RowUuid::new("x")));
        assert!(!tree.contains(&leaf("x")));
        assert_eq!(tree.get_attachment(&leaf("x"), "file"), ValidationMask::empty());
        assert!(tree.contains(&leaf("y")));
        assert!(!tree.reveal_node(&leaf("x"), ValidationMask::ALL));
    }

    #[test]
    fn show_validations_categories() {
        let names = serde_json::json!(["Required", "Schema"]);
        assert_eq!(initial_mask(Some(&names)), ValidationMask::REQUIRED | ValidationMask::SCHEMA);
        assert_eq!(initial_mask(None), ValidationMask::empty());
    }
}
