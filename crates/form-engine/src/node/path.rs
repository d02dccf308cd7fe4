use crate::rows::RowUuid;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// One step below a page: a component base id, or the row of the repeating
/// container named by the previous step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeSegment {
    Component(Arc<str>),
    Row(RowUuid),
}

/// Address of a node: page key, then component base ids with a row uuid after
/// each repeating container.
///
/// Nodes, validations and visibility entries are all keyed by this value.
/// Row segments hold uuids, so a path survives its row being re-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    page: Arc<str>,
    segments: SmallVec<[NodeSegment; 4]>,
}

impl NodePath {
    pub fn page(page: impl Into<Arc<str>>) -> Self {
        Self {
            page: page.into(),
            segments: SmallVec::new(),
        }
    }

    pub fn child(&self, base_id: impl Into<Arc<str>>) -> Self {
        let mut path = self.clone();
        path.segments.push(NodeSegment::Component(base_id.into()));
        path
    }

    pub fn row(&self, uuid: RowUuid) -> Self {
        let mut path = self.clone();
        path.segments.push(NodeSegment::Row(uuid));
        path
    }

    pub fn page_name(&self) -> &str {
        &self.page
    }

    pub fn page_key(&self) -> &Arc<str> {
        &self.page
    }

    pub fn segments(&self) -> &[NodeSegment] {
        &self.segments
    }

    /// True for the page itself.
    pub fn is_page(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn base_id(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|segment| match segment {
            NodeSegment::Component(id) => Some(&**id),
            NodeSegment::Row(_) => None,
        })
    }

    /// The innermost row this path lies in.
    pub fn row_uuid(&self) -> Option<&RowUuid> {
        self.segments.iter().rev().find_map(|segment| match segment {
            NodeSegment::Row(uuid) => Some(uuid),
            NodeSegment::Component(_) => None,
        })
    }

    pub fn row_uuids(&self) -> impl Iterator<Item = &RowUuid> {
        self.segments.iter().filter_map(|segment| match segment {
            NodeSegment::Row(uuid) => Some(uuid),
            NodeSegment::Component(_) => None,
        })
    }

    /// Path of the enclosing node, or `None` for top-level nodes and the page.
    pub fn parent(&self) -> Option<Self> {
        let mut parent = self.clone();
        parent.segments.pop()?;
        if matches!(parent.segments.last(), Some(NodeSegment::Row(_))) {
            parent.segments.pop();
        }
        (!parent.segments.is_empty()).then_some(parent)
    }

    /// Path without its last segment, which may end in a row.
    pub fn truncated(&self) -> Option<Self> {
        let mut truncated = self.clone();
        truncated.segments.pop()?;
        Some(truncated)
    }

    /// Strict prefix check.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.page == other.page
            && self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    pub fn depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, NodeSegment::Component(_)))
            .count()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.page)?;
        for segment in &self.segments {
            match segment {
                NodeSegment::Component(id) => write!(f, "/{id}")?,
                NodeSegment::Row(uuid) => write!(f, "/{{{uuid}}}")?,
            }
        }
        Ok(())
    }
}
