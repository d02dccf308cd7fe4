//! The materialized node tree and its path addressing.

mod builder;
mod path;
mod tree;

pub use builder::{build_tree, TreeBuilder};
pub use path::{NodePath, NodeSegment};
pub use tree::{Node, NodeChildren, NodeTree, PageNodes, RowChildren};
