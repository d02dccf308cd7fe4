//! The layout store: flat, per-page component descriptor lists.

mod descriptor;
mod store;

pub use descriptor::ComponentDescriptor;
pub use store::{LayoutError, LayoutStore, PageDescriptor};
