//! Canned layouts, data models and validation configs shared by the engine's
//! scenario tests and the CLI demo. Everything is plain JSON so this crate does
//! not depend on the engine.

pub mod data;
pub mod layouts;

pub use data::*;
pub use layouts::*;

/// Named pages in declaration order.
pub type Pages = Vec<(&'static str, serde_json::Value)>;
