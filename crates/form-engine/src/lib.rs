//! Dynamic layout hierarchy engine for data-bound forms.
//!
//! The pipeline turns flat, page-scoped component descriptors into a tree of
//! addressable nodes, multiplies repeating subtrees per data-model array element,
//! evaluates expression-valued properties and aggregates validations behind a
//! per-node visibility mask:
//!
//! ```text
//! LayoutStore → assembler → rows → NodeTree → resolver → validation → visibility
//! ```
//!
//! [`FormEngine::run`] executes one pass and returns a [`Snapshot`]; feeding the
//! previous snapshot back in keeps row identities, nodes and resolved items
//! reference-stable where their inputs did not change.

pub mod assembler;
pub mod config;
pub mod data;
pub mod definition;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod expr;
pub mod layout;
pub mod node;
pub mod resolver;
pub mod rows;
pub mod sources;
pub mod validation;
pub mod visibility;

pub use config::EngineConfig;
pub use data::{DataModel, DataPath};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticsSink, LogSink};
pub use engine::{FormEngine, Snapshot};
pub use error::EngineError;
pub use layout::{ComponentDescriptor, LayoutStore};
pub use node::{Node, NodePath, NodeTree};
pub use resolver::{ResolvedItem, ResolvedStore};
pub use rows::{Row, RowUuid};
pub use sources::DataSourceBundle;
pub use validation::{Severity, ValidationMask, ValidationRecord, ValidationSource};
pub use visibility::VisibilityTree;
