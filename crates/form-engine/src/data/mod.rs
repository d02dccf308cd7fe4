//! Data model access: paths, lookups, rows and diffs.

mod model;
mod path;

pub use model::{DataModel, DataModelError, RowsLookup};
pub use path::{DataPath, DataPathError, PathIndex, PathSegment};
