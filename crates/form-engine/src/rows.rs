//! Row expansion for repeating containers.
//!
//! A row is identified by a uuid read from its array element (or generated for
//! elements that carry none). Its index is positional and recomputed on every
//! expansion. Rows whose uuid and index are unchanged are reused as the same
//! `Arc`, which keeps everything derived from them reference-stable.

use crate::data::{DataModel, DataPath, RowsLookup};
use crate::layout::ComponentDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowUuid(Arc<str>);

impl RowUuid {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Ulid::new().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub uuid: RowUuid,
    pub index: usize,
    /// The uuid was generated because the element carries no row id.
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowWarning {
    #[error("binding '{binding}' does not resolve to an array (found {found}); treating as zero rows")]
    NotArray { binding: String, found: String },
    #[error("duplicate row id '{id}' at '{binding}[{index}]'")]
    DuplicateId {
        binding: String,
        index: usize,
        id: String,
    },
}

/// Result of one expansion: the rows plus anything worth reporting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expansion {
    pub rows: Vec<Arc<Row>>,
    pub warnings: Vec<RowWarning>,
}

/// Computes the rows of a repeating container bound to `binding`.
///
/// `previous` is the row set from the last expansion of the same container.
pub fn expand(
    binding: &DataPath,
    data: &DataModel,
    previous: &[Arc<Row>],
    row_id_field: &str,
) -> Expansion {
    let mut expansion = Expansion::default();
    let elements = match data.rows(binding) {
        RowsLookup::Rows(elements) => elements,
        RowsLookup::Missing => return expansion,
        RowsLookup::NotArray(found) => {
            expansion.warnings.push(RowWarning::NotArray {
                binding: binding.to_string(),
                found: found.to_string(),
            });
            return expansion;
        }
    };

    let mut seen = HashSet::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        let from_data = element
            .get(row_id_field)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());

        let (uuid, generated) = match from_data {
            Some(id) if !seen.contains(id) => (RowUuid::new(id), false),
            Some(id) => {
                expansion.warnings.push(RowWarning::DuplicateId {
                    binding: binding.to_string(),
                    index,
                    id: id.to_owned(),
                });
                (RowUuid::generate(), true)
            }
            // Id-less elements keep the generated uuid of the id-less row at the same position.
            None => match previous.get(index) {
                Some(row) if row.generated => (row.uuid.clone(), true),
                _ => (RowUuid::generate(), true),
            },
        };
        seen.insert(uuid.as_str().to_owned());

        let reused = previous
            .iter()
            .find(|row| row.uuid == uuid && row.index == index && row.generated == generated)
            .cloned();
        expansion.rows.push(reused.unwrap_or_else(|| {
            Arc::new(Row {
                uuid,
                index,
                generated,
            })
        }));
    }
    expansion
}

/// One enclosing repeating row, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFrame {
    /// Concrete binding of the repeating container, e.g. `A[2].B`.
    pub group_binding: DataPath,
    pub row: Arc<Row>,
}

impl RowFrame {
    /// Data path of the row itself, e.g. `A[2].B[1]`.
    pub fn row_path(&self) -> DataPath {
        self.group_binding.with_last_index(self.row.index)
    }
}

/// Produces the per-row copy of a claimed child descriptor.
///
/// `frames` lists every enclosing repeating row, outermost first. The copy gets an
/// id suffixed with each row index, bindings indexed at each container prefix, and
/// mapping keys with `{depth}` placeholders replaced by that depth's row index.
pub fn mutate_descriptor(
    descriptor: &ComponentDescriptor,
    frames: &[RowFrame],
    multi_page_index: Option<usize>,
) -> ComponentDescriptor {
    let mut mutated = descriptor.clone();
    if frames.is_empty() {
        return mutated;
    }
    mutated.base_id = Some(descriptor.base_id().to_owned());
    mutated.multi_page_index = multi_page_index.or(descriptor.multi_page_index);

    for (depth, frame) in frames.iter().enumerate() {
        mutated.id = format!("{}-{}", mutated.id, frame.row.index);

        for path in mutated.data_model_bindings.values_mut() {
            let Ok(parsed) = DataPath::parse(path) else {
                continue;
            };
            if let Some(rewritten) = parsed.insert_row_index(&frame.group_binding, frame.row.index) {
                *path = rewritten.to_string();
            }
        }

        if let Some(Value::Object(mapping)) = mutated.properties.get_mut("mapping") {
            let placeholder = format!("{{{depth}}}");
            let index = frame.row.index.to_string();
            let rewritten: Map<String, Value> = std::mem::take(mapping)
                .into_iter()
                .map(|(key, value)| (key.replace(&placeholder, &index), value))
                .collect();
            *mapping = rewritten;
        }
    }
    mutated
}

/// Splits a `"<pageIndex>:<childId>"` reference of a multi-page group.
pub fn split_multi_page_child(reference: &str) -> (Option<usize>, &str) {
    match reference.split_once(':') {
        Some((page, id)) => match page.parse::<usize>() {
            Ok(page) => (Some(page), id),
            Err(_) => (None, reference),
        },
        None => (None, reference),
    }
}
