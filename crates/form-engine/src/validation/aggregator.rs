use super::producers::ValidationProducer;
use super::{ValidationError, ValidationMap, ValidationRecord, ValidationTarget};
use crate::diagnostics::DiagnosticsSink;
use crate::expr::CustomFunctionRegistry;
use crate::node::{Node, NodeTree};
use crate::resolver::ResolvedStore;
use crate::sources::DataSourceBundle;

/// Everything a producer may read. Producers run after resolution and see the
/// final hidden state.
pub struct ValidationContext<'a> {
    pub tree: &'a NodeTree,
    pub resolved: &'a ResolvedStore,
    pub sources: &'a DataSourceBundle,
    pub functions: &'a CustomFunctionRegistry,
    pub sink: &'a dyn DiagnosticsSink,
}

#[derive(Default)]
pub struct ValidationAggregator<'p> {
    producers: Vec<&'p dyn ValidationProducer>,
}

impl<'p> ValidationAggregator<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, producer: &'p dyn ValidationProducer) -> Self {
        self.producers.push(producer);
        self
    }

    /// Concatenates producer output, then drops what no visible node shows and
    /// what a component filter rejects.
    pub fn run(&self, ctx: &ValidationContext<'_>) -> Result<ValidationMap, ValidationError> {
        let mut records = Vec::new();
        for producer in &self.producers {
            producer.produce(ctx, &mut records)?;
        }
        let produced = records.len();
        let mut map = ValidationMap::default();
        for record in records {
            if Self::keep(ctx, &record) {
                map.insert(record);
            }
        }
        log::debug!(target: "form_engine::validation", "kept {} of {produced} validation record(s)", map.len());
        Ok(map)
    }

    fn passes_filter(node: &Node, record: &ValidationRecord) -> bool {
        node.definition
            .filter
            .is_none_or(|filter| filter(record, &node.descriptor))
    }

    fn keep(ctx: &ValidationContext<'_>, record: &ValidationRecord) -> bool {
        match &record.target {
            ValidationTarget::Component { node } => ctx
                .tree
                .get(node)
                .is_some_and(|node| !ctx.resolved.is_hidden_by_expression(&node.path) && Self::passes_filter(node, record)),
            ValidationTarget::Field { field, binding_key } => {
                let bound: Vec<&Node> = ctx
                    .tree
                    .nodes_for_field(field)
                    .iter()
                    .filter(|(_, key)| binding_key.as_ref().is_none_or(|wanted| wanted == key))
                    .filter_map(|(path, _)| ctx.tree.get(path).map(|node| &**node))
                    .collect();
                if bound.is_empty() {
                    return true;
                }
                let visible: Vec<&Node> = bound
                    .into_iter()
                    .filter(|node| !ctx.resolved.is_hidden_by_expression(&node.path))
                    .collect();
                !visible.is_empty() && visible.iter().all(|node| Self::passes_filter(node, record))
            }
        }
    }
}
