//! The recompute pipeline.
//!
//! [`FormEngine::run`] is a pure function of the layout, the data source bundle
//! and the previous [`Snapshot`]. It holds no state between calls; callers
//! serialize runs and discard stale ones.

use crate::assembler::{assemble, Structure};
use crate::config::EngineConfig;
use crate::definition::ComponentRegistry;
use crate::diagnostics::{DiagnosticsSink, LogSink};
use crate::error::EngineError;
use crate::expr::CustomFunctionRegistry;
use crate::layout::LayoutStore;
use crate::node::{build_tree, Node, NodePath, NodeTree};
use crate::resolver::{ResolveInputs, ResolvedItem, ResolvedStore, Resolver};
use crate::sources::DataSourceBundle;
use crate::validation::{
    BackendIssue, BackendValidations, ComponentProducer, ExpressionProducer, ExpressionValidationConfig,
    NodeValidations, SchemaProducer, ValidationAggregator, ValidationContext, ValidationMap, ValidationRecord,
};
use crate::visibility::VisibilityTree;
use std::sync::Arc;

/// Output of one run. Pass it back as `previous` to keep unchanged parts
/// reference-stable and to carry backend issues and visibility forward.
#[derive(Debug, Clone)]
pub struct Snapshot {
    structure: Arc<Structure>,
    tree: Arc<NodeTree>,
    sources: Arc<DataSourceBundle>,
    resolved: ResolvedStore,
    validations: ValidationMap,
    backend: BackendValidations,
    visibility: VisibilityTree,
}

impl Snapshot {
    pub fn structure(&self) -> &Arc<Structure> {
        &self.structure
    }

    pub fn tree(&self) -> &Arc<NodeTree> {
        &self.tree
    }

    pub fn sources(&self) -> &Arc<DataSourceBundle> {
        &self.sources
    }

    pub fn resolved(&self) -> &ResolvedStore {
        &self.resolved
    }

    pub fn validations(&self) -> &ValidationMap {
        &self.validations
    }

    pub fn backend(&self) -> &BackendValidations {
        &self.backend
    }

    pub fn visibility(&self) -> &VisibilityTree {
        &self.visibility
    }

    /// For reveal actions between runs.
    pub fn visibility_mut(&mut self) -> &mut VisibilityTree {
        &mut self.visibility
    }

    pub fn node(&self, path: &NodePath) -> Option<&Arc<Node>> {
        self.tree.get(path)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Arc<Node>> {
        self.tree.find_by_id(id)
    }

    pub fn children(&self, path: &NodePath) -> Vec<&Arc<Node>> {
        self.tree.children(path, None)
    }

    pub fn parents(&self, path: &NodePath) -> Vec<&Arc<Node>> {
        self.tree.parents(path)
    }

    pub fn item(&self, path: &NodePath) -> Option<&Arc<ResolvedItem>> {
        self.resolved.get(path)
    }

    pub fn is_hidden(&self, path: &NodePath) -> bool {
        self.resolved.is_hidden(path)
    }

    pub fn is_hidden_by_expression(&self, path: &NodePath) -> bool {
        self.resolved.is_hidden_by_expression(path)
    }

    pub fn render_path(&self, path: &NodePath) -> String {
        self.tree.render_path(path)
    }

    pub fn node_validations(&self, path: &NodePath) -> NodeValidations {
        self.validations.for_node(&self.tree, path)
    }

    /// Records of `path` its visibility mask lets through.
    pub fn visible_validations(&self, path: &NodePath) -> Vec<ValidationRecord> {
        let mask = self.visibility.get(path);
        self.node_validations(path).visible(mask).cloned().collect()
    }
}

pub struct FormEngine {
    config: EngineConfig,
    registry: ComponentRegistry,
    functions: CustomFunctionRegistry,
    expressions: ExpressionProducer,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Default for FormEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl FormEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: ComponentRegistry::standard(),
            functions: CustomFunctionRegistry::new(),
            expressions: ExpressionProducer::default(),
            sink: Arc::new(LogSink),
        }
    }

    pub fn with_registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_functions(mut self, functions: CustomFunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_expression_validations(mut self, config: ExpressionValidationConfig) -> Self {
        self.expressions = ExpressionProducer::new(config);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn run(
        &self,
        layout: &LayoutStore,
        sources: DataSourceBundle,
        previous: Option<&Snapshot>,
    ) -> Result<Snapshot, EngineError> {
        let sink = &*self.sink;

        let structure = match previous {
            Some(previous) if previous.structure.generation == layout.generation() => previous.structure.clone(),
            _ => {
                log::debug!(target: "form_engine::engine", "assembling layout generation {}", layout.generation());
                Arc::new(assemble(layout, &self.registry, sink))
            }
        };

        let tree = build_tree(
            &structure,
            &self.registry,
            &sources.data_model,
            previous.map(|previous| &*previous.tree),
            &self.config,
            sink,
        );
        let tree = match previous {
            Some(previous) if *previous.tree == tree => previous.tree.clone(),
            _ => Arc::new(tree),
        };
        let sources = match previous {
            Some(previous) if *previous.sources == sources => previous.sources.clone(),
            _ => Arc::new(sources),
        };

        let changed_data = previous
            .map(|previous| previous.sources.expression_data().changed_paths(sources.expression_data()))
            .unwrap_or_default();
        let inputs = ResolveInputs {
            previous: previous.map(|previous| &previous.resolved),
            changed_data: &changed_data,
            context_changed: previous.is_some_and(|previous| !previous.sources.context_eq(&sources)),
        };
        let resolved = Resolver {
            tree: &tree,
            sources: &sources,
            functions: &self.functions,
            config: &self.config,
            sink,
        }
        .resolve(inputs)?;

        let mut backend = previous.map(|previous| previous.backend.clone()).unwrap_or_default();
        backend.prune(&tree);

        let mut visibility = previous.map(|previous| previous.visibility.clone()).unwrap_or_default();
        visibility.sync(&tree, &sources, &self.config);

        let mut snapshot = Snapshot {
            structure,
            tree,
            sources,
            resolved,
            validations: ValidationMap::default(),
            backend,
            visibility,
        };
        snapshot.validations = self.validate(&snapshot)?;
        Ok(snapshot)
    }

    /// Replaces the snapshot's backend issues and re-aggregates its validations.
    pub fn ingest_backend(
        &self,
        snapshot: &mut Snapshot,
        issues: impl IntoIterator<Item = BackendIssue>,
    ) -> Result<(), EngineError> {
        snapshot.backend.ingest(&snapshot.tree, issues, &*self.sink);
        snapshot.validations = self.validate(snapshot)?;
        Ok(())
    }

    fn validate(&self, snapshot: &Snapshot) -> Result<ValidationMap, EngineError> {
        let ctx = ValidationContext {
            tree: &snapshot.tree,
            resolved: &snapshot.resolved,
            sources: &snapshot.sources,
            functions: &self.functions,
            sink: &*self.sink,
        };
        let map = ValidationAggregator::new()
            .with(&SchemaProducer)
            .with(&ComponentProducer)
            .with(&self.expressions)
            .with(&snapshot.backend)
            .run(&ctx)?;
        Ok(map)
    }
}
