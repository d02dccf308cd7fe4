//! Shared setup for the scenario tests.

#![allow(dead_code)]

use form_engine::{
    CollectingSink, DataModel, DataSourceBundle, EngineConfig, FormEngine, LayoutStore, NodePath, Snapshot,
};
use form_fixtures::Pages;
use serde_json::Value;
use std::sync::Arc;

pub struct Harness {
    pub engine: FormEngine,
    pub sink: Arc<CollectingSink>,
    pub layout: LayoutStore,
}

impl Harness {
    pub fn new(pages: Pages) -> Self {
        Self::with_config(pages, EngineConfig::default())
    }

    pub fn with_config(pages: Pages, config: EngineConfig) -> Self {
        let sink = Arc::new(CollectingSink::new());
        let engine = FormEngine::new(config).with_sink(sink.clone());
        Self {
            engine,
            sink,
            layout: layout(1, &pages),
        }
    }

    pub fn run(&self, data: Value, previous: Option<&Snapshot>) -> Snapshot {
        self.engine
            .run(&self.layout, bundle(data), previous)
            .expect("pipeline run failed")
    }
}

pub fn layout(generation: u64, pages: &Pages) -> LayoutStore {
    LayoutStore::from_json(generation, pages.iter().map(|(name, value)| (*name, value))).expect("fixture layout")
}

pub fn bundle(data: Value) -> DataSourceBundle {
    DataSourceBundle::new(DataModel::new(data))
}

/// Every node path, rendered with row indices, in tree order.
pub fn rendered_paths(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .tree()
        .nodes()
        .map(|node| snapshot.render_path(&node.path))
        .collect()
}

/// The node path that renders as `rendered`, e.g. `P1/group/row1/a`.
pub fn path(snapshot: &Snapshot, rendered: &str) -> NodePath {
    snapshot
        .tree()
        .nodes()
        .map(|node| &node.path)
        .find(|path| snapshot.render_path(path) == rendered)
        .cloned()
        .unwrap_or_else(|| panic!("no node renders as {rendered}; have {:?}", rendered_paths(snapshot)))
}

pub fn message_keys<'a>(records: impl IntoIterator<Item = &'a form_engine::ValidationRecord>) -> Vec<String> {
    records.into_iter().map(|record| record.message.key.clone()).collect()
}
