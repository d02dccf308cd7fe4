//! Structural assembly: resolves child claims into a per-page forest.
//!
//! Containers are visited in page order and claim their children in declaration
//! order; the first claimant of an id wins. Anything left unclaimed is a
//! top-level child of its page. Rejected claims are reported and dropped, so the
//! child falls back to the top level.

use crate::definition::{ClaimStyle, ComponentRegistry};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::layout::{ComponentDescriptor, LayoutStore, PageDescriptor};
use crate::rows::split_multi_page_child;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Claim {
    pub parent: Arc<str>,
    pub child: Arc<str>,
    pub style: ClaimStyle,
    /// Sub-page of a multi-page repeating group.
    pub multi_page_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("'{parent}' claims '{child}', which does not exist")]
    UnknownChild { page: String, parent: String, child: String },
    #[error("'{parent}' claims '{child}', which is on page '{other_page}'")]
    CrossPage {
        page: String,
        parent: String,
        child: String,
        other_page: String,
    },
    #[error("'{parent}' claims '{child}', already claimed by '{owner}'")]
    AlreadyClaimed {
        page: String,
        parent: String,
        child: String,
        owner: String,
    },
    #[error("'{parent}' claims itself")]
    SelfReference { page: String, parent: String },
    #[error("'{parent}' claims '{child}', which would form a cycle")]
    Cycle { page: String, parent: String, child: String },
    #[error("'{parent}' cannot hold '{child}' of type {child_type}")]
    IncompatibleChild {
        page: String,
        parent: String,
        child: String,
        child_type: String,
    },
    #[error("duplicate component id '{id}'; keeping the first")]
    DuplicateId { page: String, id: String },
}

impl ClaimError {
    pub fn page(&self) -> &str {
        match self {
            ClaimError::UnknownChild { page, .. }
            | ClaimError::CrossPage { page, .. }
            | ClaimError::AlreadyClaimed { page, .. }
            | ClaimError::SelfReference { page, .. }
            | ClaimError::Cycle { page, .. }
            | ClaimError::IncompatibleChild { page, .. }
            | ClaimError::DuplicateId { page, .. } => page,
        }
    }

    fn component(&self) -> &str {
        match self {
            ClaimError::UnknownChild { parent, .. }
            | ClaimError::CrossPage { parent, .. }
            | ClaimError::AlreadyClaimed { parent, .. }
            | ClaimError::SelfReference { parent, .. }
            | ClaimError::Cycle { parent, .. }
            | ClaimError::IncompatibleChild { parent, .. } => parent,
            ClaimError::DuplicateId { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageStructure {
    pub name: Arc<str>,
    /// First occurrence of every id, plus generated children.
    pub components: IndexMap<Arc<str>, Arc<ComponentDescriptor>>,
    /// Accepted claims grouped by parent, in claim order.
    pub children: IndexMap<Arc<str>, Vec<Claim>>,
    pub top_level: Vec<Arc<str>>,
    pub hidden: Option<Value>,
    owners: IndexMap<Arc<str>, Arc<str>>,
}

impl PageStructure {
    pub fn component(&self, id: &str) -> Option<&Arc<ComponentDescriptor>> {
        self.components.get(id)
    }

    pub fn claims_of(&self, parent: &str) -> &[Claim] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.children.values().flatten()
    }

    pub fn owner_of(&self, child: &str) -> Option<&Arc<str>> {
        self.owners.get(child)
    }

    fn would_cycle(&self, parent: &str, child: &str) -> bool {
        let mut current = parent;
        while let Some(owner) = self.owners.get(current) {
            if &**owner == child {
                return true;
            }
            current = &**owner;
        }
        false
    }
}

/// Claims for one layout generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub generation: u64,
    pub pages: IndexMap<Arc<str>, PageStructure>,
    pub errors: Vec<ClaimError>,
}

impl Structure {
    pub fn page(&self, name: &str) -> Option<&PageStructure> {
        self.pages.get(name)
    }
}

/// Ids a container asks for, with the sub-page index of multi-page children.
fn requested_children(descriptor: &ComponentDescriptor, style: ClaimStyle) -> Vec<(String, Option<usize>)> {
    let strings = |value: Option<&Value>| -> Vec<String> {
        value
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
            .unwrap_or_default()
    };
    let listed = || descriptor.children.iter().flatten().cloned();
    match style {
        ClaimStyle::None | ClaimStyle::Generated => Vec::new(),
        ClaimStyle::Children => listed().map(|id| (id, None)).collect(),
        ClaimStyle::MultiPageChildren => {
            let multi_page = descriptor.property("edit.multiPage") == Some(&Value::Bool(true));
            listed()
                .map(|reference| match split_multi_page_child(&reference) {
                    (Some(page), id) if multi_page => (id.to_owned(), Some(page)),
                    _ => (reference, None),
                })
                .collect()
        }
        ClaimStyle::GridCells => descriptor
            .property("rows")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|row| row.get("cells").and_then(Value::as_array))
            .flatten()
            .filter_map(|cell| cell.get("component").and_then(Value::as_str))
            .map(|id| (id.to_owned(), None))
            .collect(),
        ClaimStyle::Tabs => descriptor
            .property("tabs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .flat_map(|tab| strings(tab.get("children")))
            .map(|id| (id, None))
            .collect(),
    }
}

/// The `LikertItem` a Likert repeats per question.
fn generated_child(parent: &ComponentDescriptor) -> ComponentDescriptor {
    let mut item = ComponentDescriptor::new(format!("{}-item", parent.id), "LikertItem");
    if let Some(answer) = parent.binding("answer") {
        item = item.with_binding("simpleBinding", answer);
    }
    for key in ["optionsId", "options", "required", "readOnly", "showValidations"] {
        if let Some(value) = parent.properties.get(key) {
            item = item.with_property(key, value.clone());
        }
    }
    item
}

struct PageAssembler<'a> {
    layout: &'a LayoutStore,
    registry: &'a ComponentRegistry,
    structure: PageStructure,
    errors: Vec<ClaimError>,
}

impl PageAssembler<'_> {
    fn page(&self) -> String {
        self.structure.name.to_string()
    }

    fn claim(&mut self, parent: &ComponentDescriptor, child: &str, style: ClaimStyle, multi_page_index: Option<usize>) {
        let page = self.page();
        let parent_id = parent.id.as_str();
        let error = if child == parent_id {
            Some(ClaimError::SelfReference {
                page,
                parent: parent_id.to_owned(),
            })
        } else if let Some(descriptor) = self.structure.components.get(child) {
            let parent_definition = self.registry.resolve(&parent.component_type);
            let child_definition = self.registry.resolve(&descriptor.component_type);
            match self.structure.owners.get(child) {
                Some(owner) if &**owner == parent_id => return,
                Some(owner) => Some(ClaimError::AlreadyClaimed {
                    page,
                    parent: parent_id.to_owned(),
                    child: child.to_owned(),
                    owner: owner.to_string(),
                }),
                None if self.structure.would_cycle(parent_id, child) => Some(ClaimError::Cycle {
                    page,
                    parent: parent_id.to_owned(),
                    child: child.to_owned(),
                }),
                None if !parent_definition.accepts_child(child_definition) => Some(ClaimError::IncompatibleChild {
                    page,
                    parent: parent_id.to_owned(),
                    child: child.to_owned(),
                    child_type: descriptor.component_type.clone(),
                }),
                None => None,
            }
        } else {
            match self.layout.page_of(child) {
                Some(other) if &**other != page => Some(ClaimError::CrossPage {
                    page,
                    parent: parent_id.to_owned(),
                    child: child.to_owned(),
                    other_page: other.to_string(),
                }),
                _ => Some(ClaimError::UnknownChild {
                    page,
                    parent: parent_id.to_owned(),
                    child: child.to_owned(),
                }),
            }
        };

        if let Some(error) = error {
            self.errors.push(error);
            return;
        }
        let parent: Arc<str> = parent_id.into();
        let child: Arc<str> = child.into();
        self.structure.owners.insert(child.clone(), parent.clone());
        self.structure.children.entry(parent.clone()).or_default().push(Claim {
            parent,
            child,
            style,
            multi_page_index,
        });
    }
}

fn assemble_page(
    layout: &LayoutStore,
    registry: &ComponentRegistry,
    page: &PageDescriptor,
    sink: &dyn DiagnosticsSink,
) -> (PageStructure, Vec<ClaimError>) {
    let mut assembler = PageAssembler {
        layout,
        registry,
        structure: PageStructure {
            name: page.name.clone(),
            components: IndexMap::with_capacity(page.components.len()),
            children: IndexMap::new(),
            top_level: Vec::new(),
            hidden: page.hidden.clone(),
            owners: IndexMap::new(),
        },
        errors: Vec::new(),
    };

    for component in &page.components {
        if assembler.structure.components.contains_key(component.id.as_str()) {
            assembler.errors.push(ClaimError::DuplicateId {
                page: page.name.to_string(),
                id: component.id.clone(),
            });
            continue;
        }
        if registry.lookup(&component.component_type).is_none() {
            sink.report(
                Diagnostic::new(
                    DiagnosticKind::UnknownComponent,
                    format!("unknown component type '{}'", component.component_type),
                )
                .on_page(&*page.name)
                .on_component(&component.id),
            );
        }
        assembler
            .structure
            .components
            .insert(component.id.as_str().into(), component.clone());
    }

    let containers: Vec<Arc<ComponentDescriptor>> = assembler.structure.components.values().cloned().collect();
    for parent in containers {
        let style = registry.resolve(&parent.component_type).claim_style;
        if style == ClaimStyle::Generated {
            let item = generated_child(&parent);
            let id = item.id.clone();
            if assembler.structure.components.contains_key(id.as_str()) {
                assembler.errors.push(ClaimError::DuplicateId {
                    page: page.name.to_string(),
                    id,
                });
                continue;
            }
            assembler.structure.components.insert(id.as_str().into(), Arc::new(item));
            assembler.claim(&parent, &id, style, None);
            continue;
        }
        for (child, multi_page_index) in requested_children(&parent, style) {
            assembler.claim(&parent, &child, style, multi_page_index);
        }
    }

    let PageAssembler {
        mut structure, errors, ..
    } = assembler;
    structure.top_level = structure
        .components
        .keys()
        .filter(|&id| !structure.owners.contains_key(id))
        .cloned()
        .collect();
    (structure, errors)
}

/// Resolves every page's claims. Never fails; rejected claims end up in
/// [`Structure::errors`] and in `sink`.
pub fn assemble(layout: &LayoutStore, registry: &ComponentRegistry, sink: &dyn DiagnosticsSink) -> Structure {
    let mut structure = Structure {
        generation: layout.generation(),
        pages: IndexMap::new(),
        errors: Vec::new(),
    };
    for page in layout.pages() {
        let (assembled, errors) = assemble_page(layout, registry, page, sink);
        for error in &errors {
            sink.report(
                Diagnostic::new(DiagnosticKind::Claim, error.to_string())
                    .on_page(error.page())
                    .on_component(error.component()),
            );
        }
        log::debug!(
            target: "form_engine::assembler",
            "page '{}': {} claims, {} top-level",
            page.name,
            assembled.claims().count(),
            assembled.top_level.len()
        );
        structure.errors.extend(errors);
        structure.pages.insert(page.name.clone(), assembled);
    }
    structure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NullSink};
    use serde_json::json;

    fn layout(pages: &[(&str, Value)]) -> LayoutStore {
        LayoutStore::from_json(1, pages.iter().map(|(name, value)| (*name, value))).unwrap()
    }

    fn ids(list: &[Arc<str>]) -> Vec<&str> {
        list.iter().map(|id| &**id).collect()
    }

    #[test]
    fn claims_nest_and_the_rest_is_top_level() {
        let layout = layout(&[(
            "P1",
            json!([
                { "id": "group", "type": "Group", "children": ["a", "b"] },
                { "id": "a", "type": "Input" },
                { "id": "b", "type": "Input" },
                { "id": "c", "type": "Paragraph" }
            ]),
        )]);
        let structure = assemble(&layout, &ComponentRegistry::standard(), &NullSink);
        let page = structure.page("P1").unwrap();
        assert_eq!(ids(&page.top_level), ["group", "c"]);
        let children: Vec<&str> = page.claims_of("group").iter().map(|claim| &*claim.child).collect();
        assert_eq!(children, ["a", "b"]);
        assert!(structure.errors.is_empty());
    }

    #[test]
    fn rejected_claims_are_reported_and_dropped() {
        let layout = layout(&[
            (
                "P1",
                json!([
                    { "id": "first", "type": "Group", "children": ["a", "ghost", "far", "first"] },
                    { "id": "second", "type": "Group", "children": ["a"] },
                    { "id": "buttons", "type": "ButtonGroup", "children": ["b", "send"] },
                    { "id": "a", "type": "Input" },
                    { "id": "b", "type": "Input" },
                    { "id": "send", "type": "Button" },
                    { "id": "a", "type": "Paragraph" }
                ]),
            ),
            ("P2", json!([{ "id": "far", "type": "Input" }])),
        ]);
        let sink = CollectingSink::new();
        let structure = assemble(&layout, &ComponentRegistry::standard(), &sink);
        let page = structure.page("P1").unwrap();

        assert!(matches!(structure.errors[0], ClaimError::DuplicateId { ref id, .. } if id == "a"));
        assert!(structure.errors.iter().any(|e| matches!(e, ClaimError::UnknownChild { child, .. } if child == "ghost")));
        assert!(structure.errors.iter().any(|e| matches!(e, ClaimError::CrossPage { other_page, .. } if other_page == "P2")));
        assert!(structure.errors.iter().any(|e| matches!(e, ClaimError::SelfReference { .. })));
        assert!(structure.errors.iter().any(|e| matches!(e, ClaimError::AlreadyClaimed { owner, .. } if owner == "first")));
        assert!(structure.errors.iter().any(|e| matches!(e, ClaimError::IncompatibleChild { child, .. } if child == "b")));
        assert_eq!(page.owner_of("a").map(|owner| &**owner), Some("first"));
        assert_eq!(page.owner_of("send").map(|owner| &**owner), Some("buttons"));
        assert_eq!(ids(&page.top_level), ["first", "second", "buttons", "b"]);
        assert_eq!(page.component("a").unwrap().component_type, "Input");
        assert_eq!(sink.of_kind(DiagnosticKind::Claim).len(), structure.errors.len());
    }

    #[test]
    fn cycles_are_rejected() {
        let layout = layout(&[(
            "P1",
            json!([
                { "id": "x", "type": "Group", "children": ["y"] },
                { "id": "y", "type": "Group", "children": ["x"] }
            ]),
        )]);
        let structure = assemble(&layout, &ComponentRegistry::standard(), &NullSink);
        assert!(matches!(structure.errors[..], [ClaimError::Cycle { .. }]));
        assert_eq!(ids(&structure.page("P1").unwrap().top_level), ["x"]);
    }

    #[test]
    fn special_claim_styles() {
        let layout = layout(&[(
            "P1",
            json!([
                { "id": "rg", "type": "RepeatingGroup", "children": ["0:a", "1:b"],
                  "edit": { "multiPage": true }, "dataModelBindings": { "group": "items" } },
                { "id": "grid", "type": "Grid", "rows": [{ "cells": [{ "text": "x" }, { "component": "c" }] }] },
                { "id": "tabs", "type": "Tabs", "tabs": [{ "id": "t1", "children": ["d"] }] },
                { "id": "likert", "type": "Likert", "optionsId": "scale",
                  "dataModelBindings": { "questions": "q", "answer": "q.answer" } },
                { "id": "a", "type": "Input" },
                { "id": "b", "type": "Input" },
                { "id": "c", "type": "Input" },
                { "id": "d", "type": "Input" }
            ]),
        )]);
        let structure = assemble(&layout, &ComponentRegistry::standard(), &NullSink);
        let page = structure.page("P1").unwrap();
        assert!(structure.errors.is_empty());
        let multi: Vec<Option<usize>> = page.claims_of("rg").iter().map(|claim| claim.multi_page_index).collect();
        assert_eq!(multi, [Some(0), Some(1)]);
        assert_eq!(page.owner_of("c").map(|owner| &**owner), Some("grid"));
        assert_eq!(page.owner_of("d").map(|owner| &**owner), Some("tabs"));
        let item = page.component("likert-item").unwrap();
        assert_eq!(item.component_type, "LikertItem");
        assert_eq!(item.binding("simpleBinding"), Some("q.answer"));
        assert_eq!(item.properties["optionsId"], json!("scale"));
        assert_eq!(ids(&page.top_level), ["rg", "grid", "tabs", "likert"]);
    }

    #[test]
    fn unknown_types_are_childless() {
        let layout = layout(&[(
            "P1",
            json!([
                { "id": "odd", "type": "Sparkles", "children": ["a"] },
                { "id": "a", "type": "Input" }
            ]),
        )]);
        let sink = CollectingSink::new();
        let structure = assemble(&layout, &ComponentRegistry::standard(), &sink);
        assert_eq!(ids(&structure.page("P1").unwrap().top_level), ["odd", "a"]);
        assert_eq!(sink.of_kind(DiagnosticKind::UnknownComponent).len(), 1);
    }
}
