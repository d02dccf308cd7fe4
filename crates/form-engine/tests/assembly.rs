//! Claims, their conflicts and the resulting page partition.

mod common;

use form_engine::assembler::{assemble, ClaimError};
use form_engine::definition::ComponentRegistry;
use form_engine::diagnostics::NullSink;
use form_engine::{CollectingSink, DiagnosticKind};
use form_fixtures::{conflicting_claims_pages, nested_group_pages, repeating_group_pages, survey_pages};
use std::collections::HashSet;

#[test]
fn assembling_twice_gives_identical_claims_and_errors() {
    let layout = common::layout(1, &conflicting_claims_pages());
    let registry = ComponentRegistry::standard();
    let first = assemble(&layout, &registry, &NullSink);
    let second = assemble(&layout, &registry, &NullSink);
    assert_eq!(first, second);
}

#[test]
fn claims_and_top_level_partition_every_page() {
    let registry = ComponentRegistry::standard();
    for pages in [
        conflicting_claims_pages(),
        repeating_group_pages(),
        nested_group_pages(),
        survey_pages(),
    ] {
        let layout = common::layout(1, &pages);
        let structure = assemble(&layout, &registry, &NullSink);
        for page in structure.pages.values() {
            let mut seen = HashSet::new();
            for id in page.claims().map(|claim| &claim.child).chain(&page.top_level) {
                assert!(seen.insert(id.clone()), "'{id}' placed twice on {}", page.name);
            }
            let all: HashSet<_> = page.components.keys().cloned().collect();
            assert_eq!(seen, all, "page {}", page.name);
        }
    }
}

#[test]
fn rejected_claims_are_reported_and_fall_back_to_top_level() {
    let layout = common::layout(1, &conflicting_claims_pages());
    let sink = CollectingSink::new();
    let structure = assemble(&layout, &ComponentRegistry::standard(), &sink);

    let errors: Vec<String> = structure
        .errors
        .iter()
        .map(|error| match error {
            ClaimError::UnknownChild { child, .. } => format!("unknown {child}"),
            ClaimError::CrossPage { child, other_page, .. } => format!("cross {child}@{other_page}"),
            ClaimError::AlreadyClaimed { parent, child, owner, .. } => format!("{parent} lost {child} to {owner}"),
            ClaimError::SelfReference { parent, .. } => format!("self {parent}"),
            ClaimError::IncompatibleChild { parent, child, .. } => format!("{parent} rejects {child}"),
            other => other.to_string(),
        })
        .collect();
    assert_eq!(
        errors,
        [
            "unknown missing",
            "cross elsewhere@second",
            "g2 lost x to g1",
            "self g2",
            "buttons rejects z",
        ]
    );
    assert!(structure.errors.iter().all(|error| error.page() == "first"));

    let first = structure.page("first").unwrap();
    assert_eq!(first.owner_of("x").map(|owner| &**owner), Some("g1"));
    assert_eq!(first.owner_of("y").map(|owner| &**owner), Some("g2"));
    let top_level: Vec<&str> = first.top_level.iter().map(|id| &**id).collect();
    assert_eq!(top_level, ["g1", "g2", "buttons", "z", "odd"]);

    assert_eq!(sink.of_kind(DiagnosticKind::Claim).len(), 5);
    let unknown = sink.of_kind(DiagnosticKind::UnknownComponent);
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].component.as_deref(), Some("odd"));
}

#[test]
fn unknown_types_render_as_childless_nodes() {
    let harness = common::Harness::new(conflicting_claims_pages());
    let snapshot = harness.run(serde_json::json!({}), None);
    let odd = snapshot.find_by_id("odd").unwrap();
    assert_eq!(odd.definition.type_name, "Unknown");
    assert!(snapshot.children(&odd.path).is_empty());
    let g1 = snapshot.find_by_id("g1").unwrap();
    let children: Vec<&str> = snapshot.children(&g1.path).iter().map(|node| node.id.as_str()).collect();
    assert_eq!(children, ["x"]);
}

#[test]
fn likert_generates_one_item_per_question() {
    let harness = common::Harness::new(survey_pages());
    let snapshot = harness.run(form_fixtures::survey_data(), None);
    assert_eq!(
        common::rendered_paths(&snapshot),
        [
            "survey/likert",
            "survey/likert/row0/likert-item",
            "survey/likert/row1/likert-item",
            "survey/upload",
        ]
    );
    let item = snapshot.find_by_id("likert-item-1").unwrap();
    assert_eq!(item.descriptor.binding("simpleBinding"), Some("questions[1].answer"));
}
