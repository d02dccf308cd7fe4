//! End to end: one page with a repeating group, rows added and removed between runs.

mod common;

use common::{path, rendered_paths, Harness};
use form_engine::validation::BackendIssue;
use form_engine::{RowUuid, ValidationMask, ValidationSource};
use form_fixtures::{items_data, repeating_group_pages};
use serde_json::json;
use std::sync::Arc;

fn backend_issue(field: &str, key: &str) -> BackendIssue {
    serde_json::from_value(json!({ "field": field, "key": key })).unwrap()
}

#[test]
fn builds_paths_for_every_row() {
    let harness = Harness::new(repeating_group_pages());
    let snapshot = harness.run(items_data(2), None);

    let page = snapshot.structure().page("P1").unwrap();
    let claimed: Vec<&str> = page.claims_of("group").iter().map(|claim| &*claim.child).collect();
    assert_eq!(claimed, ["a", "b"]);
    let top_level: Vec<&str> = page.top_level.iter().map(|id| &**id).collect();
    assert_eq!(top_level, ["group", "c"]);

    assert_eq!(
        rendered_paths(&snapshot),
        [
            "P1/group",
            "P1/group/row0/a",
            "P1/group/row0/b",
            "P1/group/row1/a",
            "P1/group/row1/b",
            "P1/c",
        ]
    );

    let a1 = snapshot.node(&path(&snapshot, "P1/group/row1/a")).unwrap().clone();
    assert_eq!(a1.id, "a-1");
    assert_eq!(&*a1.base_id, "a");
    assert_eq!(a1.descriptor.binding("simpleBinding"), Some("items[1].a"));
    assert_eq!(a1.row.as_ref().map(|row| row.uuid.clone()), Some(RowUuid::new("row-1")));
    assert_eq!(snapshot.find_by_id("a-1").map(|node| node.path.clone()), Some(a1.path.clone()));

    let parents: Vec<String> = snapshot
        .parents(&a1.path)
        .iter()
        .map(|node| node.id.clone())
        .collect();
    assert_eq!(parents, ["group"]);
    assert!(harness.sink.entries().is_empty());
}

#[test]
fn required_fields_report_per_row() {
    let harness = Harness::new(repeating_group_pages());
    let snapshot = harness.run(items_data(2), None);

    for row in ["row0", "row1"] {
        let b = path(&snapshot, &format!("P1/group/{row}/b"));
        let records = snapshot.node_validations(&b).records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.key, "form_filler.error_required");
        assert_eq!(records[0].message.params, ["b.title"]);
        assert_eq!(records[0].category, ValidationMask::REQUIRED);
    }
    assert_eq!(snapshot.validations().field("items[0].b").len(), 1);
    assert!(snapshot.node_validations(&path(&snapshot, "P1/group/row0/a")).is_empty());
}

#[test]
fn appending_a_row_reuses_existing_nodes() {
    let harness = Harness::new(repeating_group_pages());
    let first = harness.run(items_data(2), None);
    let second = harness.run(items_data(3), Some(&first));

    assert!(Arc::ptr_eq(first.structure(), second.structure()));
    for rendered in ["P1/group/row0/a", "P1/group/row1/b", "P1/c"] {
        let path = path(&first, rendered);
        assert!(Arc::ptr_eq(first.node(&path).unwrap(), second.node(&path).unwrap()), "{rendered}");
        assert!(Arc::ptr_eq(first.item(&path).unwrap(), second.item(&path).unwrap()), "{rendered}");
    }
    assert_eq!(rendered_paths(&second).len(), 8);
    assert_eq!(path(&second, "P1/group/row2/a").row_uuid(), Some(&RowUuid::new("row-2")));
}

#[test]
fn unchanged_inputs_give_the_same_snapshot() {
    let harness = Harness::new(repeating_group_pages());
    let first = harness.run(items_data(2), None);
    let second = harness.run(items_data(2), Some(&first));

    assert!(Arc::ptr_eq(first.tree(), second.tree()));
    assert!(Arc::ptr_eq(first.sources(), second.sources()));
    assert_eq!(first.resolved(), second.resolved());
    assert_eq!(first.validations(), second.validations());
}

#[test]
fn removing_a_row_reindexes_and_keeps_its_validations() {
    let harness = Harness::new(repeating_group_pages());
    let mut first = harness.run(items_data(2), None);
    harness
        .engine
        .ingest_backend(
            &mut first,
            [
                backend_issue("items[0].a", "backend.first"),
                backend_issue("items[1].a", "backend.second"),
            ],
        )
        .unwrap();
    let second_row = path(&first, "P1/group/row1/a");
    first.visibility_mut().reveal_node(&second_row, ValidationMask::BACKEND);
    assert_eq!(first.visible_validations(&second_row).len(), 1);

    let mut data = items_data(2);
    data["items"].as_array_mut().unwrap().remove(0);
    let second = harness.run(data, Some(&first));

    assert_eq!(
        rendered_paths(&second),
        ["P1/group", "P1/group/row0/a", "P1/group/row0/b", "P1/c"]
    );
    let survivor = path(&second, "P1/group/row0/a");
    assert_eq!(survivor, second_row);
    assert_eq!(second.node(&survivor).unwrap().id, "a-0");
    assert_eq!(
        second.node(&survivor).unwrap().descriptor.binding("simpleBinding"),
        Some("items[0].a")
    );

    let records = second.node_validations(&survivor).records;
    assert_eq!(common::message_keys(&records), ["backend.second"]);
    assert_eq!(records[0].source, ValidationSource::Backend);
    assert_eq!(records[0].field(), Some("items[0].a"));

    assert_eq!(second.visibility().get(&survivor), ValidationMask::BACKEND);
    assert_eq!(second.visible_validations(&survivor).len(), 1);
    assert!(!second.visibility().contains(&first.tree().nodes().nth(1).unwrap().path));
}

#[test]
fn reveal_page_shows_required_errors() {
    let harness = Harness::new(repeating_group_pages());
    let mut snapshot = harness.run(items_data(1), None);
    let b = path(&snapshot, "P1/group/row0/b");
    assert!(snapshot.visible_validations(&b).is_empty());

    assert!(snapshot.visibility_mut().reveal_page("P1", ValidationMask::ALL));
    assert_eq!(
        common::message_keys(&snapshot.visible_validations(&b)),
        ["form_filler.error_required"]
    );
}
