//! Producers, merging, filtering and hidden-node suppression.

mod common;

use common::{bundle, message_keys, path, Harness};
use form_engine::validation::{BackendIssue, ExpressionValidationConfig, SchemaIssue, ValidationError};
use form_engine::sources::Attachment;
use form_engine::{
    DataModel, DiagnosticKind, EngineError, FormEngine, RowUuid, Severity, ValidationMask, ValidationSource,
};
use form_fixtures::{
    conditional_data, conditional_pages, items_data, repeating_group_pages, repeating_group_validations,
    survey_data, survey_pages, Pages,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn schema_issues(issues: Value) -> Vec<SchemaIssue> {
    serde_json::from_value(issues).unwrap()
}

fn with_expression_validations(harness: Harness, config: Value) -> Harness {
    Harness {
        engine: FormEngine::default()
            .with_sink(harness.sink.clone())
            .with_expression_validations(ExpressionValidationConfig::from_json(config).unwrap()),
        ..harness
    }
}

/// The repeating group page with `minCount` added to the group.
fn min_count_pages(min: u64) -> Pages {
    let mut pages = repeating_group_pages();
    pages[0].1["data"]["layout"][0]["minCount"] = json!(min);
    pages
}

#[test]
fn sources_merge_per_field() {
    let harness = with_expression_validations(Harness::new(repeating_group_pages()), repeating_group_validations());
    let mut data = items_data(1);
    data["items"][0]["a"] = json!("LOUD");
    let mut sources = bundle(data);
    sources.schema_issues = schema_issues(json!([{ "field": "items[0].a", "keyword": "pattern" }]));
    let snapshot = harness.engine.run(&harness.layout, sources, None).unwrap();

    let records = snapshot.validations().field("items[0].a");
    assert_eq!(records.len(), 2);
    let sources: Vec<ValidationSource> = records.iter().map(|record| record.source).collect();
    assert!(sources.contains(&ValidationSource::Schema));
    assert!(sources.contains(&ValidationSource::Expression));

    let expression = records
        .iter()
        .find(|record| record.source == ValidationSource::Expression)
        .unwrap();
    assert_eq!(expression.message.key, "a.shouting");
    assert_eq!(expression.severity, Severity::Warning);
    assert_eq!(expression.category, ValidationMask::EXPRESSION);

    let a = path(&snapshot, "P1/group/row0/a");
    assert_eq!(snapshot.node_validations(&a).records.len(), 2);
}

#[test]
fn repeating_group_filter_drops_only_the_duplicate_count() {
    let issues = json!([
        { "field": "items", "keyword": "minItems", "params": ["2"] },
        { "field": "items", "keyword": "uniqueItems" },
        { "field": "items", "keyword": "minItems", "message": "app.items.too_few" }
    ]);

    let plain = Harness::new(repeating_group_pages());
    let mut sources = bundle(items_data(1));
    sources.schema_issues = schema_issues(issues.clone());
    let snapshot = plain.engine.run(&plain.layout, sources, None).unwrap();
    assert_eq!(
        message_keys(snapshot.validations().field("items")),
        ["validation_errors.minItems", "validation_errors.uniqueItems", "app.items.too_few"]
    );

    let limited = Harness::new(min_count_pages(2));
    let mut sources = bundle(items_data(1));
    sources.schema_issues = schema_issues(issues);
    let snapshot = limited.engine.run(&limited.layout, sources, None).unwrap();
    let records = snapshot.validations().field("items");
    let kept: Vec<(ValidationSource, &str)> = records
        .iter()
        .map(|record| (record.source, record.message.key.as_str()))
        .collect();
    assert_eq!(
        kept,
        [
            (ValidationSource::Schema, "validation_errors.uniqueItems"),
            (ValidationSource::Component, "validation_errors.minItems"),
        ]
    );
    assert_eq!(records[1].message.params, ["2"]);
}

#[test]
fn hidden_nodes_are_not_validated() {
    let harness = Harness::new(conditional_pages());
    let mut sources = bundle(conditional_data("Kari"));
    sources.schema_issues = schema_issues(json!([
        { "field": "secret", "keyword": "pattern" },
        { "field": "nowhere.bound", "keyword": "required" }
    ]));
    let snapshot = harness.engine.run(&harness.layout, sources, None).unwrap();

    let required: Vec<&str> = snapshot
        .validations()
        .records()
        .filter(|record| record.category == ValidationMask::REQUIRED)
        .filter_map(|record| record.field())
        .collect();
    // `secret` and the second person are hidden; `note` is on a visible page.
    assert_eq!(required, ["note"]);
    assert!(snapshot.validations().field("secret").is_empty());
    assert_eq!(snapshot.validations().field("nowhere.bound").len(), 1);
}

#[test]
fn attachment_limits_and_initial_visibility() {
    let harness = Harness::new(survey_pages());
    let snapshot = harness.run(survey_data(), None);
    let upload = path(&snapshot, "survey/upload");
    assert_eq!(
        message_keys(snapshot.validations().component(&upload)),
        ["form_filler.file_uploader_validation_error_file_number_min"]
    );
    // `showValidations: ["Component"]` makes it visible right away.
    assert_eq!(snapshot.visibility().get(&upload), ValidationMask::COMPONENT);
    assert_eq!(snapshot.visible_validations(&upload).len(), 1);

    let mut sources = bundle(survey_data());
    sources.set_attachments(
        "upload",
        Vec::new(),
        serde_json::from_value(json!([{ "id": "f1" }, { "id": "f2" }, { "id": "f3" }])).unwrap(),
    );
    let snapshot = harness.engine.run(&harness.layout, sources, Some(&snapshot)).unwrap();
    assert_eq!(
        message_keys(snapshot.validations().component(&upload)),
        ["form_filler.file_uploader_validation_error_file_number_max"]
    );
    assert_eq!(snapshot.visibility().get_attachment(&upload, "f2"), ValidationMask::COMPONENT);
}

/// `docs` repeats over `items`, one upload per row allowing a single file.
fn per_row_upload_pages() -> Pages {
    vec![(
        "uploads",
        json!({ "data": { "layout": [
            {
                "id": "docs",
                "type": "RepeatingGroup",
                "children": ["upload"],
                "dataModelBindings": { "group": "items" }
            },
            {
                "id": "upload",
                "type": "FileUpload",
                "maxNumberOfAttachments": 1,
                "showValidations": ["Component"]
            }
        ] } }),
    )]
}

#[test]
fn row_attachments_survive_removing_an_earlier_row() {
    let harness = Harness::new(per_row_upload_pages());
    let files = |ids: &[&str]| -> Vec<Attachment> {
        ids.iter()
            .map(|id| serde_json::from_value(json!({ "id": id })).unwrap())
            .collect()
    };
    let mut sources = bundle(items_data(2));
    sources.set_attachments("upload", vec![RowUuid::new("row-0")], files(&["f1"]));
    sources.set_attachments("upload", vec![RowUuid::new("row-1")], files(&["f2", "f3"]));
    let mut first = harness.engine.run(&harness.layout, sources.clone(), None).unwrap();

    let dropped = path(&first, "uploads/docs/row0/upload");
    let kept = path(&first, "uploads/docs/row1/upload");
    assert!(first.validations().component(&dropped).is_empty());
    assert_eq!(
        message_keys(first.validations().component(&kept)),
        ["form_filler.file_uploader_validation_error_file_number_max"]
    );
    first.visibility_mut().reveal_subtree(&kept, ValidationMask::SCHEMA);

    // The bundle still lists the removed row's files; they must not move over.
    let mut data = items_data(2);
    data["items"].as_array_mut().unwrap().remove(0);
    sources.data_model = DataModel::new(data);
    let second = harness.engine.run(&harness.layout, sources, Some(&first)).unwrap();

    assert_eq!(second.render_path(&kept), "uploads/docs/row0/upload");
    assert_eq!(second.node(&kept).unwrap().id, "upload-0");
    assert_eq!(
        message_keys(second.validations().component(&kept)),
        ["form_filler.file_uploader_validation_error_file_number_max"]
    );
    let both = ValidationMask::COMPONENT | ValidationMask::SCHEMA;
    assert_eq!(second.visibility().get_attachment(&kept, "f2"), both);
    assert_eq!(second.visibility().get_attachment(&kept, "f3"), both);
    assert_eq!(second.visibility().get_attachment(&kept, "f1"), ValidationMask::empty());
    assert!(!second.visibility().contains(&dropped));
}

#[test]
fn broken_conditions_fail_the_run() {
    let harness = with_expression_validations(
        Harness::new(repeating_group_pages()),
        json!({ "validations": { "name": [{ "condition": ["nope"], "message": "x" }] } }),
    );
    let result = harness.engine.run(&harness.layout, bundle(items_data(0)), None);
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::Condition { ref field, .. })) if field == "name"
    ));

    let harness = with_expression_validations(
        Harness::new(repeating_group_pages()),
        json!({ "validations": { "name": ["undefined"] } }),
    );
    let result = harness.engine.run(&harness.layout, bundle(items_data(0)), None);
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::UnknownDefinition { .. }))
    ));
}

#[test]
fn backend_issues_by_component_and_source() {
    let harness = Harness::new(repeating_group_pages());
    let mut snapshot = harness.run(items_data(1), None);
    let issues: Vec<BackendIssue> = serde_json::from_value(json!([
        { "component": "group", "key": "backend.group", "source": "Custom" },
        { "field": "name", "key": "backend.name", "severity": "info" },
        { "field": "not.bound", "key": "backend.loose" },
        { "component": "ghost", "key": "backend.ghost" }
    ]))
    .unwrap();
    harness.engine.ingest_backend(&mut snapshot, issues).unwrap();

    let group = path(&snapshot, "P1/group");
    let records = snapshot.validations().component(&group);
    assert_eq!(message_keys(records), ["backend.group"]);
    assert_eq!(records[0].category, ValidationMask::CUSTOM_BACKEND);

    let name = snapshot.validations().field("name");
    assert_eq!(name[0].category, ValidationMask::BACKEND);
    assert_eq!(name[0].severity, Severity::Info);
    assert_eq!(message_keys(snapshot.validations().field("not.bound")), ["backend.loose"]);

    let ghost = harness.sink.of_kind(DiagnosticKind::Validation);
    assert_eq!(ghost.len(), 1);
    assert_eq!(ghost[0].component.as_deref(), Some("ghost"));
    assert_eq!(snapshot.backend().len(), 3);

    // Re-running keeps ingested issues.
    let again = harness.run(items_data(1), Some(&snapshot));
    assert_eq!(message_keys(again.validations().component(&group)), ["backend.group"]);
    assert!(Arc::ptr_eq(snapshot.tree(), again.tree()));
}
