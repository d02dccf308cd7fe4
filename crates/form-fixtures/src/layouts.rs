//! Layout pages, each built as the page files a form app ships.

use crate::Pages;
use serde_json::{json, Value};

fn page(layout: Value) -> Value {
    json!({ "data": { "layout": layout } })
}

/// `P1`: a repeating `group` over `items` claiming `a` and `b`, plus a
/// standalone `c`.
///
/// ```text
/// P1
/// ├── group (items)
/// │   └── row n: a (items[n].a), b (items[n].b, required)
/// └── c (name)
/// ```
pub fn repeating_group_pages() -> Pages {
    vec![(
        "P1",
        page(json!([
            {
                "id": "group",
                "type": "RepeatingGroup",
                "children": ["a", "b"],
                "dataModelBindings": { "group": "items" },
                "maxCount": 3
            },
            {
                "id": "a",
                "type": "Input",
                "dataModelBindings": { "simpleBinding": "items.a" },
                "textResourceBindings": { "title": "a.title" }
            },
            {
                "id": "b",
                "type": "Input",
                "dataModelBindings": { "simpleBinding": "items.b" },
                "required": true,
                "textResourceBindings": { "title": "b.title" }
            },
            {
                "id": "c",
                "type": "Input",
                "dataModelBindings": { "simpleBinding": "name" },
                "maxLength": 5
            }
        ])),
    )]
}

/// Outer group over `A`, inner group over `A.B`, leaf bound to `A.B.value`.
pub fn nested_group_pages() -> Pages {
    vec![(
        "nested",
        page(json!([
            {
                "id": "outer",
                "type": "RepeatingGroup",
                "children": ["inner"],
                "dataModelBindings": { "group": "A" }
            },
            {
                "id": "inner",
                "type": "RepeatingGroup",
                "children": ["value"],
                "dataModelBindings": { "group": "A.B" }
            },
            {
                "id": "value",
                "type": "Input",
                "dataModelBindings": { "simpleBinding": "A.B.value" }
            }
        ])),
    )]
}

/// Claim conflicts on one page plus a component claimed across pages.
pub fn conflicting_claims_pages() -> Pages {
    vec![
        (
            "first",
            page(json!([
                { "id": "g1", "type": "Group", "children": ["x", "missing", "elsewhere"] },
                { "id": "g2", "type": "Group", "children": ["x", "y", "g2"] },
                { "id": "buttons", "type": "ButtonGroup", "children": ["submit", "z"] },
                { "id": "x", "type": "Input", "dataModelBindings": { "simpleBinding": "x" } },
                { "id": "y", "type": "Input", "dataModelBindings": { "simpleBinding": "y" } },
                { "id": "z", "type": "Input", "dataModelBindings": { "simpleBinding": "z" } },
                { "id": "submit", "type": "Button" },
                { "id": "odd", "type": "Sparkles" }
            ])),
        ),
        (
            "second",
            page(json!([
                { "id": "elsewhere", "type": "Paragraph" }
            ])),
        ),
    ]
}

/// Visibility driven by other components' values, a hidden row expression and
/// a page that hides itself.
pub fn conditional_pages() -> Pages {
    vec![
        (
            "main",
            page(json!([
                {
                    "id": "name",
                    "type": "Input",
                    "dataModelBindings": { "simpleBinding": "name" },
                    "required": true
                },
                {
                    "id": "secret",
                    "type": "Input",
                    "dataModelBindings": { "simpleBinding": "secret" },
                    "hidden": ["notEquals", ["component", "name"], "agent"],
                    "required": true
                },
                {
                    "id": "echo",
                    "type": "Paragraph",
                    "hidden": ["equals", ["component", "secret"], null],
                    "textResourceBindings": { "title": ["concat", "Secret: ", ["component", "secret"]] }
                },
                {
                    "id": "people",
                    "type": "RepeatingGroup",
                    "children": ["person"],
                    "dataModelBindings": { "group": "people" },
                    "hiddenRow": ["equals", ["dataModel", "people.skip"], true]
                },
                {
                    "id": "person",
                    "type": "Input",
                    "dataModelBindings": { "simpleBinding": "people.name" },
                    "required": true
                }
            ])),
        ),
        (
            "extra",
            json!({
                "data": {
                    "hidden": ["equals", ["dataModel", "name"], "agent"],
                    "layout": [
                        { "id": "note", "type": "TextArea", "dataModelBindings": { "simpleBinding": "note" }, "required": true }
                    ]
                }
            }),
        ),
    ]
}

/// Two components hiding each other: `x` hides when `y` reads empty and `y`
/// hides while `x` reads non-empty. Never settles.
pub fn cyclic_pages() -> Pages {
    vec![(
        "cycle",
        page(json!([
            {
                "id": "x",
                "type": "Input",
                "dataModelBindings": { "simpleBinding": "x" },
                "hidden": ["equals", ["component", "y"], null]
            },
            {
                "id": "y",
                "type": "Input",
                "dataModelBindings": { "simpleBinding": "y" },
                "hidden": ["notEquals", ["component", "x"], null]
            }
        ])),
    )]
}

/// A Likert over `questions` and an upload with attachment limits.
pub fn survey_pages() -> Pages {
    vec![(
        "survey",
        page(json!([
            {
                "id": "likert",
                "type": "Likert",
                "dataModelBindings": { "questions": "questions", "answer": "questions.answer" },
                "optionsId": "scale"
            },
            {
                "id": "upload",
                "type": "FileUpload",
                "minNumberOfAttachments": 1,
                "maxNumberOfAttachments": 2,
                "showValidations": ["Component"]
            }
        ])),
    )]
}

/// Expression validations for [`repeating_group_pages`].
pub fn repeating_group_validations() -> Value {
    json!({
        "validations": {
            "items.a": [
                "notShouting",
                { "$ref": "notShouting", "message": "a.too_long", "condition": ["greaterThan", ["stringLength", ["value"]], 10] }
            ]
        },
        "definitions": {
            "notShouting": {
                "condition": ["equals", ["upperCase", ["value"]], ["value"]],
                "message": "a.shouting",
                "severity": "warning"
            }
        }
    })
}
