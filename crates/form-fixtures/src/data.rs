//! Data models matching the pages in [`layouts`](crate::layouts).

use serde_json::{json, Value};

/// `items` with `len` rows carrying stable ids `row-0`, `row-1`, ...
pub fn items_data(len: usize) -> Value {
    let items: Vec<Value> = (0..len)
        .map(|index| {
            json!({
                "altinnRowId": format!("row-{index}"),
                "a": format!("value {index}"),
                "b": Value::Null
            })
        })
        .collect();
    json!({ "items": items, "name": "Kari" })
}

/// Three outer rows with two inner rows each.
pub fn nested_data() -> Value {
    let outer: Vec<Value> = (0..3)
        .map(|i| {
            json!({
                "altinnRowId": format!("A{i}"),
                "B": [
                    { "altinnRowId": format!("A{i}B0"), "value": format!("{i}.0") },
                    { "altinnRowId": format!("A{i}B1"), "value": format!("{i}.1") }
                ]
            })
        })
        .collect();
    json!({ "A": outer })
}

pub fn conditional_data(name: &str) -> Value {
    json!({
        "name": name,
        "secret": "007",
        "people": [
            { "altinnRowId": "p0", "name": "Ola", "skip": false },
            { "altinnRowId": "p1", "name": Value::Null, "skip": true }
        ]
    })
}

pub fn cyclic_data() -> Value {
    json!({ "x": "set", "y": "set" })
}

pub fn survey_data() -> Value {
    json!({
        "questions": [
            { "altinnRowId": "q0", "answer": "1" },
            { "altinnRowId": "q1", "answer": Value::Null }
        ]
    })
}
