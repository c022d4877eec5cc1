#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::json;

// Compiling and evaluating arbitrary queries must never panic.
fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else { return };
    let Ok(filter) = kvdocs::query::parse_filter_json(s) else { return };
    let docs = [
        json!({"a": 1, "b": 2, "name": "x"}),
        json!({"a": 10, "b": -5.5, "name": "y", "nested": {"z": [3, {"w": null}]}}),
        json!({"active": true, "tags": ["p", "q"]}),
    ];
    for d in docs {
        if let serde_json::Value::Object(d) = d {
            let _ = kvdocs::query::eval_filter(&d, &filter);
        }
    }
});
