#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::json;

// Updates may be rejected, but applying them must never panic or touch the input.
fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else { return };
    let Ok(update) = kvdocs::query::parse_update_json(s) else { return };
    let serde_json::Value::Object(doc) =
        json!({"n": 1, "xs": [1, 2, 3], "o": {"p": {"q": "r"}}, "s": "t"})
    else {
        return;
    };
    let before = doc.clone();
    let _ = kvdocs::query::apply_update(&doc, &update);
    assert_eq!(doc, before);
});
