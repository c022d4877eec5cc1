//! Developer trace lines (`dev6!`) with a per-thread capture sink.
//!
//! Collection operations emit one JSON bench line each. Tests enable the
//! sink on their own thread and assert on what was captured, which avoids
//! racing on the global logger.

use serde_json::Value;
use std::cell::RefCell;

thread_local! {
    static SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables the current thread's sink when dropped.
#[must_use = "the sink is disabled as soon as the guard is dropped"]
pub struct SinkGuard;

impl Drop for SinkGuard {
    fn drop(&mut self) {
        SINK.with(|s| *s.borrow_mut() = None);
    }
}

pub fn enable_thread_sink() -> SinkGuard {
    SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    SinkGuard
}

pub fn write_str(msg: &str) {
    SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Take every captured line, leaving the sink enabled and empty.
pub fn drain() -> Vec<String> {
    SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

#[must_use]
pub fn snapshot() -> Vec<String> {
    SINK.with(|s| s.borrow().clone().unwrap_or_default())
}

/// Captured bench lines for `op`, parsed. Lines that are not JSON are skipped.
#[must_use]
pub fn bench_lines(op: &str) -> Vec<Value> {
    snapshot()
        .iter()
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter(|v| v.get("bench").is_some() && v.get("op").and_then(Value::as_str) == Some(op))
        .collect()
}

/// Emit a developer trace line: captured by the thread sink if enabled and
/// logged at TRACE on the `kvdocs::dev6` target.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __line = format!($($arg)*);
        $crate::utils::devlog::write_str(&__line);
        log::trace!(target: $crate::utils::logger::DEV6_TARGET, "{}", __line);
    }};
}
