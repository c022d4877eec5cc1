//! Dotted-path access into nested documents.
//!
//! `get` returns `None` as soon as an intermediate segment is missing or is
//! not a container. `set` creates missing intermediate levels as empty
//! objects. `delete` is a no-op when any intermediate segment is missing.
//! Both mutators leave the document untouched when an intermediate segment
//! holds a scalar, since there is nothing to descend into.
//!
//! A segment that parses as an index addresses an array element.

use crate::types::Document;
use serde_json::{Map, Value};

fn child<'a>(cur: &'a Value, seg: &str) -> Option<&'a Value> {
    match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(cur: &'a mut Value, seg: &str) -> Option<&'a mut Value> {
    match cur {
        Value::Object(map) => map.get_mut(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

/// Resolve `path` in `doc`.
#[must_use]
pub fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segs = path.split('.');
    let first = segs.next()?;
    let mut cur = doc.get(first)?;
    for seg in segs {
        cur = child(cur, seg)?;
    }
    Some(cur)
}

/// Set `path` in `doc` to `value`, creating intermediate objects as needed.
pub fn set(doc: &mut Document, path: &str, value: Value) {
    let segs: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segs.split_last() else {
        return;
    };
    let Some((head, rest)) = parents.split_first() else {
        doc.insert((*last).to_string(), value);
        return;
    };
    let mut cur = doc
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    for seg in rest {
        cur = match cur {
            Value::Object(map) => {
                map.entry((*seg).to_string()).or_insert_with(|| Value::Object(Map::new()))
            }
            Value::Array(items) => match seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(v) => v,
                None => return,
            },
            _ => return,
        };
    }
    match cur {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
        }
        Value::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = value;
            }
        }
        _ => {}
    }
}

/// Remove `path` from `doc`. Returns the removed value, if there was one.
pub fn delete(doc: &mut Document, path: &str) -> Option<Value> {
    let segs: Vec<&str> = path.split('.').collect();
    let (last, parents) = segs.split_last()?;
    let Some((head, rest)) = parents.split_first() else {
        return doc.shift_remove(*last);
    };
    let mut cur = doc.get_mut(*head)?;
    for seg in rest {
        cur = child_mut(cur, seg)?;
    }
    match cur {
        Value::Object(map) => map.shift_remove(*last),
        Value::Array(items) => {
            let i = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
            Some(items.remove(i))
        }
        _ => None,
    }
}

/// Mutable access to the value at `path`, without creating anything.
pub(crate) fn get_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let mut segs = path.split('.');
    let first = segs.next()?;
    let mut cur = doc.get_mut(first)?;
    for seg in segs {
        cur = child_mut(cur, seg)?;
    }
    Some(cur)
}
