use crate::types::Document;
use serde_json::Value;
use std::cmp::Ordering;

use super::path;
use super::types::{Condition, FieldOp, Filter, Order, SortSpec, type_tag};

/// Decide whether `doc` satisfies `filter`. Never fails.
#[must_use]
pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Field { path: p, cond } => eval_condition(path::get(doc, p), cond),
        Filter::Never => false,
    }
}

/// Compile `query` and evaluate it against `doc`.
#[must_use]
pub fn matches(doc: &Document, query: &Value) -> bool {
    eval_filter(doc, &super::parse::compile(query))
}

/// Evaluate every operator of `cond` against a resolved field value.
/// `None` means the field is absent.
#[must_use]
pub fn eval_condition(value: Option<&Value>, cond: &Condition) -> bool {
    cond.ops.iter().all(|op| eval_op(value, op))
}

fn eval_op(value: Option<&Value>, op: &FieldOp) -> bool {
    match op {
        FieldOp::Eq(x) => value.is_some_and(|v| values_equal(v, x)),
        FieldOp::Ne(x) => !value.is_some_and(|v| values_equal(v, x)),
        FieldOp::Gt(x) => ordered(value, x, |o| o == Ordering::Greater),
        FieldOp::Gte(x) => ordered(value, x, |o| o != Ordering::Less),
        FieldOp::Lt(x) => ordered(value, x, |o| o == Ordering::Less),
        FieldOp::Lte(x) => ordered(value, x, |o| o != Ordering::Greater),
        FieldOp::In(set) => value.is_some_and(|v| set.iter().any(|x| values_equal(v, x))),
        FieldOp::Nin(set) => !value.is_some_and(|v| set.iter().any(|x| values_equal(v, x))),
        FieldOp::Not(inner) => !eval_condition(value, inner),
        FieldOp::Exists(want) => value.is_some() == *want,
        FieldOp::Type(tag) => value.is_some_and(|v| type_tag(v) == tag),
        #[cfg(feature = "regex")]
        FieldOp::Regex(re) => matches!(value, Some(Value::String(s)) if re.is_match(s)),
        FieldOp::Invalid => false,
    }
}

fn ordered(value: Option<&Value>, operand: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    value.and_then(|v| compare_values(v, operand)).is_some_and(pred)
}

/// Deep equality where numbers compare by value, so `1 == 1.0`.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_numbers(a, b) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering for the range operators: number against number, string against
/// string. Any other pairing is incomparable.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_numbers(a, b),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Total order used for sorting; missing sorts first.
#[must_use]
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (x, y) = match (a, b) {
        (Some(x), Some(y)) => (x, y),
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
    };
    match (x, y) {
        (Value::Bool(p), Value::Bool(q)) => p.cmp(q),
        (Value::Number(_), Value::Number(_)) => compare_numbers(x, y).unwrap_or_else(|| {
            x.as_f64().unwrap_or(f64::NAN).total_cmp(&y.as_f64().unwrap_or(f64::NAN))
        }),
        (Value::String(p), Value::String(q)) => p.cmp(q),
        _ => type_rank(x).cmp(&type_rank(y)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two documents key by key; the first non-equal key decides.
#[must_use]
pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let ord = compare_for_sort(path::get(a, &s.field), path::get(b, &s.field));
        if ord != Ordering::Equal {
            return if matches!(s.order, Order::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn comparison_operators() {
        let d = doc(json!({"n": 10, "s": "m", "nested": {"v": 2.5}}));
        assert!(matches(&d, &json!({"n": {"$gt": 5, "$lte": 10}})));
        assert!(!matches(&d, &json!({"n": {"$gt": 10}})));
        assert!(matches(&d, &json!({"s": {"$lt": "z"}})));
        assert!(matches(&d, &json!({"nested.v": {"$gte": 2.5}})));
        assert!(matches(&d, &json!({"n": 10.0})));
        assert!(!matches(&d, &json!({"n": {"$gt": "5"}})));
        assert!(!matches(&d, &json!({"missing": {"$lt": 100}})));
    }

    #[test]
    fn ne_in_nin_on_missing_fields() {
        let d = doc(json!({"a": 1}));
        assert!(matches(&d, &json!({"b": {"$ne": 1}})));
        assert!(!matches(&d, &json!({"b": {"$in": [1, null]}})));
        assert!(matches(&d, &json!({"b": {"$nin": [1]}})));
        assert!(matches(&d, &json!({"a": {"$in": [3, 1]}})));
        assert!(!matches(&d, &json!({"a": {"$in": 1}})));
        assert!(!matches(&d, &json!({"a": {"$nin": "x"}})));
    }

    #[test]
    fn logical_composition() {
        let d = doc(json!({"a": 1, "b": 2}));
        assert!(matches(&d, &json!({"$and": [{"a": 1}, {"b": 2}]})));
        assert!(!matches(&d, &json!({"$and": [{"a": 1}, {"b": 3}]})));
        assert!(matches(&d, &json!({"$or": [{"a": 9}, {"b": 2}]})));
        assert!(matches(&d, &json!({"$nor": [{"a": 9}, {"b": 9}]})));
        assert!(!matches(&d, &json!({"$nor": [{"a": 1}]})));
        assert!(!matches(&d, &json!({"$and": []})));
        assert!(!matches(&d, &json!({"$or": []})));
        assert!(matches(&d, &json!({"$nor": []})));
        assert!(!matches(&d, &json!({"$nor": 5})));
        assert!(!matches(&d, &json!({"$xor": [{"a": 1}]})));
        assert!(matches(&d, &json!({})));
    }

    #[test]
    fn not_exists_type() {
        let d = doc(json!({"a": 5, "n": null, "tags": ["x"], "s": "str"}));
        assert!(matches(&d, &json!({"a": {"$not": {"$gt": 10}}})));
        assert!(!matches(&d, &json!({"a": {"$not": 5}})));
        assert!(matches(&d, &json!({"zz": {"$not": {"$gt": 1}}})));
        assert!(matches(&d, &json!({"n": {"$exists": true}})));
        assert!(matches(&d, &json!({"zz": {"$exists": false}})));
        assert!(matches(&d, &json!({"zz": {"$exists": 0}})));
        assert!(!matches(&d, &json!({"a": {"$exists": false}})));
        assert!(matches(&d, &json!({"a": {"$type": "number"}})));
        assert!(matches(&d, &json!({"tags": {"$type": "array"}})));
        assert!(matches(&d, &json!({"n": {"$type": "null"}})));
        assert!(!matches(&d, &json!({"zz": {"$type": "null"}})));
    }

    #[test]
    fn type_names_for_every_kind() {
        let d = doc(json!({"s": "x", "b": false, "o": {"k": 1}, "n": 1.5}));
        assert!(matches(&d, &json!({"s": {"$type": "string"}})));
        assert!(matches(&d, &json!({"b": {"$type": "boolean"}})));
        assert!(matches(&d, &json!({"o": {"$type": "object"}})));
        assert!(!matches(&d, &json!({"s": {"$type": "object"}})));
        assert!(!matches(&d, &json!({"o": {"$type": "array"}})));
        assert!(!matches(&d, &json!({"b": {"$type": "number"}})));
        assert!(!matches(&d, &json!({"n": {"$type": "string"}})));
        assert!(!matches(&d, &json!({"s": {"$type": 2}})));
    }

    #[test]
    fn unknown_operator_fails() {
        let d = doc(json!({"a": 5}));
        assert!(!matches(&d, &json!({"a": {"$near": 5}})));
        assert!(!matches(&d, &json!({"a": {"$gt": 1, "$bogus": 1}})));
    }

    #[cfg(feature = "regex")]
    #[test]
    fn regex_matches_strings_only() {
        let d = doc(json!({"name": "Alice", "n": 42}));
        assert!(matches(&d, &json!({"name": {"$regex": "^Al"}})));
        assert!(!matches(&d, &json!({"name": {"$regex": "^al"}})));
        assert!(matches(&d, &json!({"name": {"$regex": "^al", "$options": "i"}})));
        assert!(!matches(&d, &json!({"n": {"$regex": "4"}})));
        assert!(!matches(&d, &json!({"name": {"$regex": "("}})));
    }

    #[test]
    fn options_without_regex_fail() {
        let d = doc(json!({"name": "Alice"}));
        assert!(!matches(&d, &json!({"name": {"$options": "i"}})));
        assert!(!matches(&d, &json!({"zz": {"$options": "i"}})));
        assert!(!matches(&d, &json!({"name": {"$exists": true, "$options": "i"}})));
    }

    #[test]
    fn deep_equality_for_arrays() {
        let d = doc(json!({"v": [1, 2, {"k": 3}]}));
        assert!(matches(&d, &json!({"v": [1, 2.0, {"k": 3}]})));
        assert!(!matches(&d, &json!({"v": [2, 1, {"k": 3}]})));
    }

    #[test]
    fn sort_order_ranks_types() {
        let missing = None;
        let null = json!(null);
        let one = json!(1);
        let s = json!("a");
        assert_eq!(compare_for_sort(missing, Some(&null)), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&null), Some(&one)), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&one), Some(&s)), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&json!(2.5)), Some(&json!(2))), Ordering::Greater);
    }
}
