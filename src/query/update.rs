use crate::errors::DbError;
use crate::types::Document;
use serde_json::{Number, Value};

use super::eval::{eval_condition, values_equal};
use super::path;
use super::types::{FieldUpdate, PopEnd, UpdateDoc, UpdateOp};

/// Compute the document that results from applying `update` to `doc`.
///
/// `doc` itself is never modified; the result is built on a deep copy, so no
/// nested container is shared with the input.
///
/// # Errors
/// Returns `InvalidFieldType` when an array operator meets a field of the
/// wrong type (or, for `$pull` and `$pop`, a missing field), and when `$inc`
/// meets a non-numeric field.
pub fn apply_update(doc: &Document, update: &UpdateDoc) -> Result<Document, DbError> {
    let mut out = doc.clone();
    for (field, fu) in &update.entries {
        apply_field(&mut out, field, fu)?;
    }
    Ok(out)
}

fn apply_field(doc: &mut Document, field: &str, fu: &FieldUpdate) -> Result<(), DbError> {
    match fu {
        FieldUpdate::Set(v) => path::set(doc, field, v.clone()),
        FieldUpdate::Unset => {
            path::delete(doc, field);
        }
        FieldUpdate::Inc(by) => {
            let sum = match path::get(doc, field) {
                None => Value::Number(by.clone()),
                Some(Value::Number(cur)) => add_numbers(cur, by),
                Some(_) => {
                    return Err(DbError::InvalidFieldType {
                        field: field.to_string(),
                        operator: UpdateOp::Inc.name(),
                    });
                }
            };
            path::set(doc, field, sum);
        }
        FieldUpdate::Push(v) => {
            let mut items = array_or_empty(doc, field, UpdateOp::Push)?;
            items.push(v.clone());
            path::set(doc, field, Value::Array(items));
        }
        FieldUpdate::AddToSet(v) => {
            let mut items = array_or_empty(doc, field, UpdateOp::AddToSet)?;
            if !items.iter().any(|x| values_equal(x, v)) {
                items.push(v.clone());
            }
            path::set(doc, field, Value::Array(items));
        }
        FieldUpdate::Pull(cond) => {
            let items = required_array(doc, field, UpdateOp::Pull)?;
            items.retain(|item| !eval_condition(Some(item), cond));
        }
        FieldUpdate::Pop(end) => {
            let items = required_array(doc, field, UpdateOp::Pop)?;
            match end {
                PopEnd::Last => {
                    items.pop();
                }
                PopEnd::First if !items.is_empty() => {
                    items.remove(0);
                }
                PopEnd::First | PopEnd::Neither => {}
            }
        }
    }
    Ok(())
}

/// Current array at `field`; a missing field counts as empty.
fn array_or_empty(doc: &Document, field: &str, op: UpdateOp) -> Result<Vec<Value>, DbError> {
    match path::get(doc, field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(wrong_type(field, op)),
    }
}

/// Mutable array at `field`; a missing field is an error.
fn required_array<'a>(
    doc: &'a mut Document,
    field: &str,
    op: UpdateOp,
) -> Result<&'a mut Vec<Value>, DbError> {
    match path::get_mut(doc, field) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(wrong_type(field, op)),
    }
}

fn wrong_type(field: &str, op: UpdateOp) -> DbError {
    DbError::InvalidFieldType { field: field.to_string(), operator: op.name() }
}

/// Integer addition when both sides are integers and it does not overflow,
/// floating point otherwise.
fn add_numbers(a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64())
        && let Some(sum) = x.checked_add(y)
    {
        return Value::from(sum);
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map_or(Value::Null, Value::Number)
}
