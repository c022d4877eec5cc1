use crate::errors::DbError;
use serde_json::{Map, Value};

use super::types::{
    Condition, FieldOp, FieldUpdate, Filter, FindOptions, LogicalOp, Order, PopEnd, QueryOp,
    SortSpec, UpdateDoc, UpdateOp,
};

/// Compile a JSON query into a `Filter`.
///
/// Compilation never fails: anything malformed becomes `Filter::Never` so the
/// affected branch simply does not match.
#[must_use]
pub fn compile(query: &Value) -> Filter {
    match query {
        Value::Object(map) => compile_object(map),
        _ => Filter::Never,
    }
}

fn compile_object(map: &Map<String, Value>) -> Filter {
    let mut parts = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key.starts_with('$') {
            parts.push(compile_logical(key, value));
        } else {
            parts.push(Filter::Field { path: key.clone(), cond: compile_condition(value) });
        }
    }
    if parts.len() == 1 {
        return parts.pop().unwrap_or(Filter::Never);
    }
    Filter::And(parts)
}

fn compile_logical(key: &str, value: &Value) -> Filter {
    let Some(op) = LogicalOp::from_name(key) else {
        log::debug!("unknown composition operator {key}");
        return Filter::Never;
    };
    let Value::Array(items) = value else {
        return Filter::Never;
    };
    let subs: Vec<Filter> = items.iter().map(compile).collect();
    match op {
        LogicalOp::And if subs.is_empty() => Filter::Never,
        LogicalOp::Or if subs.is_empty() => Filter::Never,
        LogicalOp::And => Filter::And(subs),
        LogicalOp::Or => Filter::Or(subs),
        LogicalOp::Nor => Filter::Nor(subs),
    }
}

/// Compile the right-hand side of a field entry.
///
/// An object is a set of operators that must all hold; anything else is an
/// implicit `$eq`.
#[must_use]
pub fn compile_condition(operand: &Value) -> Condition {
    let Value::Object(ops) = operand else {
        return Condition { ops: vec![FieldOp::Eq(operand.clone())] };
    };
    let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
    let mut out = Vec::with_capacity(ops.len());
    for (name, arg) in ops {
        let op = match QueryOp::from_name(name) {
            Some(QueryOp::Eq) => FieldOp::Eq(arg.clone()),
            Some(QueryOp::Ne) => FieldOp::Ne(arg.clone()),
            Some(QueryOp::Gt) => FieldOp::Gt(arg.clone()),
            Some(QueryOp::Gte) => FieldOp::Gte(arg.clone()),
            Some(QueryOp::Lt) => FieldOp::Lt(arg.clone()),
            Some(QueryOp::Lte) => FieldOp::Lte(arg.clone()),
            Some(QueryOp::In) => match arg {
                Value::Array(vals) => FieldOp::In(vals.clone()),
                _ => FieldOp::Invalid,
            },
            Some(QueryOp::Nin) => match arg {
                Value::Array(vals) => FieldOp::Nin(vals.clone()),
                _ => FieldOp::Invalid,
            },
            Some(QueryOp::Not) => FieldOp::Not(Box::new(compile_condition(arg))),
            Some(QueryOp::Exists) => FieldOp::Exists(truthy(arg)),
            Some(QueryOp::Type) => match arg {
                Value::String(tag) => FieldOp::Type(tag.clone()),
                _ => FieldOp::Invalid,
            },
            Some(QueryOp::Regex) => compile_regex(arg, options),
            Some(QueryOp::Options) if ops.contains_key("$regex") => continue,
            Some(QueryOp::Options) => FieldOp::Invalid,
            None => FieldOp::Invalid,
        };
        out.push(op);
    }
    Condition { ops: out }
}

#[cfg(feature = "regex")]
fn compile_regex(arg: &Value, options: &str) -> FieldOp {
    let Value::String(pattern) = arg else {
        return FieldOp::Invalid;
    };
    let mut builder = regex::RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => &mut builder,
        };
    }
    match builder.build() {
        Ok(re) => FieldOp::Regex(re),
        Err(e) => {
            log::debug!("invalid $regex pattern {pattern:?}: {e}");
            FieldOp::Invalid
        }
    }
}

#[cfg(not(feature = "regex"))]
fn compile_regex(_arg: &Value, _options: &str) -> FieldOp {
    FieldOp::Invalid
}

pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl TryFrom<&Value> for UpdateDoc {
    type Error = DbError;

    fn try_from(update: &Value) -> Result<Self, Self::Error> {
        let Value::Object(by_op) = update else {
            return Err(DbError::MalformedUpdate("update must be an object".into()));
        };
        let mut grouped: Vec<(UpdateOp, &Map<String, Value>)> = Vec::with_capacity(by_op.len());
        for (name, fields) in by_op {
            let op = UpdateOp::from_name(name)
                .ok_or_else(|| DbError::MalformedUpdate(format!("unknown operator {name}")))?;
            let Value::Object(fields) = fields else {
                return Err(DbError::MalformedUpdate(format!("{name} expects a field mapping")));
            };
            grouped.push((op, fields));
        }
        let mut out = Self::default();
        for op in UpdateOp::ORDER {
            for (_, fields) in grouped.iter().filter(|(o, _)| *o == op) {
                for (field, operand) in *fields {
                    out.entries.push((field.clone(), field_update(op, operand)?));
                }
            }
        }
        Ok(out)
    }
}

fn field_update(op: UpdateOp, operand: &Value) -> Result<FieldUpdate, DbError> {
    Ok(match op {
        UpdateOp::Set => FieldUpdate::Set(operand.clone()),
        UpdateOp::Unset => FieldUpdate::Unset,
        UpdateOp::Inc => match operand {
            Value::Number(n) => FieldUpdate::Inc(n.clone()),
            _ => return Err(DbError::MalformedUpdate("$inc requires numeric".into())),
        },
        UpdateOp::Push => FieldUpdate::Push(operand.clone()),
        UpdateOp::Pull => FieldUpdate::Pull(compile_condition(operand)),
        UpdateOp::AddToSet => FieldUpdate::AddToSet(operand.clone()),
        UpdateOp::Pop => FieldUpdate::Pop(match operand.as_f64() {
            Some(d) if d == 1.0 => PopEnd::Last,
            Some(d) if d == -1.0 => PopEnd::First,
            _ => PopEnd::Neither,
        }),
    })
}

/// Parse an ordered `{field: 1 | -1}` mapping into sort keys.
///
/// # Errors
/// Returns `MalformedQuery` for a non-object spec or a direction other than `1`/`-1`.
pub fn parse_sort(spec: &Value) -> Result<Vec<SortSpec>, DbError> {
    let Value::Object(map) = spec else {
        return Err(DbError::MalformedQuery("sort spec must be an object".into()));
    };
    map.iter()
        .map(|(field, dir)| match dir.as_i64() {
            Some(1) => Ok(SortSpec { field: field.clone(), order: Order::Asc }),
            Some(-1) => Ok(SortSpec { field: field.clone(), order: Order::Desc }),
            _ => Err(DbError::MalformedQuery(format!("sort direction for '{field}' must be 1 or -1"))),
        })
        .collect()
}

/// Parse `{"sort": {...}, "skip": n, "limit": n}`.
///
/// # Errors
/// Returns `MalformedQuery` for unknown keys, bad sort specs or non-integer counts.
pub fn parse_find_options(options: &Value) -> Result<FindOptions, DbError> {
    let Value::Object(map) = options else {
        return Err(DbError::MalformedQuery("find options must be an object".into()));
    };
    let mut out = FindOptions::default();
    for (key, value) in map {
        match key.as_str() {
            "sort" => out.sort = Some(parse_sort(value)?),
            "skip" => out.skip = Some(parse_count(key, value)?),
            "limit" => out.limit = Some(parse_count(key, value)?),
            other => return Err(DbError::MalformedQuery(format!("unknown find option {other}"))),
        }
    }
    Ok(out)
}

fn parse_count(key: &str, value: &Value) -> Result<usize, DbError> {
    value
        .as_u64()
        .and_then(crate::utils::num::u64_to_usize)
        .ok_or_else(|| DbError::MalformedQuery(format!("{key} must be a non-negative integer")))
}

/// # Errors
/// Returns an error if the JSON string is not valid JSON.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    let v: Value = serde_json::from_str(json)?;
    Ok(compile(&v))
}

/// # Errors
/// Returns an error if the JSON string is not valid JSON or not a valid update.
pub fn parse_update_json(json: &str) -> Result<UpdateDoc, DbError> {
    let v: Value = serde_json::from_str(json)?;
    UpdateDoc::try_from(&v)
}
