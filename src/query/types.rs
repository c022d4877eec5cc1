use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-level query operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Not,
    Exists,
    Type,
    Regex,
    Options,
}

impl QueryOp {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$not" => Self::Not,
            "$exists" => Self::Exists,
            "$type" => Self::Type,
            "$regex" => Self::Regex,
            "$options" => Self::Options,
            _ => return None,
        })
    }
}

/// Top-level boolean composition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nor,
}

impl LogicalOp {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "$and" => Some(Self::And),
            "$or" => Some(Self::Or),
            "$nor" => Some(Self::Nor),
            _ => None,
        }
    }
}

/// Update operators, listed in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Set,
    Unset,
    Inc,
    Push,
    Pull,
    AddToSet,
    Pop,
}

impl UpdateOp {
    /// Application order when one update carries several operators.
    pub const ORDER: [Self; 7] =
        [Self::Set, Self::Unset, Self::Inc, Self::Push, Self::Pull, Self::AddToSet, Self::Pop];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$set" => Self::Set,
            "$unset" => Self::Unset,
            "$inc" => Self::Inc,
            "$push" => Self::Push,
            "$pull" => Self::Pull,
            "$addToSet" => Self::AddToSet,
            "$pop" => Self::Pop,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Set => "$set",
            Self::Unset => "$unset",
            Self::Inc => "$inc",
            Self::Push => "$push",
            Self::Pull => "$pull",
            Self::AddToSet => "$addToSet",
            Self::Pop => "$pop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Options for `Collection::find_with_options`; each one pre-seeds the
/// matching cursor modifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    pub sort: Option<Vec<SortSpec>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertOneResult {
    pub id: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertManyResult {
    pub ids: Vec<String>,
}

/// Matched and modified counts are always equal: an update that leaves a
/// document unchanged still counts as a modification.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted_count: u64,
}

/// Type tag used by `$type`.
#[must_use]
pub fn type_tag(v: &Value) -> &'static str {
    crate::document::kind_name(v)
}

/// A compiled query. Built once per `find` by `parse::compile`.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every child must match. An empty list matches everything.
    And(Vec<Filter>),
    /// At least one child must match.
    Or(Vec<Filter>),
    /// No child may match.
    Nor(Vec<Filter>),
    Field { path: String, cond: Condition },
    /// Unknown or malformed query construct; never matches.
    Never,
}

impl Filter {
    /// A filter that matches every document.
    #[must_use]
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }
}

/// All operators applied to one resolved field value; every one must hold.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    pub ops: Vec<FieldOp>,
}

#[derive(Debug, Clone)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Not(Box<Condition>),
    Exists(bool),
    Type(String),
    #[cfg(feature = "regex")]
    Regex(regex::Regex),
    Invalid,
}

/// Which end of an array `$pop` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopEnd {
    First,
    Last,
    /// Operand other than `1` or `-1`.
    Neither,
}

#[derive(Debug, Clone)]
pub enum FieldUpdate {
    Set(Value),
    Unset,
    Inc(serde_json::Number),
    Push(Value),
    Pull(Condition),
    AddToSet(Value),
    Pop(PopEnd),
}

impl FieldUpdate {
    #[must_use]
    pub const fn op(&self) -> UpdateOp {
        match self {
            Self::Set(_) => UpdateOp::Set,
            Self::Unset => UpdateOp::Unset,
            Self::Inc(_) => UpdateOp::Inc,
            Self::Push(_) => UpdateOp::Push,
            Self::Pull(_) => UpdateOp::Pull,
            Self::AddToSet(_) => UpdateOp::AddToSet,
            Self::Pop(_) => UpdateOp::Pop,
        }
    }
}

/// A validated update, with entries already in application order.
#[derive(Debug, Default, Clone)]
pub struct UpdateDoc {
    pub entries: Vec<(String, FieldUpdate)>,
}
