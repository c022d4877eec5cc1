// Telemetry is a submodule of query
pub mod telemetry;

pub mod path;

// Submodules for separation of concerns
mod cursor;
mod eval;
mod parse;
mod types;
mod update;

// Public API re-exports
pub use cursor::Cursor;
pub use eval::{compare_docs, compare_values, eval_condition, eval_filter, matches, values_equal};
pub use parse::{
    compile, compile_condition, parse_filter_json, parse_find_options, parse_sort,
    parse_update_json,
};
pub use types::{
    Condition, DeleteReport, FieldOp, FieldUpdate, Filter, FindOptions, InsertManyResult,
    InsertOneResult, LogicalOp, Order, PopEnd, QueryOp, SortSpec, UpdateDoc, UpdateOp,
    UpdateReport, type_tag,
};
pub use update::apply_update;
