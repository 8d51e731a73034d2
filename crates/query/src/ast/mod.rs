//! AST module for query expressions and window functions.

mod expr;
mod window;

pub use expr::{
    AggregateCall, AggregateFunc, BinaryOp, Expr, FieldRef, NullOrder, SortOrder, UnaryOp, UserAgg,
};
pub use window::WindowFunc;
