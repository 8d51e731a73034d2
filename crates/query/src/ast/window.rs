//! Window function AST definitions.

use crate::ast::expr::{AggregateCall, Expr};

/// Window functions evaluated over ordered partitions.
#[derive(Clone, Debug, PartialEq)]
pub enum WindowFunc {
    /// 0-based physical position within the partition; never repeats.
    RowNumber,
    /// 1-based rank; ties share a rank and leave gaps.
    Rank,
    /// 1-based rank; ties share a rank without gaps.
    DenseRank,
    /// (rank - 1) / (partition size - 1); 0 for a singleton partition.
    PercentRank,
    /// Fraction of partition rows with order key <= the current row's.
    CumeDist,
    /// Value of `expr` at the row `offset` positions after the current row.
    Lead {
        expr: Box<Expr>,
        offset: i64,
        default: Option<Box<Expr>>,
    },
    /// Value of `expr` at the row `offset` positions before the current row.
    Lag {
        expr: Box<Expr>,
        offset: i64,
        default: Option<Box<Expr>>,
    },
    /// Value of `expr` at the first row of the frame.
    FirstValue(Box<Expr>),
    /// Value of `expr` at the last row of the frame.
    LastValue(Box<Expr>),
    /// Value of `expr` at the 0-based `n`-th row of the frame.
    NthValue { expr: Box<Expr>, n: usize },
    /// Any aggregate, evaluated over the current row's frame.
    Aggregate(AggregateCall),
}

impl WindowFunc {
    /// Creates a LEAD with the default offset of 1 and Null default.
    pub fn lead(expr: Expr) -> Self {
        WindowFunc::Lead {
            expr: Box::new(expr),
            offset: 1,
            default: None,
        }
    }

    /// Creates a LAG with the default offset of 1 and Null default.
    pub fn lag(expr: Expr) -> Self {
        WindowFunc::Lag {
            expr: Box::new(expr),
            offset: 1,
            default: None,
        }
    }

    /// Creates a LEAD with an explicit offset and default expression.
    pub fn lead_with(expr: Expr, offset: i64, default: Expr) -> Self {
        WindowFunc::Lead {
            expr: Box::new(expr),
            offset,
            default: Some(Box::new(default)),
        }
    }

    /// Creates a LAG with an explicit offset and default expression.
    pub fn lag_with(expr: Expr, offset: i64, default: Expr) -> Self {
        WindowFunc::Lag {
            expr: Box::new(expr),
            offset,
            default: Some(Box::new(default)),
        }
    }

    /// Creates a FIRST_VALUE function.
    pub fn first_value(expr: Expr) -> Self {
        WindowFunc::FirstValue(Box::new(expr))
    }

    /// Creates a LAST_VALUE function.
    pub fn last_value(expr: Expr) -> Self {
        WindowFunc::LastValue(Box::new(expr))
    }

    /// Creates an NTH_VALUE function (0-based n).
    pub fn nth_value(expr: Expr, n: usize) -> Self {
        WindowFunc::NthValue {
            expr: Box::new(expr),
            n,
        }
    }

    /// Wraps an aggregate expression as a window function.
    ///
    /// Panics in debug builds if `expr` is not an aggregate call; window
    /// aggregates must be constructed from the aggregate builders.
    pub fn aggregate(expr: Expr) -> Self {
        match expr {
            Expr::Aggregate(call) => WindowFunc::Aggregate(call),
            other => {
                debug_assert!(false, "not an aggregate call: {:?}", other);
                WindowFunc::Aggregate(AggregateCall {
                    func: crate::ast::AggregateFunc::Count,
                    expr: Some(Box::new(other)),
                })
            }
        }
    }

    /// Returns true if this function's result depends on the frame rather
    /// than the whole partition.
    pub fn is_framed(&self) -> bool {
        matches!(
            self,
            WindowFunc::FirstValue(_)
                | WindowFunc::LastValue(_)
                | WindowFunc::NthValue { .. }
                | WindowFunc::Aggregate(_)
        )
    }
}
