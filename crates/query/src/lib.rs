//! Rill Query - query engine for in-process sequences.
//!
//! This crate provides the query execution engine:
//!
//! - `ast`: expression AST (field refs, operators, aggregates, window functions)
//! - `plan`: the clause-ordered query plan model and its validation
//! - `optimizer`: rule-based plan rewriting (pushdown, join strategy, hoisting)
//! - `executor`: pull-based execution operators (scan, filter, join, group,
//!   window, sort, limit, project)
//! - `scheduler`: plan compilation and sequential/parallel driving
//! - `bindings`: data source registry (in-memory tables and single-pass streams)
//!
//! The engine receives an already-constructed [`plan::QueryPlan`] (there is no
//! text front-end here), validates it, optionally optimizes it, and evaluates
//! it lazily against the bound sources.
//!
//! # Example
//!
//! ```rust
//! use rill_core::Value;
//! use rill_query::ast::Expr;
//! use rill_query::bindings::Bindings;
//! use rill_query::plan::QueryPlan;
//! use rill_query::scheduler::{execute, ExecOptions};
//!
//! let mut bindings = Bindings::new();
//! bindings.bind_table(
//!     "n",
//!     &["value"],
//!     vec![vec![Value::Int64(3)], vec![Value::Int64(1)], vec![Value::Int64(2)]],
//! );
//!
//! let plan = QueryPlan::from_binding("n")
//!     .filter(Expr::gt(Expr::field("n", "value"), Expr::lit(1i64)))
//!     .select([(Expr::field("n", "value"), "value")]);
//!
//! let rows = execute(&plan, &bindings, ExecOptions::default()).unwrap();
//! let out = rows.into_vec().unwrap();
//! assert_eq!(out.len(), 2);
//! ```

pub mod ast;
pub mod bindings;
pub mod eval;
pub mod executor;
pub mod optimizer;
pub mod plan;
pub mod rows;
pub mod scheduler;

pub use rill_core::{DataType, Error, Result, Row, Value};
