//! Rill Core - Core types for the rill in-process query engine.
//!
//! This crate provides the foundational types shared by the engine:
//!
//! - `DataType`: runtime type discriminants (Boolean, Int64, Float64, String)
//! - `Value`: dynamically-typed cell values
//! - `Row`: an ordered, named tuple of values
//! - `Error`: the engine-wide error taxonomy
//!
//! # Example
//!
//! ```rust
//! use rill_core::{Row, Value};
//!
//! let row = Row::new(
//!     ["id", "name"],
//!     vec![Value::Int64(1), Value::String("Alice".into())],
//! );
//!
//! assert_eq!(row.get(0), Some(&Value::Int64(1)));
//! assert_eq!(row.get_named("name"), Some(&Value::String("Alice".into())));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod row;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::{FieldNames, Row};
pub use types::DataType;
pub use value::Value;
