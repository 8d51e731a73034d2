//! Operator trait for pull-based query execution.

use crate::executor::entry::Entry;
use rill_core::{FieldNames, Result};

/// A pull-based query operator.
///
/// `next()` returns the next entry or `None` at end of sequence. A sequence
/// is consumed at most once; operators are not restartable.
pub trait Operator: Send {
    /// Pulls the next entry.
    fn next(&mut self) -> Result<Option<Entry>>;

    /// The field names of the rows this operator produces.
    fn names(&self) -> FieldNames;
}

/// A boxed operator in a compiled chain.
pub type BoxedOperator = Box<dyn Operator>;
