//! The terminal lazy sequence returned by `execute`.

use crate::executor::{BoxedOperator, Operator};
use rill_core::{Result, Row};
use std::collections::HashSet;

/// A lazily evaluated sequence of result rows.
///
/// `Rows` is an `Iterator` over `Result<Row>`: evaluation progresses exactly
/// as far as the consumer pulls, and an error ends the sequence. The
/// materializers force full evaluation into a concrete container.
pub struct Rows {
    op: BoxedOperator,
    done: bool,
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Rows {
    pub(crate) fn new(op: BoxedOperator) -> Self {
        Self { op, done: false }
    }

    /// Materializes every row into a vector.
    pub fn into_vec(self) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for row in self {
            out.push(row?);
        }
        Ok(out)
    }

    /// Materializes into a set, deduplicating by row values.
    pub fn into_set(self) -> Result<HashSet<Row>> {
        let mut out = HashSet::new();
        for row in self {
            out.insert(row?);
        }
        Ok(out)
    }

    /// Materializes into a boxed slice.
    pub fn into_array(self) -> Result<Box<[Row]>> {
        Ok(self.into_vec()?.into_boxed_slice())
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.op.next() {
            Ok(Some(entry)) => Some(Ok(entry.row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
