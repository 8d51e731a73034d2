//! Join operators.
//!
//! Both strategies emit combined rows left-fields-first in left-major order:
//! matches for the first left row, then the second, and so on, with
//! null-extended unmatched-left rows inline (left/full) and unmatched-right
//! rows as a tail (right/full). The two strategies therefore agree on output
//! order for any predicate the hash strategy accepts.

mod hash;
mod nested;

pub use hash::HashJoinOp;
pub use nested::NestedLoopJoinOp;

use crate::executor::entry::Entry;
use crate::executor::operator::BoxedOperator;
use crate::plan::JoinKind;
use crate::scheduler::pool;
use rill_core::{Result, Row};

/// Returns true if unmatched left rows survive, null-extended.
pub(crate) fn preserves_left(kind: JoinKind) -> bool {
    matches!(kind, JoinKind::Left | JoinKind::Full)
}

/// Returns true if unmatched right rows survive, null-extended.
pub(crate) fn preserves_right(kind: JoinKind) -> bool {
    matches!(kind, JoinKind::Right | JoinKind::Full)
}

/// Drains an operator into plain rows.
pub(crate) fn drain_rows(mut op: BoxedOperator) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    while let Some(entry) = op.next()? {
        out.push(entry.row);
    }
    Ok(out)
}

/// The left input of a join: streamed in sequential mode, pre-materialized
/// in parallel mode.
pub(crate) enum LeftFeed {
    Stream(BoxedOperator),
    Buffered(std::vec::IntoIter<Row>),
}

impl LeftFeed {
    pub(crate) fn next_row(&mut self) -> Result<Option<Row>> {
        match self {
            LeftFeed::Stream(op) => Ok(op.next()?.map(|e: Entry| e.row)),
            LeftFeed::Buffered(it) => Ok(it.next()),
        }
    }
}

/// Prepares join inputs: buffers the right side, and in parallel mode
/// submits both sides to the shared worker pool as independent tasks.
pub(crate) fn prepare_inputs(
    left: BoxedOperator,
    right: BoxedOperator,
    parallel: bool,
) -> Result<(LeftFeed, Vec<Row>)> {
    if parallel {
        let left_task = pool::submit(move || drain_rows(left))?;
        let right_task = pool::submit(move || drain_rows(right))?;
        let left_rows = left_task.join()??;
        let right_rows = right_task.join()??;
        Ok((LeftFeed::Buffered(left_rows.into_iter()), right_rows))
    } else {
        let right_rows = drain_rows(right)?;
        Ok((LeftFeed::Stream(left), right_rows))
    }
}
