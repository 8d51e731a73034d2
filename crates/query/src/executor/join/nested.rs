//! Nested loop join.

use crate::ast::Expr;
use crate::eval::{eval, is_true, Env};
use crate::executor::entry::Entry;
use crate::executor::join::{prepare_inputs, preserves_left, preserves_right, LeftFeed};
use crate::executor::operator::{BoxedOperator, Operator};
use crate::plan::JoinKind;
use rill_core::{Error, FieldNames, Result, Row};

/// Joins by scanning the buffered right input once per left row and testing
/// the predicate on each combined row. Works for any predicate shape; the
/// predicate is an arbitrary boolean expression over both sides' fields.
pub struct NestedLoopJoinOp {
    left: Option<BoxedOperator>,
    right: Option<BoxedOperator>,
    kind: JoinKind,
    on: Option<Expr>,
    env: Env,
    parallel: bool,
    names: FieldNames,
    left_names: FieldNames,
    right_names: FieldNames,
    state: Option<State>,
}

struct State {
    left_feed: LeftFeed,
    right_rows: Vec<Row>,
    right_matched: Vec<bool>,
    current_left: Option<Row>,
    right_pos: usize,
    current_matched: bool,
    tail_pos: usize,
}

impl NestedLoopJoinOp {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        kind: JoinKind,
        on: Option<Expr>,
        env: Env,
        parallel: bool,
    ) -> Self {
        let left_names = left.names();
        let right_names = right.names();
        let mut combined: Vec<String> = left_names.iter().cloned().collect();
        combined.extend(right_names.iter().cloned());
        Self {
            left: Some(left),
            right: Some(right),
            kind,
            on,
            env,
            parallel,
            names: Row::names_of(combined),
            left_names,
            right_names,
            state: None,
        }
    }

    fn init(&mut self) -> Result<()> {
        let left = self
            .left
            .take()
            .ok_or_else(|| Error::invalid_operation("join inputs already consumed"))?;
        let right = self
            .right
            .take()
            .ok_or_else(|| Error::invalid_operation("join inputs already consumed"))?;
        let (left_feed, right_rows) = prepare_inputs(left, right, self.parallel)?;
        let matched = vec![false; right_rows.len()];
        self.state = Some(State {
            left_feed,
            right_rows,
            right_matched: matched,
            current_left: None,
            right_pos: 0,
            current_matched: false,
            tail_pos: 0,
        });
        Ok(())
    }

}

impl Operator for NestedLoopJoinOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        if self.state.is_none() {
            self.init()?;
        }
        let state = match &mut self.state {
            Some(s) => s,
            None => return Ok(None),
        };

        loop {
            if state.current_left.is_none() {
                match state.left_feed.next_row()? {
                    Some(row) => {
                        state.current_left = Some(row);
                        state.right_pos = 0;
                        state.current_matched = false;
                    }
                    None => break,
                }
            }

            // Scan the remaining right rows for the current left row.
            while state.right_pos < state.right_rows.len() {
                let idx = state.right_pos;
                state.right_pos += 1;

                let combined = match &state.current_left {
                    Some(left_row) => Row::combine(left_row, &state.right_rows[idx]),
                    None => break,
                };
                let matched = match self.kind {
                    JoinKind::Cross => true,
                    _ => {
                        let on = self.on.as_ref().ok_or_else(|| {
                            Error::invalid_operation("non-cross join without predicate")
                        })?;
                        let verdict = eval(on, &Entry::row(combined.clone()), &self.env)?;
                        is_true(&verdict)?
                    }
                };
                if matched {
                    state.right_matched[idx] = true;
                    state.current_matched = true;
                    return Ok(Some(Entry::row(combined)));
                }
            }

            // Right side exhausted for this left row.
            let finished = state.current_left.take();
            if let Some(left_row) = finished {
                if !state.current_matched && preserves_left(self.kind) {
                    return Ok(Some(Entry::row(Row::combine_null_right(
                        &left_row,
                        &self.right_names,
                    ))));
                }
            }
        }

        // Tail: unmatched right rows for right/full joins.
        if preserves_right(self.kind) {
            while state.tail_pos < state.right_rows.len() {
                let idx = state.tail_pos;
                state.tail_pos += 1;
                if !state.right_matched[idx] {
                    return Ok(Some(Entry::row(Row::combine_null_left(
                        &self.left_names,
                        &state.right_rows[idx],
                    ))));
                }
            }
        }

        Ok(None)
    }

    fn names(&self) -> FieldNames {
        self.names.clone()
    }
}
