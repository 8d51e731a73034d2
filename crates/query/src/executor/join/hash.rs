//! Hash join.
//!
//! Build phase: a multi-map from composite key to row indices over the
//! buffered right input (duplicates retained under the same key). Probe
//! phase: the left input streams through, emitting one combined row per
//! (probe row, matching build row) pair.
//!
//! SQL null semantics: a null key component never equals any key, so such
//! rows bypass the hash table entirely and take the non-matching path.

use crate::ast::Expr;
use crate::eval::{eval, Env};
use crate::executor::entry::Entry;
use crate::executor::join::{prepare_inputs, preserves_left, preserves_right, LeftFeed};
use crate::executor::operator::{BoxedOperator, Operator};
use crate::plan::JoinKind;
use hashbrown::HashMap;
use rill_core::{Error, FieldNames, Result, Row, Value};

/// Hash-strategy join over a composite equi-key.
pub struct HashJoinOp {
    left: Option<BoxedOperator>,
    right: Option<BoxedOperator>,
    kind: JoinKind,
    left_keys: Vec<Expr>,
    right_keys: Vec<Expr>,
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
    table: HashMap<Vec<Value>, Vec<u32>>,
    right_matched: Vec<bool>,
    /// Current probe row and its pending match indices.
    current: Option<(Row, Vec<u32>, usize)>,
    tail_pos: usize,
}

impl HashJoinOp {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        kind: JoinKind,
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
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
            left_keys,
            right_keys,
            env,
            parallel,
            names: Row::names_of(combined),
            left_names,
            right_names,
            state: None,
        }
    }

    /// Evaluates a key expression list on a row; None when any component is
    /// null (null keys never match).
    fn key_of(keys: &[Expr], row: &Row, env: &Env) -> Result<Option<Vec<Value>>> {
        let entry = Entry::row(row.clone());
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let v = eval(key, &entry, env)?;
            if v.is_null() {
                return Ok(None);
            }
            out.push(v);
        }
        Ok(Some(out))
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

        let mut table: HashMap<Vec<Value>, Vec<u32>> = HashMap::with_capacity(right_rows.len());
        for (idx, row) in right_rows.iter().enumerate() {
            if let Some(key) = Self::key_of(&self.right_keys, row, &self.env)? {
                table.entry(key).or_default().push(idx as u32);
            }
        }

        let matched = vec![false; right_rows.len()];
        self.state = Some(State {
            left_feed,
            right_rows,
            table,
            right_matched: matched,
            current: None,
            tail_pos: 0,
        });
        Ok(())
    }
}

impl Operator for HashJoinOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        if self.state.is_none() {
            self.init()?;
        }
        let state = match &mut self.state {
            Some(s) => s,
            None => return Ok(None),
        };

        loop {
            // Emit pending matches for the current probe row.
            if let Some((row, matches, mut pos)) = state.current.take() {
                if pos < matches.len() {
                    let idx = matches[pos] as usize;
                    pos += 1;
                    state.right_matched[idx] = true;
                    let combined = Row::combine(&row, &state.right_rows[idx]);
                    state.current = Some((row, matches, pos));
                    return Ok(Some(Entry::row(combined)));
                }
            }

            match state.left_feed.next_row()? {
                Some(row) => {
                    let key = Self::key_of(&self.left_keys, &row, &self.env)?;
                    let matches = key.and_then(|k| state.table.get(&k).cloned());
                    match matches {
                        Some(matches) if !matches.is_empty() => {
                            state.current = Some((row, matches, 0));
                        }
                        _ => {
                            if preserves_left(self.kind) {
                                return Ok(Some(Entry::row(Row::combine_null_right(
                                    &row,
                                    &self.right_names,
                                ))));
                            }
                        }
                    }
                }
                None => break,
            }
        }

        // Tail: unmatched build rows for right/full joins.
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
