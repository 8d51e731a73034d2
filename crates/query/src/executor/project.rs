//! Projection operator.

use crate::eval::{eval, Env};
use crate::executor::entry::Entry;
use crate::executor::operator::{BoxedOperator, Operator};
use crate::plan::NamedExpr;
use crate::scheduler::pool;
use hashbrown::HashSet;
use rill_core::{FieldNames, Result, Row, Value};

/// Projects entries through the select items, producing rows named by the
/// item names. `distinct` drops rows whose projected values were already
/// emitted.
///
/// Projection streams. The exception is parallel mode over grouped input:
/// per-group aggregate evaluation is independent work, so the operator
/// drains its input and fans the groups out to the shared worker pool.
pub struct ProjectOp {
    input: BoxedOperator,
    items: Vec<NamedExpr>,
    distinct: bool,
    env: Env,
    parallel: bool,
    names: FieldNames,
    seen: Option<HashSet<Vec<Value>>>,
    buffered: Option<std::vec::IntoIter<Row>>,
    started: bool,
}

impl ProjectOp {
    pub fn new(
        input: BoxedOperator,
        items: Vec<NamedExpr>,
        distinct: bool,
        env: Env,
        parallel: bool,
    ) -> Self {
        let names = Row::names_of(items.iter().map(|i| i.name.clone()));
        let seen = if distinct { Some(HashSet::new()) } else { None };
        Self {
            input,
            items,
            distinct,
            env,
            parallel,
            names,
            seen,
            buffered: None,
            started: false,
        }
    }

    fn project(items: &[NamedExpr], names: &FieldNames, entry: &Entry, env: &Env) -> Result<Row> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(eval(&item.expr, entry, env)?);
        }
        Ok(Row::with_names(names.clone(), values))
    }

    /// Returns the next projected row, observing distinct.
    fn emit(&mut self, row: Row) -> Option<Row> {
        match &mut self.seen {
            Some(seen) => {
                if seen.insert(row.values().to_vec()) {
                    Some(row)
                } else {
                    None
                }
            }
            None => Some(row),
        }
    }

    /// Parallel path: drain grouped entries and evaluate each group's
    /// projection as a pool task.
    fn materialize_parallel(&mut self, first: Entry) -> Result<std::vec::IntoIter<Row>> {
        let mut entries = vec![first];
        while let Some(entry) = self.input.next()? {
            entries.push(entry);
        }

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let items = self.items.clone();
            let names = self.names.clone();
            let env = self.env.clone();
            tasks.push(pool::submit(move || {
                Self::project(&items, &names, &entry, &env)
            })?);
        }

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            rows.push(task.join()??);
        }
        Ok(rows.into_iter())
    }
}

impl Operator for ProjectOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(buffered) = &mut self.buffered {
                for row in buffered {
                    if let Some(row) = match &mut self.seen {
                        Some(seen) => {
                            if seen.insert(row.values().to_vec()) {
                                Some(row)
                            } else {
                                None
                            }
                        }
                        None => Some(row),
                    } {
                        return Ok(Some(Entry::row(row)));
                    }
                }
                return Ok(None);
            }

            let entry = match self.input.next()? {
                Some(e) => e,
                None => return Ok(None),
            };

            // First grouped entry in parallel mode switches to fan-out.
            if self.parallel && !self.started && entry.group.is_some() {
                self.started = true;
                self.buffered = Some(self.materialize_parallel(entry)?);
                continue;
            }
            self.started = true;

            let row = Self::project(&self.items, &self.names, &entry, &self.env)?;
            if let Some(row) = self.emit(row) {
                return Ok(Some(Entry::row(row)));
            }
        }
    }

    fn names(&self) -> FieldNames {
        self.names.clone()
    }
}
