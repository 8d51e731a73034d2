//! Entry and group types flowing between operators.

use hashbrown::HashMap;
use rill_core::{Result, Row, Value};
use std::sync::{Arc, Mutex};

/// A row with optional group context.
///
/// Most operators pass plain rows; the grouping operator emits entries whose
/// row carries the group key values and whose `group` handle exposes the
/// member rows to aggregate evaluation in `having`, `orderby` and `select`.
#[derive(Clone, Debug)]
pub struct Entry {
    pub row: Row,
    pub group: Option<Arc<Group>>,
}

impl Entry {
    /// Creates a plain entry.
    #[inline]
    pub fn row(row: Row) -> Self {
        Self { row, group: None }
    }

    /// Creates a grouped entry.
    #[inline]
    pub fn grouped(row: Row, group: Arc<Group>) -> Self {
        Self {
            row,
            group: Some(group),
        }
    }
}

/// A completed group: its key values and member rows.
///
/// Buffering aggregates cache their result here so repeated references in
/// `having`/`orderby`/`select` compute once per group.
#[derive(Debug)]
pub struct Group {
    key: Vec<Value>,
    rows: Vec<Row>,
    cache: Mutex<HashMap<String, Value>>,
}

impl Group {
    /// Creates a group from its key values and member rows.
    pub fn new(key: Vec<Value>, rows: Vec<Row>) -> Self {
        Self {
            key,
            rows,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the group key values.
    #[inline]
    pub fn key(&self) -> &[Value] {
        &self.key
    }

    /// Returns the member rows.
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of member rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the group has no member rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cached value for `key`, computing and storing it on the
    /// first request.
    pub fn cached(&self, key: &str, compute: impl FnOnce() -> Result<Value>) -> Result<Value> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(v) = cache.get(key) {
                return Ok(v.clone());
            }
        }
        let value = compute()?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Returns the explicit context handle passed to caller-supplied
    /// aggregation functions.
    pub fn context(&self) -> GroupContext<'_> {
        GroupContext {
            key: &self.key,
            rows: &self.rows,
        }
    }
}

/// The explicit "current group" handle given to caller-supplied aggregation
/// functions: the grouped row sequence plus the group's key values.
#[derive(Clone, Copy, Debug)]
pub struct GroupContext<'a> {
    pub key: &'a [Value],
    pub rows: &'a [Row],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_cache_idempotent() {
        let group = Group::new(vec![], vec![Row::new(["x"], vec![Value::Int64(1)])]);

        let mut calls = 0;
        for _ in 0..3 {
            let v = group
                .cached("median|x", || {
                    calls += 1;
                    Ok(Value::Int64(1))
                })
                .unwrap();
            assert_eq!(v, Value::Int64(1));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_group_context() {
        let rows = vec![
            Row::new(["x"], vec![Value::Int64(1)]),
            Row::new(["x"], vec![Value::Int64(2)]),
        ];
        let group = Group::new(vec![Value::String("a".into())], rows);
        let ctx = group.context();
        assert_eq!(ctx.rows.len(), 2);
        assert_eq!(ctx.key[0], Value::String("a".into()));
    }
}
