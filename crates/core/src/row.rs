//! Row structure for the rill query engine.
//!
//! A row is an ordered, named tuple of values. Field order is significant for
//! positional access; names are significant for by-name access. The name
//! table is shared between all rows of a sequence via `Arc`.

use crate::value::Value;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Shared field-name table for a sequence of rows.
pub type FieldNames = Arc<[String]>;

/// A single row of query data.
#[derive(Clone, Debug)]
pub struct Row {
    /// Field names, shared across all rows of the producing operator.
    names: FieldNames,
    /// Values indexed by field position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from field names and values.
    pub fn new<N, S>(names: N, values: Vec<Value>) -> Self
    where
        N: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self {
            names: Arc::from(names),
            values,
        }
    }

    /// Creates a row sharing an existing name table.
    #[inline]
    pub fn with_names(names: FieldNames, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    /// Builds a shared name table.
    pub fn names_of<N, S>(names: N) -> FieldNames
    where
        N: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Arc::from(names)
    }

    /// Returns the field names of this row.
    #[inline]
    pub fn names(&self) -> &FieldNames {
        &self.names
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    #[inline]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value at the given field index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Gets a value by field name.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Returns the position of a field name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Returns the number of fields in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Combines two rows into one, left fields first.
    pub fn combine(left: &Row, right: &Row) -> Row {
        let mut names = Vec::with_capacity(left.len() + right.len());
        names.extend(left.names.iter().cloned());
        names.extend(right.names.iter().cloned());

        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend(left.values.iter().cloned());
        values.extend(right.values.iter().cloned());

        Row {
            names: Arc::from(names),
            values,
        }
    }

    /// Combines a row with a null-extended right side (for outer joins).
    pub fn combine_null_right(left: &Row, right_names: &FieldNames) -> Row {
        let mut names = Vec::with_capacity(left.len() + right_names.len());
        names.extend(left.names.iter().cloned());
        names.extend(right_names.iter().cloned());

        let mut values = Vec::with_capacity(names.len());
        values.extend(left.values.iter().cloned());
        values.resize(names.len(), Value::Null);

        Row {
            names: Arc::from(names),
            values,
        }
    }

    /// Combines a null-extended left side with a row (for outer joins).
    pub fn combine_null_left(left_names: &FieldNames, right: &Row) -> Row {
        let mut names = Vec::with_capacity(left_names.len() + right.len());
        names.extend(left_names.iter().cloned());
        names.extend(right.names.iter().cloned());

        let mut values = Vec::with_capacity(names.len());
        values.resize(left_names.len(), Value::Null);
        values.extend(right.values.iter().cloned());

        Row {
            names: Arc::from(names),
            values,
        }
    }
}

impl Row {
    /// Creates a row by prefixing each of `names` with `alias.`, the naming
    /// convention used for bound sources.
    pub fn qualify(alias: &str, names: &[&str], values: Vec<Value>) -> Row {
        let qualified: Vec<String> = names
            .iter()
            .map(|n| {
                let mut q = alias.to_string();
                q.push('.');
                q.push_str(n);
                q
            })
            .collect();
        Row {
            names: Arc::from(qualified),
            values,
        }
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for Row {}

impl core::hash::Hash for Row {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        for v in &self.values {
            v.hash(state);
        }
    }
}
