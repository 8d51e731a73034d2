//! Source scan operators.

use crate::bindings::ScanSource;
use crate::executor::entry::Entry;
use crate::executor::operator::{BoxedOperator, Operator};
use rill_core::{Error, FieldNames, Result, Row};

/// Scans a bound source, emitting rows with alias-qualified field names.
pub struct ScanOp {
    names: FieldNames,
    source: ScanSource,
}

impl ScanOp {
    /// Creates a scan over an opened source; field names become
    /// `alias.field`.
    pub fn new(alias: &str, field_names: &[String], source: ScanSource) -> Self {
        let qualified: Vec<String> = field_names
            .iter()
            .map(|n| format!("{}.{}", alias, n))
            .collect();
        Self {
            names: Row::names_of(qualified),
            source,
        }
    }
}

impl Operator for ScanOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        match self.source.next_values() {
            Some(values) => {
                if values.len() != self.names.len() {
                    return Err(Error::invalid_operation(format!(
                        "source row has {} values, schema has {} fields",
                        values.len(),
                        self.names.len()
                    )));
                }
                Ok(Some(Entry::row(Row::with_names(self.names.clone(), values))))
            }
            None => Ok(None),
        }
    }

    fn names(&self) -> FieldNames {
        self.names.clone()
    }
}

/// Scans the result of a nested plan, re-qualifying its output fields under
/// the binding alias.
pub struct SubplanScanOp {
    names: FieldNames,
    inner: BoxedOperator,
}

impl SubplanScanOp {
    pub fn new(alias: &str, inner: BoxedOperator) -> Self {
        let qualified: Vec<String> = inner
            .names()
            .iter()
            .map(|n| format!("{}.{}", alias, n))
            .collect();
        Self {
            names: Row::names_of(qualified),
            inner,
        }
    }
}

impl Operator for SubplanScanOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        match self.inner.next()? {
            Some(entry) => Ok(Some(Entry::row(Row::with_names(
                self.names.clone(),
                entry.row.into_values(),
            )))),
            None => Ok(None),
        }
    }

    fn names(&self) -> FieldNames {
        self.names.clone()
    }
}
