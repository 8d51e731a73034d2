//! Data source bindings.
//!
//! A [`Bindings`] registry maps aliases to row producers: in-memory tables
//! (re-iterable) or single-pass streams. At execution time the registry is
//! snapshotted into a [`Catalog`], the shareable view operators and subquery
//! evaluation read from. Streams are moved into the catalog, so a stream
//! binding feeds exactly one execution.

use hashbrown::HashMap;
use rill_core::{Error, Result, Value};
use std::sync::{Arc, Mutex};

/// A boxed row-values iterator for stream sources.
pub type ValuesIter = Box<dyn Iterator<Item = Vec<Value>> + Send>;

enum SourceData {
    Table {
        names: Vec<String>,
        rows: Arc<Vec<Vec<Value>>>,
    },
    Stream {
        names: Vec<String>,
        iter: Mutex<Option<ValuesIter>>,
    },
}

/// Registry of data sources a query can bind.
#[derive(Default)]
pub struct Bindings {
    sources: HashMap<String, SourceData>,
}

impl Bindings {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an alias to an in-memory table. Tables are re-iterable and may
    /// feed any number of queries.
    pub fn bind_table(
        &mut self,
        alias: impl Into<String>,
        fields: &[&str],
        rows: Vec<Vec<Value>>,
    ) {
        self.sources.insert(
            alias.into(),
            SourceData::Table {
                names: fields.iter().map(|s| s.to_string()).collect(),
                rows: Arc::new(rows),
            },
        );
    }

    /// Binds an alias to a single-pass stream. The stream is consumed by the
    /// first execution that scans it; it cannot be re-iterated.
    pub fn bind_stream<I>(&mut self, alias: impl Into<String>, fields: &[&str], iter: I)
    where
        I: Iterator<Item = Vec<Value>> + Send + 'static,
    {
        self.sources.insert(
            alias.into(),
            SourceData::Stream {
                names: fields.iter().map(|s| s.to_string()).collect(),
                iter: Mutex::new(Some(Box::new(iter))),
            },
        );
    }

    /// Returns true if the alias is bound.
    pub fn contains(&self, alias: &str) -> bool {
        self.sources.contains_key(alias)
    }
}

enum CatalogData {
    Table(Arc<Vec<Vec<Value>>>),
    Stream(Mutex<Option<ValuesIter>>),
}

struct CatalogSource {
    names: Vec<String>,
    data: CatalogData,
}

/// Execution-time snapshot of a [`Bindings`] registry.
///
/// Tables are shared by `Arc`; streams are moved in (leaving the binding
/// consumed). A catalog is immutable and shareable across worker threads.
pub struct Catalog {
    sources: HashMap<String, CatalogSource>,
}

impl Catalog {
    /// Snapshots a bindings registry. Stream sources are taken out of the
    /// registry; re-snapshotting sees them as consumed.
    pub fn from_bindings(bindings: &Bindings) -> Self {
        let mut sources = HashMap::with_capacity(bindings.sources.len());
        for (alias, source) in &bindings.sources {
            let snapshot = match source {
                SourceData::Table { names, rows } => CatalogSource {
                    names: names.clone(),
                    data: CatalogData::Table(Arc::clone(rows)),
                },
                SourceData::Stream { names, iter } => {
                    let taken = iter.lock().ok().and_then(|mut slot| slot.take());
                    CatalogSource {
                        names: names.clone(),
                        data: CatalogData::Stream(Mutex::new(taken)),
                    }
                }
            };
            sources.insert(alias.clone(), snapshot);
        }
        Self { sources }
    }

    /// Returns the field names of a bound source.
    pub fn field_names(&self, alias: &str) -> Result<&[String]> {
        self.sources
            .get(alias)
            .map(|s| s.names.as_slice())
            .ok_or_else(|| Error::unknown_binding(alias))
    }

    /// Opens a source for scanning. Tables can be opened any number of
    /// times; a stream can be opened exactly once.
    pub fn open(&self, alias: &str) -> Result<ScanSource> {
        let source = self
            .sources
            .get(alias)
            .ok_or_else(|| Error::unknown_binding(alias))?;
        match &source.data {
            CatalogData::Table(rows) => Ok(ScanSource::Table {
                rows: Arc::clone(rows),
                next: 0,
            }),
            CatalogData::Stream(slot) => {
                let iter = slot
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .ok_or_else(|| {
                        Error::invalid_operation(format!(
                            "stream source {} has already been consumed",
                            alias
                        ))
                    })?;
                Ok(ScanSource::Stream(iter))
            }
        }
    }
}

/// An opened source feeding a scan operator.
pub enum ScanSource {
    Table {
        rows: Arc<Vec<Vec<Value>>>,
        next: usize,
    },
    Stream(ValuesIter),
}

impl ScanSource {
    /// Pulls the next row's values, or None at end of source.
    pub fn next_values(&mut self) -> Option<Vec<Value>> {
        match self {
            ScanSource::Table { rows, next } => {
                let values = rows.get(*next).cloned();
                if values.is_some() {
                    *next += 1;
                }
                values
            }
            ScanSource::Stream(iter) => iter.next(),
        }
    }
}

impl std::fmt::Debug for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanSource::Table { next, .. } => f
                .debug_struct("ScanSource::Table")
                .field("next", next)
                .finish_non_exhaustive(),
            ScanSource::Stream(_) => f.write_str("ScanSource::Stream(..)"),
        }
    }
}
