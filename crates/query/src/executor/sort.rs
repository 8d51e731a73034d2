//! Sort operator.

use crate::ast::{NullOrder, SortOrder};
use crate::eval::{eval, Env};
use crate::executor::entry::Entry;
use crate::executor::operator::{BoxedOperator, Operator};
use crate::plan::SortKey;
use rill_core::{FieldNames, Result, Value};
use std::cmp::Ordering;

/// Full-materialization stable sort: drains upstream on first pull, sorts by
/// the listed keys in priority order, re-emits lazily.
///
/// Nulls default to last regardless of direction; `NullsFirst` overrides.
pub struct SortOp {
    input: BoxedOperator,
    keys: Vec<SortKey>,
    env: Env,
    sorted: Option<std::vec::IntoIter<Entry>>,
}

impl SortOp {
    pub fn new(input: BoxedOperator, keys: Vec<SortKey>, env: Env) -> Self {
        Self {
            input,
            keys,
            env,
            sorted: None,
        }
    }

    fn materialize(&mut self) -> Result<std::vec::IntoIter<Entry>> {
        let mut entries: Vec<(Vec<Value>, Entry)> = Vec::new();
        while let Some(entry) = self.input.next()? {
            let mut key_values = Vec::with_capacity(self.keys.len());
            for key in &self.keys {
                key_values.push(eval(&key.expr, &entry, &self.env)?);
            }
            entries.push((key_values, entry));
        }

        entries.sort_by(|a, b| compare_sort_keys(&a.0, &b.0, &self.keys));
        Ok(entries
            .into_iter()
            .map(|(_, e)| e)
            .collect::<Vec<_>>()
            .into_iter())
    }
}

impl Operator for SortOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        if self.sorted.is_none() {
            self.sorted = Some(self.materialize()?);
        }
        Ok(self.sorted.as_mut().and_then(|it| it.next()))
    }

    fn names(&self) -> FieldNames {
        self.input.names()
    }
}

/// Compares two pre-computed key-value lists under the given sort keys.
/// Null placement applies before direction: nulls sit where `nulls` says
/// regardless of asc/desc.
pub(crate) fn compare_sort_keys(a: &[Value], b: &[Value], keys: &[SortKey]) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let av = &a[i];
        let bv = &b[i];
        let ord = match (av.is_null(), bv.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match key.nulls {
                NullOrder::NullsFirst => Ordering::Less,
                NullOrder::NullsLast => Ordering::Greater,
            },
            (false, true) => match key.nulls {
                NullOrder::NullsFirst => Ordering::Greater,
                NullOrder::NullsLast => Ordering::Less,
            },
            (false, false) => {
                let cmp = av.cmp(bv);
                match key.order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::bindings::{Bindings, Catalog};
    use crate::executor::scan::ScanOp;
    use std::sync::Arc;

    fn scan_values(values: Vec<Vec<Value>>) -> (BoxedOperator, Env) {
        let mut bindings = Bindings::new();
        bindings.bind_table("t", &["x", "y"], values);
        let catalog = Arc::new(Catalog::from_bindings(&bindings));
        let op = Box::new(ScanOp::new(
            "t",
            &["x".to_string(), "y".to_string()],
            catalog.open("t").unwrap(),
        ));
        (op, Env::new(catalog))
    }

    fn collect_x(mut op: impl Operator) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(e) = op.next().unwrap() {
            out.push(e.row.get(0).unwrap().clone());
        }
        out
    }

    #[test]
    fn test_sort_asc_desc() {
        let rows = vec![
            vec![Value::Int64(3), Value::Int64(0)],
            vec![Value::Int64(1), Value::Int64(0)],
            vec![Value::Int64(2), Value::Int64(0)],
        ];

        let (op, env) = scan_values(rows.clone());
        let sort = SortOp::new(op, vec![SortKey::asc(Expr::field("t", "x"))], env);
        assert_eq!(
            collect_x(sort),
            vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]
        );

        let (op, env) = scan_values(rows);
        let sort = SortOp::new(op, vec![SortKey::desc(Expr::field("t", "x"))], env);
        assert_eq!(
            collect_x(sort),
            vec![Value::Int64(3), Value::Int64(2), Value::Int64(1)]
        );
    }

    #[test]
    fn test_nulls_last_by_default_even_desc() {
        let rows = vec![
            vec![Value::Null, Value::Int64(0)],
            vec![Value::Int64(1), Value::Int64(0)],
            vec![Value::Int64(2), Value::Int64(0)],
        ];

        let (op, env) = scan_values(rows.clone());
        let sort = SortOp::new(op, vec![SortKey::desc(Expr::field("t", "x"))], env);
        assert_eq!(
            collect_x(sort),
            vec![Value::Int64(2), Value::Int64(1), Value::Null]
        );

        let (op, env) = scan_values(rows);
        let sort = SortOp::new(
            op,
            vec![SortKey::asc(Expr::field("t", "x")).nulls_first()],
            env,
        );
        assert_eq!(
            collect_x(sort),
            vec![Value::Null, Value::Int64(1), Value::Int64(2)]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        // Equal keys keep arrival order: y disambiguates.
        let rows = vec![
            vec![Value::Int64(1), Value::Int64(10)],
            vec![Value::Int64(0), Value::Int64(20)],
            vec![Value::Int64(1), Value::Int64(30)],
        ];

        let (op, env) = scan_values(rows);
        let mut sort = SortOp::new(op, vec![SortKey::asc(Expr::field("t", "x"))], env);

        let mut ys = Vec::new();
        while let Some(e) = sort.next().unwrap() {
            ys.push(e.row.get(1).unwrap().as_i64().unwrap());
        }
        assert_eq!(ys, vec![20, 10, 30]);
    }
}
