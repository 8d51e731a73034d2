//! Grouping and aggregate computation.

use crate::ast::{AggregateCall, AggregateFunc};
use crate::eval::{eval, Env};
use crate::executor::entry::{Entry, Group};
use crate::executor::operator::{BoxedOperator, Operator};
use crate::plan::NamedExpr;
use hashbrown::HashMap;
use libm::sqrt;
use rill_core::{DataType, Error, FieldNames, Result, Row, Value};
use std::sync::Arc;

/// Grouping operator.
///
/// Drains upstream fully on first pull (grouping needs every row of a group
/// before emission), partitions by the key expressions' values using
/// by-value equality (nulls group together), and emits one entry per group:
/// the key values as a row plus the group handle for aggregate evaluation
/// downstream. With no keys the entire input forms a single group, emitted
/// even when the input is empty.
pub struct GroupOp {
    input: BoxedOperator,
    keys: Vec<NamedExpr>,
    env: Env,
    names: FieldNames,
    groups: Option<std::vec::IntoIter<Entry>>,
}

impl GroupOp {
    pub fn new(input: BoxedOperator, keys: Vec<NamedExpr>, env: Env) -> Self {
        let names = Row::names_of(keys.iter().map(|k| k.name.clone()));
        Self {
            input,
            keys,
            env,
            names,
            groups: None,
        }
    }

    fn materialize(&mut self) -> Result<std::vec::IntoIter<Entry>> {
        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();

        while let Some(entry) = self.input.next()? {
            let mut key = Vec::with_capacity(self.keys.len());
            for k in &self.keys {
                key.push(eval(&k.expr, &entry, &self.env)?);
            }
            match index.get(&key) {
                Some(&slot) => groups[slot].1.push(entry.row),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![entry.row]));
                }
            }
        }

        // No keys: the whole input is one group, present even when empty.
        if self.keys.is_empty() && groups.is_empty() {
            groups.push((Vec::new(), Vec::new()));
        }

        let entries: Vec<Entry> = groups
            .into_iter()
            .map(|(key, rows)| {
                let row = Row::with_names(self.names.clone(), key.clone());
                Entry::grouped(row, Arc::new(Group::new(key, rows)))
            })
            .collect();
        Ok(entries.into_iter())
    }
}

impl Operator for GroupOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        if self.groups.is_none() {
            self.groups = Some(self.materialize()?);
        }
        Ok(self.groups.as_mut().and_then(|it| it.next()))
    }

    fn names(&self) -> FieldNames {
        self.names.clone()
    }
}

/// Evaluates an aggregate call against a group, caching buffering functions
/// per group so repeated references compute once.
pub fn group_aggregate(call: &AggregateCall, group: &Group, env: &Env) -> Result<Value> {
    if call.func.is_buffering() {
        let cache_key = format!("{:?}", call);
        group.cached(&cache_key, || {
            aggregate_over_rows(call, group.key(), group.rows(), env)
        })
    } else {
        aggregate_over_rows(call, group.key(), group.rows(), env)
    }
}

/// Computes an aggregate over a row slice: a full group, or a window frame.
pub fn aggregate_over_rows(
    call: &AggregateCall,
    key: &[Value],
    rows: &[Row],
    env: &Env,
) -> Result<Value> {
    if let AggregateFunc::Custom(f) = &call.func {
        let ctx = crate::executor::entry::GroupContext { key, rows };
        return (f.0)(&ctx);
    }

    // count() is the only built-in without an argument.
    let arg = match (&call.func, &call.expr) {
        (AggregateFunc::Count, None) => return Ok(Value::Int64(rows.len() as i64)),
        (_, Some(e)) => e.as_ref(),
        (func, None) => {
            return Err(Error::invalid_operation(format!(
                "{:?} aggregate requires an argument",
                func
            )))
        }
    };

    match call.func {
        AggregateFunc::Count => {
            let mut count = 0i64;
            for row in rows {
                if !eval(arg, &Entry::row(row.clone()), env)?.is_null() {
                    count += 1;
                }
            }
            Ok(Value::Int64(count))
        }
        AggregateFunc::Sum => {
            let mut int_sum = 0i64;
            let mut float_sum = 0.0f64;
            let mut all_int = true;
            for row in rows {
                match eval(arg, &Entry::row(row.clone()), env)? {
                    Value::Null => {}
                    Value::Int64(i) => {
                        int_sum = int_sum.wrapping_add(i);
                        float_sum += i as f64;
                    }
                    Value::Float64(f) => {
                        all_int = false;
                        float_sum += f;
                    }
                    other => {
                        return Err(Error::type_mismatch(DataType::Float64, other.data_type()))
                    }
                }
            }
            if all_int {
                Ok(Value::Int64(int_sum))
            } else {
                Ok(Value::Float64(float_sum))
            }
        }
        AggregateFunc::Avg => {
            let values = numeric_values(arg, rows, env)?;
            if values.is_empty() {
                Ok(Value::Null)
            } else {
                let sum: f64 = values.iter().sum();
                Ok(Value::Float64(sum / values.len() as f64))
            }
        }
        AggregateFunc::Min | AggregateFunc::Max => {
            let mut best: Option<Value> = None;
            for row in rows {
                let v = eval(arg, &Entry::row(row.clone()), env)?;
                if v.is_null() {
                    continue;
                }
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let keep_new = if call.func == AggregateFunc::Min {
                            v < b
                        } else {
                            v > b
                        };
                        if keep_new {
                            v
                        } else {
                            b
                        }
                    }
                });
            }
            Ok(best.unwrap_or(Value::Null))
        }
        AggregateFunc::Median => {
            let mut values: Vec<Value> = Vec::new();
            for row in rows {
                let v = eval(arg, &Entry::row(row.clone()), env)?;
                if v.is_null() {
                    continue;
                }
                if v.as_numeric().is_none() {
                    return Err(Error::type_mismatch(DataType::Float64, v.data_type()));
                }
                values.push(v);
            }
            if values.is_empty() {
                return Ok(Value::Null);
            }
            values.sort();
            let n = values.len();
            if n % 2 == 1 {
                Ok(values[n / 2].clone())
            } else {
                let a = values[n / 2 - 1].as_numeric().unwrap_or(0.0);
                let b = values[n / 2].as_numeric().unwrap_or(0.0);
                Ok(Value::Float64((a + b) / 2.0))
            }
        }
        AggregateFunc::StDev | AggregateFunc::StDevP | AggregateFunc::Var | AggregateFunc::VarP => {
            let values = numeric_values(arg, rows, env)?;
            let population = matches!(call.func, AggregateFunc::StDevP | AggregateFunc::VarP);
            let n = values.len();
            let divisor = if population {
                n
            } else {
                n.saturating_sub(1)
            };
            if divisor == 0 {
                return Ok(Value::Null);
            }
            let mean: f64 = values.iter().sum::<f64>() / n as f64;
            let variance: f64 = values
                .iter()
                .map(|v| (v - mean) * (v - mean))
                .sum::<f64>()
                / divisor as f64;
            match call.func {
                AggregateFunc::Var | AggregateFunc::VarP => Ok(Value::Float64(variance)),
                _ => Ok(Value::Float64(sqrt(variance))),
            }
        }
        AggregateFunc::Custom(_) => unreachable!("handled above"),
    }
}

/// Collects the non-null numeric values of `arg` over `rows`, widened to
/// f64. Non-numeric values are a type error.
fn numeric_values(arg: &crate::ast::Expr, rows: &[Row], env: &Env) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let v = eval(arg, &Entry::row(row.clone()), env)?;
        if v.is_null() {
            continue;
        }
        match v.as_numeric() {
            Some(f) => out.push(f),
            None => return Err(Error::type_mismatch(DataType::Float64, v.data_type())),
        }
    }
    Ok(out)
}
