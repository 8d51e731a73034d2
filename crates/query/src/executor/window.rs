//! Window function evaluation.
//!
//! For each partition (rows sharing the partition-by key values, same
//! equality rule as grouping): a stable sort by the order keys, then one
//! computed value per row. Window columns are appended to the input rows in
//! declaration order.

use crate::ast::{AggregateCall, Expr, WindowFunc};
use crate::eval::{eval, Env};
use crate::executor::aggregate::aggregate_over_rows;
use crate::executor::entry::Entry;
use crate::executor::operator::{BoxedOperator, Operator};
use crate::executor::sort::compare_sort_keys;
use crate::plan::{FrameKind, FrameSpec, WindowExpr};
use crate::scheduler::pool;
use hashbrown::HashMap;
use rill_core::{DataType, Error, FieldNames, Result, Row, Value};

/// Window operator: drains upstream on first pull, computes each window
/// expression partition by partition, and re-emits rows with the window
/// columns appended.
pub struct WindowOp {
    input: BoxedOperator,
    exprs: Vec<WindowExpr>,
    env: Env,
    parallel: bool,
    names: FieldNames,
    out: Option<std::vec::IntoIter<Entry>>,
}

impl WindowOp {
    pub fn new(input: BoxedOperator, exprs: Vec<WindowExpr>, env: Env, parallel: bool) -> Self {
        let mut names: Vec<String> = input.names().iter().cloned().collect();
        names.extend(exprs.iter().map(|w| w.name.clone()));
        Self {
            input,
            exprs,
            env,
            parallel,
            names: Row::names_of(names),
            out: None,
        }
    }

    fn materialize(&mut self) -> Result<std::vec::IntoIter<Entry>> {
        let mut rows = Vec::new();
        while let Some(entry) = self.input.next()? {
            rows.push(entry.row);
        }

        // Window expressions apply in declaration order; each sees the
        // columns the previous ones appended.
        let mut names: Vec<String> = self.input.names().iter().cloned().collect();
        for w in &self.exprs {
            let column = compute_column(&rows, w, &self.env, self.parallel)?;
            names.push(w.name.clone());
            let table = Row::names_of(names.clone());
            rows = rows
                .into_iter()
                .zip(column)
                .map(|(row, value)| {
                    let mut values = row.into_values();
                    values.push(value);
                    Row::with_names(table.clone(), values)
                })
                .collect();
        }

        Ok(rows
            .into_iter()
            .map(Entry::row)
            .collect::<Vec<_>>()
            .into_iter())
    }
}

impl Operator for WindowOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        if self.out.is_none() {
            self.out = Some(self.materialize()?);
        }
        Ok(self.out.as_mut().and_then(|it| it.next()))
    }

    fn names(&self) -> FieldNames {
        self.names.clone()
    }
}

/// Computes one window column over all rows.
fn compute_column(rows: &[Row], w: &WindowExpr, env: &Env, parallel: bool) -> Result<Vec<Value>> {
    // Partition rows by the partition-by key values, preserving arrival order.
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut partitions: Vec<Vec<usize>> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let entry = Entry::row(row.clone());
        let mut key = Vec::with_capacity(w.spec.partition_by.len());
        for expr in &w.spec.partition_by {
            key.push(eval(expr, &entry, env)?);
        }
        match index.get(&key) {
            Some(&slot) => partitions[slot].push(i),
            None => {
                index.insert(key, partitions.len());
                partitions.push(vec![i]);
            }
        }
    }

    let mut column = vec![Value::Null; rows.len()];

    if parallel && partitions.len() > 1 {
        // Per-partition evaluation fans out to the shared worker pool.
        let mut tasks = Vec::with_capacity(partitions.len());
        for part in &partitions {
            let part_rows: Vec<Row> = part.iter().map(|&i| rows[i].clone()).collect();
            let w = w.clone();
            let env = env.clone();
            tasks.push(pool::submit(move || eval_partition(&part_rows, &w, &env))?);
        }
        for (part, task) in partitions.iter().zip(tasks) {
            let values = task.join()??;
            for (&row_idx, value) in part.iter().zip(values) {
                column[row_idx] = value;
            }
        }
    } else {
        for part in &partitions {
            let part_rows: Vec<Row> = part.iter().map(|&i| rows[i].clone()).collect();
            let values = eval_partition(&part_rows, w, env)?;
            for (&row_idx, value) in part.iter().zip(values) {
                column[row_idx] = value;
            }
        }
    }

    Ok(column)
}

/// Evaluates a window expression over one partition (rows in arrival order);
/// returns one value per row, aligned with the input order.
fn eval_partition(rows: &[Row], w: &WindowExpr, env: &Env) -> Result<Vec<Value>> {
    let n = rows.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    // Order keys per row, then a stable sort of row positions: ties keep
    // arrival order.
    let mut order_keys: Vec<Vec<Value>> = Vec::with_capacity(n);
    for row in rows {
        let entry = Entry::row(row.clone());
        let mut key = Vec::with_capacity(w.spec.order_by.len());
        for k in &w.spec.order_by {
            key.push(eval(&k.expr, &entry, env)?);
        }
        order_keys.push(key);
    }
    let mut sorted: Vec<usize> = (0..n).collect();
    sorted.sort_by(|&a, &b| compare_sort_keys(&order_keys[a], &order_keys[b], &w.spec.order_by));

    // Ranks over the sorted order (1-based, shared by ties).
    let mut ranks = vec![0i64; n];
    let mut dense = vec![0i64; n];
    {
        let mut rank = 0i64;
        let mut dense_rank = 0i64;
        for j in 0..n {
            let tied = j > 0 && order_keys[sorted[j]] == order_keys[sorted[j - 1]];
            if !tied {
                rank = j as i64 + 1;
                dense_rank += 1;
            }
            ranks[j] = rank;
            dense[j] = dense_rank;
        }
    }

    let mut out = vec![Value::Null; n];
    for j in 0..n {
        let orig = sorted[j];
        let value = match &w.func {
            WindowFunc::RowNumber => Value::Int64(j as i64),
            WindowFunc::Rank => Value::Int64(ranks[j]),
            WindowFunc::DenseRank => Value::Int64(dense[j]),
            WindowFunc::PercentRank => {
                if n == 1 {
                    Value::Float64(0.0)
                } else {
                    Value::Float64((ranks[j] - 1) as f64 / (n - 1) as f64)
                }
            }
            WindowFunc::CumeDist => {
                let peer_end = peer_end(j, &sorted, &order_keys);
                Value::Float64((peer_end + 1) as f64 / n as f64)
            }
            WindowFunc::Lead {
                expr,
                offset,
                default,
            } => offset_value(rows, &sorted, j, *offset, expr, default.as_deref(), env)?,
            WindowFunc::Lag {
                expr,
                offset,
                default,
            } => offset_value(rows, &sorted, j, -*offset, expr, default.as_deref(), env)?,
            WindowFunc::FirstValue(expr) => {
                match resolve_frame(j, &sorted, &order_keys, w)? {
                    Some((lo, _)) => eval_at(rows, sorted[lo], expr, env)?,
                    None => Value::Null,
                }
            }
            WindowFunc::LastValue(expr) => {
                match resolve_frame(j, &sorted, &order_keys, w)? {
                    Some((_, hi)) => eval_at(rows, sorted[hi], expr, env)?,
                    None => Value::Null,
                }
            }
            WindowFunc::NthValue { expr, n: nth } => {
                match resolve_frame(j, &sorted, &order_keys, w)? {
                    Some((lo, hi)) if lo + nth <= hi => eval_at(rows, sorted[lo + nth], expr, env)?,
                    _ => Value::Null,
                }
            }
            WindowFunc::Aggregate(call) => {
                match resolve_frame(j, &sorted, &order_keys, w)? {
                    Some((lo, hi)) => frame_aggregate(rows, &sorted[lo..=hi], call, env)?,
                    None => empty_frame_aggregate(call, env)?,
                }
            }
        };
        out[orig] = value;
    }
    Ok(out)
}

fn eval_at(rows: &[Row], idx: usize, expr: &Expr, env: &Env) -> Result<Value> {
    eval(expr, &Entry::row(rows[idx].clone()), env)
}

/// Last sorted position whose order key equals position `j`'s.
fn peer_end(j: usize, sorted: &[usize], order_keys: &[Vec<Value>]) -> usize {
    let mut end = j;
    while end + 1 < sorted.len() && order_keys[sorted[end + 1]] == order_keys[sorted[j]] {
        end += 1;
    }
    end
}

/// First sorted position whose order key equals position `j`'s.
fn peer_start(j: usize, sorted: &[usize], order_keys: &[Vec<Value>]) -> usize {
    let mut start = j;
    while start > 0 && order_keys[sorted[start - 1]] == order_keys[sorted[j]] {
        start -= 1;
    }
    start
}

/// lead/lag: physical offset within the sorted partition, frame-independent.
fn offset_value(
    rows: &[Row],
    sorted: &[usize],
    j: usize,
    offset: i64,
    expr: &Expr,
    default: Option<&Expr>,
    env: &Env,
) -> Result<Value> {
    let target = j as i64 + offset;
    if target >= 0 && (target as usize) < sorted.len() {
        eval_at(rows, sorted[target as usize], expr, env)
    } else {
        match default {
            Some(d) => eval_at(rows, sorted[j], d, env),
            None => Ok(Value::Null),
        }
    }
}

/// Resolves the frame for sorted position `j` as inclusive sorted-position
/// bounds; None is an empty frame.
///
/// Without an explicit frame: partition start through the current row's last
/// peer when an order is present, the whole partition otherwise.
fn resolve_frame(
    j: usize,
    sorted: &[usize],
    order_keys: &[Vec<Value>],
    w: &WindowExpr,
) -> Result<Option<(usize, usize)>> {
    let n = sorted.len();
    let frame = match &w.spec.frame {
        None => {
            return Ok(Some(if w.spec.order_by.is_empty() {
                (0, n - 1)
            } else {
                (0, peer_end(j, sorted, order_keys))
            }));
        }
        Some(f) => f,
    };

    match frame.kind {
        FrameKind::Rows => Ok(rows_frame(j, n, frame)),
        FrameKind::Range => range_frame(j, sorted, order_keys, w, frame),
    }
}

fn rows_frame(j: usize, n: usize, frame: &FrameSpec) -> Option<(usize, usize)> {
    let lo = match frame.lower {
        None => 0i64,
        Some(d) => j as i64 + d,
    };
    let hi = match frame.upper {
        None => n as i64 - 1,
        Some(d) => j as i64 + d,
    };
    let lo = lo.max(0);
    let hi = hi.min(n as i64 - 1);
    if lo > hi || hi < 0 || lo >= n as i64 {
        None
    } else {
        Some((lo as usize, hi as usize))
    }
}

/// Range frames measure order-key value distance. The single order key must
/// be numeric; a null-keyed current row's frame is its null peer group.
fn range_frame(
    j: usize,
    sorted: &[usize],
    order_keys: &[Vec<Value>],
    w: &WindowExpr,
    frame: &FrameSpec,
) -> Result<Option<(usize, usize)>> {
    let current = &order_keys[sorted[j]][0];
    if current.is_null() {
        return Ok(Some((
            peer_start(j, sorted, order_keys),
            peer_end(j, sorted, order_keys),
        )));
    }
    let current = current
        .as_numeric()
        .ok_or_else(|| Error::type_mismatch(DataType::Float64, order_keys[sorted[j]][0].data_type()))?;

    let descending = matches!(w.spec.order_by[0].order, crate::ast::SortOrder::Desc);

    let mut lo: Option<usize> = None;
    let mut hi: Option<usize> = None;
    for (pos, &orig) in sorted.iter().enumerate() {
        let key = match order_keys[orig][0].as_numeric() {
            Some(k) => k,
            None => continue,
        };
        // Signed distance along the sort direction.
        let distance = if descending {
            current - key
        } else {
            key - current
        };
        let after_lower = match frame.lower {
            None => true,
            Some(d) => distance >= d as f64,
        };
        let before_upper = match frame.upper {
            None => true,
            Some(d) => distance <= d as f64,
        };
        if after_lower && before_upper {
            if lo.is_none() {
                lo = Some(pos);
            }
            hi = Some(pos);
        }
    }
    Ok(lo.zip(hi))
}

fn frame_aggregate(
    rows: &[Row],
    frame_positions: &[usize],
    call: &AggregateCall,
    env: &Env,
) -> Result<Value> {
    let frame_rows: Vec<Row> = frame_positions.iter().map(|&i| rows[i].clone()).collect();
    aggregate_over_rows(call, &[], &frame_rows, env)
}

fn empty_frame_aggregate(call: &AggregateCall, env: &Env) -> Result<Value> {
    aggregate_over_rows(call, &[], &[], env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, SortOrder};
    use crate::bindings::{Bindings, Catalog};
    use crate::plan::{SortKey, WindowSpec};
    use std::sync::Arc;

    fn env() -> Env {
        Env::new(Arc::new(Catalog::from_bindings(&Bindings::new())))
    }

    fn rows_of(values: &[(i64, i64)]) -> Vec<Row> {
        values
            .iter()
            .map(|(p, v)| {
                Row::new(["p", "v"], vec![Value::Int64(*p), Value::Int64(*v)])
            })
            .collect()
    }

    fn ordered_spec() -> WindowSpec {
        WindowSpec::new().order_by([SortKey::asc(Expr::named("v"))])
    }

    fn run(rows: &[Row], func: WindowFunc, spec: WindowSpec) -> Vec<Value> {
        let w = WindowExpr::new(func, spec, "w");
        eval_partition(rows, &w, &env()).unwrap()
    }

    #[test]
    fn test_row_number_zero_based() {
        let rows = rows_of(&[(1, 30), (1, 10), (1, 20)]);
        let out = run(&rows, WindowFunc::RowNumber, ordered_spec());
        // Arrival order values: 30 is sorted last, 10 first, 20 second.
        assert_eq!(out, vec![Value::Int64(2), Value::Int64(0), Value::Int64(1)]);
    }

    #[test]
    fn test_rank_gaps_and_dense_rank() {
        let rows = rows_of(&[(1, 10), (1, 20), (1, 20), (1, 30)]);
        let ranks = run(&rows, WindowFunc::Rank, ordered_spec());
        assert_eq!(
            ranks,
            vec![Value::Int64(1), Value::Int64(2), Value::Int64(2), Value::Int64(4)]
        );

        let dense = run(&rows, WindowFunc::DenseRank, ordered_spec());
        assert_eq!(
            dense,
            vec![Value::Int64(1), Value::Int64(2), Value::Int64(2), Value::Int64(3)]
        );
    }

    #[test]
    fn test_percent_rank_and_cume_dist() {
        let rows = rows_of(&[(1, 10), (1, 20), (1, 20), (1, 30)]);
        let pr = run(&rows, WindowFunc::PercentRank, ordered_spec());
        assert_eq!(
            pr,
            vec![
                Value::Float64(0.0),
                Value::Float64(1.0 / 3.0),
                Value::Float64(1.0 / 3.0),
                Value::Float64(1.0),
            ]
        );

        let cd = run(&rows, WindowFunc::CumeDist, ordered_spec());
        assert_eq!(
            cd,
            vec![
                Value::Float64(0.25),
                Value::Float64(0.75),
                Value::Float64(0.75),
                Value::Float64(1.0),
            ]
        );

        let single = rows_of(&[(1, 10)]);
        let pr = run(&single, WindowFunc::PercentRank, ordered_spec());
        assert_eq!(pr, vec![Value::Float64(0.0)]);
    }

    #[test]
    fn test_lead_lag() {
        let rows = rows_of(&[(1, 10), (1, 20), (1, 30)]);
        let lead = run(&rows, WindowFunc::lead(Expr::named("v")), ordered_spec());
        assert_eq!(lead, vec![Value::Int64(20), Value::Int64(30), Value::Null]);

        let lag = run(&rows, WindowFunc::lag(Expr::named("v")), ordered_spec());
        assert_eq!(lag, vec![Value::Null, Value::Int64(10), Value::Int64(20)]);

        let lag2 = run(
            &rows,
            WindowFunc::lag_with(Expr::named("v"), 2, Expr::lit(-1i64)),
            ordered_spec(),
        );
        assert_eq!(lag2, vec![Value::Int64(-1), Value::Int64(-1), Value::Int64(10)]);
    }

    #[test]
    fn test_first_last_nth_value_default_frame() {
        let rows = rows_of(&[(1, 10), (1, 20), (1, 30)]);

        let first = run(&rows, WindowFunc::first_value(Expr::named("v")), ordered_spec());
        assert_eq!(first, vec![Value::Int64(10); 3]);

        // Default frame runs to the current row, so last_value is the
        // current row's value.
        let last = run(&rows, WindowFunc::last_value(Expr::named("v")), ordered_spec());
        assert_eq!(last, vec![Value::Int64(10), Value::Int64(20), Value::Int64(30)]);

        let nth = run(
            &rows,
            WindowFunc::nth_value(Expr::named("v"), 1),
            ordered_spec(),
        );
        assert_eq!(nth, vec![Value::Null, Value::Int64(20), Value::Int64(20)]);
    }

    #[test]
    fn test_running_sum_rows_frame() {
        let rows = rows_of(&[(1, 10), (1, 20), (1, 30)]);
        let spec = ordered_spec().frame(FrameSpec::rows(None, Some(0)));
        let sums = run(
            &rows,
            WindowFunc::aggregate(Expr::sum(Expr::named("v"))),
            spec,
        );
        assert_eq!(sums, vec![Value::Int64(10), Value::Int64(30), Value::Int64(60)]);
    }

    #[test]
    fn test_sliding_rows_frame() {
        let rows = rows_of(&[(1, 1), (1, 2), (1, 3), (1, 4)]);
        // One preceding through one following.
        let spec = ordered_spec().frame(FrameSpec::rows(Some(-1), Some(1)));
        let sums = run(
            &rows,
            WindowFunc::aggregate(Expr::sum(Expr::named("v"))),
            spec,
        );
        assert_eq!(
            sums,
            vec![Value::Int64(3), Value::Int64(6), Value::Int64(9), Value::Int64(7)]
        );
    }

    #[test]
    fn test_range_frame() {
        let rows = rows_of(&[(1, 10), (1, 11), (1, 20)]);
        // Values within 1 of the current value.
        let spec = ordered_spec().frame(FrameSpec::range(Some(-1), Some(1)));
        let counts = run(&rows, WindowFunc::aggregate(Expr::count_all()), spec);
        assert_eq!(counts, vec![Value::Int64(2), Value::Int64(2), Value::Int64(1)]);
    }

    #[test]
    fn test_range_frame_descending() {
        let rows = rows_of(&[(1, 10), (1, 11), (1, 20)]);
        let spec = WindowSpec::new()
            .order_by([SortKey {
                expr: Expr::named("v"),
                order: SortOrder::Desc,
                nulls: Default::default(),
            }])
            .frame(FrameSpec::range(None, Some(0)));
        // Running count along descending order.
        let counts = run(&rows, WindowFunc::aggregate(Expr::count_all()), spec);
        assert_eq!(counts, vec![Value::Int64(3), Value::Int64(2), Value::Int64(1)]);
    }

    #[test]
    fn test_partitioned_column() {
        let rows = rows_of(&[(1, 10), (2, 5), (1, 20), (2, 15)]);
        let w = WindowExpr::new(
            WindowFunc::RowNumber,
            WindowSpec::new()
                .partition_by([Expr::named("p")])
                .order_by([SortKey::asc(Expr::named("v"))]),
            "rn",
        );
        let column = compute_column(&rows, &w, &env(), false).unwrap();
        assert_eq!(
            column,
            vec![Value::Int64(0), Value::Int64(0), Value::Int64(1), Value::Int64(1)]
        );
    }

    #[test]
    fn test_empty_rows_frame_aggregate() {
        let rows = rows_of(&[(1, 1), (1, 2)]);
        // Frame entirely before the partition for the first row.
        let spec = ordered_spec().frame(FrameSpec::rows(Some(-2), Some(-1)));
        let counts = run(&rows, WindowFunc::aggregate(Expr::count_all()), spec);
        assert_eq!(counts, vec![Value::Int64(0), Value::Int64(1)]);
    }
}
