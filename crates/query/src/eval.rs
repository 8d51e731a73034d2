//! Expression evaluation.
//!
//! Evaluation follows SQL null semantics: comparisons with a null operand are
//! null, logical operators are three-valued, and a null predicate result
//! filters like false. Incompatible operand types fail with a typed error;
//! there is no implicit coercion beyond int/float numeric widening.

use crate::ast::{BinaryOp, Expr, FieldRef, UnaryOp};
use crate::bindings::Catalog;
use crate::executor::aggregate::group_aggregate;
use crate::executor::entry::Entry;
use crate::scheduler::collect_subplan;
use rill_core::{DataType, Error, Result, Row, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Evaluation environment: the source catalog plus the enclosing rows a
/// correlated subquery may reference.
#[derive(Clone)]
pub struct Env {
    pub catalog: Arc<Catalog>,
    pub outer: Option<Arc<OuterScope>>,
}

impl Env {
    /// Creates a top-level environment.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            outer: None,
        }
    }

    /// Creates the environment a subquery evaluates in: the same catalog with
    /// `entry` pushed onto the outer scope chain.
    pub fn with_outer(&self, entry: Entry) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            outer: Some(Arc::new(OuterScope {
                entry,
                parent: self.outer.clone(),
            })),
        }
    }
}

/// A link in the chain of enclosing rows visible to correlated subqueries.
pub struct OuterScope {
    pub entry: Entry,
    pub parent: Option<Arc<OuterScope>>,
}

/// Evaluates an expression against an entry.
pub fn eval(expr: &Expr, entry: &Entry, env: &Env) -> Result<Value> {
    match expr {
        Expr::Field(fref) => resolve_field(fref, entry, env),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::BinaryOp { left, op, right } => eval_binary(left, *op, right, entry, env),
        Expr::UnaryOp { op, expr } => eval_unary(*op, expr, entry, env),
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let ge = eval_binary(expr, BinaryOp::Ge, low, entry, env)?;
            let le = eval_binary(expr, BinaryOp::Le, high, entry, env)?;
            let both = logical_and(&ge, &le);
            if *negated {
                Ok(logical_not(&both))
            } else {
                Ok(both)
            }
        }
        Expr::In {
            expr,
            list,
            negated,
        } => {
            let needle = eval(expr, entry, env)?;
            let mut saw_null = needle.is_null();
            let mut found = false;
            for item in list {
                let candidate = eval(item, entry, env)?;
                if candidate.is_null() || needle.is_null() {
                    saw_null = true;
                } else if candidate == needle {
                    found = true;
                    break;
                }
            }
            let result = if found {
                Value::Boolean(true)
            } else if saw_null {
                Value::Null
            } else {
                Value::Boolean(false)
            };
            if *negated {
                Ok(logical_not(&result))
            } else {
                Ok(result)
            }
        }
        Expr::Aggregate(call) => {
            let group = entry.group.as_deref().ok_or_else(|| {
                Error::invalid_operation("aggregate expression evaluated outside a group")
            })?;
            group_aggregate(call, group, env)
        }
        Expr::Subquery { plan, .. } => {
            let sub_env = env.with_outer(entry.clone());
            let rows = collect_subplan(plan, &sub_env, Some(2))?;
            match rows.len() {
                0 => Ok(Value::Null),
                1 => Ok(rows[0].get(0).cloned().unwrap_or(Value::Null)),
                n => Err(Error::too_many_values(n)),
            }
        }
        Expr::Exists { plan, negated } => {
            let sub_env = env.with_outer(entry.clone());
            let rows = collect_subplan(plan, &sub_env, Some(1))?;
            let exists = !rows.is_empty();
            Ok(Value::Boolean(exists != *negated))
        }
    }
}

/// Interprets a predicate result: true passes, false and null filter.
/// Non-boolean results are a type error.
pub fn is_true(value: &Value) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(Error::type_mismatch(DataType::Boolean, other.data_type())),
    }
}

fn resolve_field(fref: &FieldRef, entry: &Entry, env: &Env) -> Result<Value> {
    if let Some(v) = resolve_in_row(fref, &entry.row)? {
        return Ok(v);
    }

    // Correlated reference into an enclosing query's current row.
    let mut scope = env.outer.as_deref();
    while let Some(s) = scope {
        if let Some(v) = resolve_in_row(fref, &s.entry.row)? {
            return Ok(v);
        }
        scope = s.parent.as_deref();
    }

    Err(Error::unknown_field(fref.qualified()))
}

fn resolve_in_row(fref: &FieldRef, row: &Row) -> Result<Option<Value>> {
    match &fref.source {
        Some(_) => {
            let qualified = fref.qualified();
            if let Some(v) = row.get_named(&qualified) {
                return Ok(Some(v.clone()));
            }
            // Downstream of grouping or projection, fields carry their
            // output names; a qualified reference falls back to the plain
            // field name.
            Ok(row.get_named(&fref.name).cloned())
        }
        None => {
            if let Some(v) = row.get_named(&fref.name) {
                return Ok(Some(v.clone()));
            }
            // Unqualified references match a unique `alias.name` suffix.
            let mut matched: Option<usize> = None;
            for (i, name) in row.names().iter().enumerate() {
                let suffix_match = name
                    .rsplit_once('.')
                    .map(|(_, field)| field == fref.name)
                    .unwrap_or(false);
                if suffix_match {
                    if matched.is_some() {
                        return Err(Error::invalid_operation(format!(
                            "ambiguous field reference: {}",
                            fref.name
                        )));
                    }
                    matched = Some(i);
                }
            }
            Ok(matched.and_then(|i| row.get(i).cloned()))
        }
    }
}

fn eval_binary(left: &Expr, op: BinaryOp, right: &Expr, entry: &Entry, env: &Env) -> Result<Value> {
    match op {
        BinaryOp::And => {
            let l = eval(left, entry, env)?;
            // Short-circuit: false AND x is false without evaluating x.
            if l == Value::Boolean(false) {
                return Ok(Value::Boolean(false));
            }
            let r = eval(right, entry, env)?;
            Ok(logical_and(&l, &r))
        }
        BinaryOp::Or => {
            let l = eval(left, entry, env)?;
            if l == Value::Boolean(true) {
                return Ok(Value::Boolean(true));
            }
            let r = eval(right, entry, env)?;
            Ok(logical_or(&l, &r))
        }
        _ => {
            let l = eval(left, entry, env)?;
            let r = eval(right, entry, env)?;
            match op {
                BinaryOp::Eq => Ok(null_or_bool(&l, &r, |l, r| l == r)),
                BinaryOp::Ne => Ok(null_or_bool(&l, &r, |l, r| l != r)),
                BinaryOp::Lt => compare(&l, &r, |o| o == Ordering::Less),
                BinaryOp::Le => compare(&l, &r, |o| o != Ordering::Greater),
                BinaryOp::Gt => compare(&l, &r, |o| o == Ordering::Greater),
                BinaryOp::Ge => compare(&l, &r, |o| o != Ordering::Less),
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    arithmetic(op, &l, &r)
                }
                BinaryOp::And | BinaryOp::Or => unreachable!(),
            }
        }
    }
}

fn eval_unary(op: UnaryOp, expr: &Expr, entry: &Entry, env: &Env) -> Result<Value> {
    let v = eval(expr, entry, env)?;
    match op {
        UnaryOp::Not => Ok(logical_not(&v)),
        UnaryOp::Neg => match v {
            Value::Null => Ok(Value::Null),
            Value::Int64(i) => Ok(Value::Int64(-i)),
            Value::Float64(f) => Ok(Value::Float64(-f)),
            other => Err(Error::type_mismatch(DataType::Float64, other.data_type())),
        },
        UnaryOp::IsNull => Ok(Value::Boolean(v.is_null())),
        UnaryOp::IsNotNull => Ok(Value::Boolean(!v.is_null())),
    }
}

fn null_or_bool(l: &Value, r: &Value, f: impl Fn(&Value, &Value) -> bool) -> Value {
    if l.is_null() || r.is_null() {
        Value::Null
    } else {
        Value::Boolean(f(l, r))
    }
}

/// Ordered comparison; operands must be of the same comparable class
/// (numeric with numeric, string with string, boolean with boolean).
fn compare(l: &Value, r: &Value, f: impl Fn(Ordering) -> bool) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let comparable = matches!(
        (l, r),
        (Value::Int64(_) | Value::Float64(_), Value::Int64(_) | Value::Float64(_))
            | (Value::String(_), Value::String(_))
            | (Value::Boolean(_), Value::Boolean(_))
    );
    if !comparable {
        return Err(Error::type_mismatch(
            l.data_type().unwrap_or(DataType::String),
            r.data_type(),
        ));
    }
    Ok(Value::Boolean(f(l.cmp(r))))
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    // String concatenation via +.
    if op == BinaryOp::Add {
        if let (Value::String(a), Value::String(b)) = (l, r) {
            let mut out = a.clone();
            out.push_str(b);
            return Ok(Value::String(out));
        }
    }

    match (l, r) {
        (Value::Int64(a), Value::Int64(b)) => int_arithmetic(op, *a, *b),
        (Value::Int64(_) | Value::Float64(_), Value::Int64(_) | Value::Float64(_)) => {
            let a = l.as_numeric().unwrap_or(0.0);
            let b = r.as_numeric().unwrap_or(0.0);
            let out = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => unreachable!(),
            };
            Ok(Value::Float64(out))
        }
        _ => Err(Error::type_mismatch(
            DataType::Float64,
            if l.data_type().map(|t| t.is_numeric()).unwrap_or(false) {
                r.data_type()
            } else {
                l.data_type()
            },
        )),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    match op {
        BinaryOp::Add => Ok(Value::Int64(a.wrapping_add(b))),
        BinaryOp::Sub => Ok(Value::Int64(a.wrapping_sub(b))),
        BinaryOp::Mul => Ok(Value::Int64(a.wrapping_mul(b))),
        BinaryOp::Div => {
            if b == 0 {
                Err(Error::invalid_operation("division by zero"))
            } else {
                Ok(Value::Int64(a.wrapping_div(b)))
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                Err(Error::invalid_operation("division by zero"))
            } else {
                Ok(Value::Int64(a.wrapping_rem(b)))
            }
        }
        _ => unreachable!(),
    }
}

/// Three-valued AND.
fn logical_and(l: &Value, r: &Value) -> Value {
    match (l.as_bool(), r.as_bool()) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null,
    }
}

/// Three-valued OR.
fn logical_or(l: &Value, r: &Value) -> Value {
    match (l.as_bool(), r.as_bool()) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null,
    }
}

/// Three-valued NOT.
fn logical_not(v: &Value) -> Value {
    match v.as_bool() {
        Some(b) => Value::Boolean(!b),
        None => Value::Null,
    }
}
