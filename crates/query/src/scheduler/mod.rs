//! Execution scheduler.
//!
//! Compiles a validated (and optionally optimized) plan into a chain of
//! pull-based operators over a bindings snapshot, then hands the chain to
//! the caller as a lazy [`Rows`] sequence. Evaluation progresses exactly as
//! far as the caller pulls.

pub mod pool;

use crate::ast::Expr;
use crate::bindings::{Bindings, Catalog};
use crate::eval::Env;
use crate::executor::{
    BoxedOperator, FilterOp, GroupOp, HashJoinOp, LimitOp, NestedLoopJoinOp, ProjectOp, ScanOp,
    SortOp, SubplanScanOp, WindowOp,
};
use crate::optimizer;
use crate::plan::{equi_split, validate, JoinStrategy, PlanNode, QueryPlan, SourceRef};
use crate::rows::Rows;
use hashbrown::HashSet;
use rill_core::{Error, Result, Row, Value};
use std::sync::Arc;

/// Per-query execution options.
#[derive(Clone, Copy, Debug)]
pub struct ExecOptions {
    /// Run the optimizer before compiling. Disable to execute the plan
    /// verbatim, e.g. to rule the optimizer out while debugging.
    pub optimize: bool,
    /// Evaluate partitionable stages on the shared worker pool.
    pub parallel: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            parallel: false,
        }
    }
}

/// Validates, optionally optimizes, compiles and prepares a query for lazy
/// evaluation against the given bindings.
pub fn execute(plan: &QueryPlan, bindings: &Bindings, options: ExecOptions) -> Result<Rows> {
    validate(plan)?;
    let plan = if options.optimize {
        optimizer::optimize(plan.clone())
    } else {
        plan.clone()
    };

    let catalog = Arc::new(Catalog::from_bindings(bindings));
    let env = Env::new(catalog);
    let plan = substitute_hoisted(plan, &env)?;
    let op = compile(&plan, &env, options.parallel)?;
    Ok(Rows::new(op))
}

/// Compiles and drains a nested plan, stopping after `cap` rows when given.
/// Used by scalar/exists subquery evaluation.
pub(crate) fn collect_subplan(
    plan: &QueryPlan,
    env: &Env,
    cap: Option<usize>,
) -> Result<Vec<Row>> {
    let mut op = compile(plan, env, false)?;
    let mut out = Vec::new();
    while let Some(entry) = op.next()? {
        out.push(entry.row);
        if let Some(cap) = cap {
            if out.len() >= cap {
                break;
            }
        }
    }
    Ok(out)
}

/// Evaluates subqueries the optimizer marked hoistable, once each, and
/// substitutes their scalar results into the plan.
fn substitute_hoisted(plan: QueryPlan, env: &Env) -> Result<QueryPlan> {
    plan.try_map_exprs(&mut |expr| {
        expr.try_rewrite(&mut |e| match e {
            Expr::Subquery {
                plan,
                hoisted: true,
            } => {
                let rows = collect_subplan(&plan, env, Some(2))?;
                let value = match rows.len() {
                    0 => Value::Null,
                    1 => rows[0].get(0).cloned().unwrap_or(Value::Null),
                    n => return Err(Error::too_many_values(n)),
                };
                Ok(Expr::Literal(value))
            }
            other => Ok(other),
        })
    })
}

/// Compiles a plan into its operator chain.
fn compile(plan: &QueryPlan, env: &Env, parallel: bool) -> Result<BoxedOperator> {
    let mut chain: Option<BoxedOperator> = None;
    let mut left_aliases: HashSet<String> = HashSet::new();
    let mut grouped = false;

    for node in &plan.nodes {
        match node {
            PlanNode::From {
                alias,
                source,
                filter,
            } => {
                let mut op = compile_source(alias, source, env, parallel)?;
                if let Some(f) = filter {
                    op = Box::new(FilterOp::new(op, f.clone(), env.clone()));
                }
                left_aliases.insert(alias.clone());
                chain = Some(op);
            }
            PlanNode::Join {
                alias,
                source,
                spec,
                on,
                filter,
            } => {
                let left = take_chain(&mut chain)?;
                let mut right = compile_source(alias, source, env, parallel)?;
                if let Some(f) = filter {
                    right = Box::new(FilterOp::new(right, f.clone(), env.clone()));
                }

                let op: BoxedOperator = match spec.strategy {
                    JoinStrategy::Hash => {
                        let on = on.as_ref().ok_or_else(|| {
                            Error::invalid_operation("hash join without predicate")
                        })?;
                        let (left_keys, right_keys) = equi_split(on, &left_aliases, alias)
                            .ok_or_else(|| {
                                Error::invalid_operation(
                                    "hash join predicate is not an equi-conjunction",
                                )
                            })?;
                        Box::new(HashJoinOp::new(
                            left,
                            right,
                            spec.kind,
                            left_keys,
                            right_keys,
                            env.clone(),
                            parallel,
                        ))
                    }
                    JoinStrategy::NestedLoop => Box::new(NestedLoopJoinOp::new(
                        left,
                        right,
                        spec.kind,
                        on.clone(),
                        env.clone(),
                        parallel,
                    )),
                };
                left_aliases.insert(alias.clone());
                chain = Some(op);
            }
            PlanNode::Where(predicate) => {
                let input = take_chain(&mut chain)?;
                chain = Some(Box::new(FilterOp::new(input, predicate.clone(), env.clone())));
            }
            PlanNode::GroupBy { keys } => {
                let input = take_chain(&mut chain)?;
                grouped = true;
                chain = Some(Box::new(GroupOp::new(input, keys.clone(), env.clone())));
            }
            PlanNode::Having(predicate) => {
                let input = take_chain(&mut chain)?;
                chain = Some(Box::new(FilterOp::new(input, predicate.clone(), env.clone())));
            }
            PlanNode::OrderBy { keys } => {
                let input = take_chain(&mut chain)?;
                chain = Some(Box::new(SortOp::new(input, keys.clone(), env.clone())));
            }
            PlanNode::Limit { offset, size } => {
                let input = take_chain(&mut chain)?;
                chain = Some(Box::new(LimitOp::new(input, *offset, *size)));
            }
            PlanNode::Select { items, distinct } => {
                let mut input = take_chain(&mut chain)?;
                // Aggregates without a groupby aggregate the whole input as
                // one implicit group.
                if !grouped && items.iter().any(|i| i.expr.contains_aggregate()) {
                    input = Box::new(GroupOp::new(input, Vec::new(), env.clone()));
                }
                chain = Some(Box::new(ProjectOp::new(
                    input,
                    items.clone(),
                    *distinct,
                    env.clone(),
                    parallel,
                )));
            }
            PlanNode::Window { exprs } => {
                let input = take_chain(&mut chain)?;
                chain = Some(Box::new(WindowOp::new(
                    input,
                    exprs.clone(),
                    env.clone(),
                    parallel,
                )));
            }
        }
    }

    chain.ok_or_else(|| Error::query_semantic("plan has no clauses"))
}

fn take_chain(chain: &mut Option<BoxedOperator>) -> Result<BoxedOperator> {
    chain
        .take()
        .ok_or_else(|| Error::query_semantic("plan must start with a from clause"))
}

fn compile_source(
    alias: &str,
    source: &SourceRef,
    env: &Env,
    parallel: bool,
) -> Result<BoxedOperator> {
    match source {
        SourceRef::Binding(name) => {
            let names = env.catalog.field_names(name)?.to_vec();
            let scan = env.catalog.open(name)?;
            Ok(Box::new(ScanOp::new(alias, &names, scan)))
        }
        SourceRef::Plan(nested) => {
            let inner = compile(nested, env, parallel)?;
            Ok(Box::new(SubplanScanOp::new(alias, inner)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn sample_bindings() -> Bindings {
        let mut bindings = Bindings::new();
        bindings.bind_table(
            "n",
            &["value"],
            (1..=5).map(|v| vec![Value::Int64(v)]).collect(),
        );
        bindings
    }

    #[test]
    fn test_execute_minimal() {
        let plan = QueryPlan::from_binding("n").select([(Expr::field("n", "value"), "value")]);
        let rows = execute(&plan, &sample_bindings(), ExecOptions::default()).unwrap();
        let out = rows.into_vec().unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].get_named("value"), Some(&Value::Int64(1)));
    }

    #[test]
    fn test_execute_rejects_invalid_plan() {
        let plan = QueryPlan::from_binding("n");
        let err = execute(&plan, &sample_bindings(), ExecOptions::default()).unwrap_err();
        assert!(err.is_semantic());
    }

    #[test]
    fn test_execute_unknown_binding() {
        let plan = QueryPlan::from_binding("missing")
            .select([(Expr::field("missing", "value"), "value")]);
        let err = execute(&plan, &Bindings::new(), ExecOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownBinding { .. }));
    }

    #[test]
    fn test_implicit_global_group() {
        let plan = QueryPlan::from_binding("n").select([(Expr::count_all(), "n")]);
        let rows = execute(&plan, &sample_bindings(), ExecOptions::default()).unwrap();
        let out = rows.into_vec().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_named("n"), Some(&Value::Int64(5)));
    }

    #[test]
    fn test_lazy_evaluation_stops_with_caller() {
        let plan = QueryPlan::from_binding("n")
            .limit(2)
            .select([(Expr::field("n", "value"), "value")]);
        let mut rows = execute(&plan, &sample_bindings(), ExecOptions::default()).unwrap();
        assert!(rows.next().is_some());
        assert!(rows.next().is_some());
        assert!(rows.next().is_none());
    }
}
