//! Query optimizer module.
//!
//! Rule-based rewriting over validated plans. Every pass must preserve the
//! observable row multiset and ordering; callers can disable optimization
//! entirely (`ExecOptions { optimize: false }`) to run a plan verbatim.

mod join_strategy;
mod pass;
mod predicate_pushdown;
mod subquery_hoist;

pub use join_strategy::JoinStrategySelect;
pub use pass::OptimizerPass;
pub use predicate_pushdown::PredicatePushdown;
pub use subquery_hoist::SubqueryHoist;

use crate::plan::{PlanNode, QueryPlan, SourceRef};

/// Bound on fixpoint iterations; rewriting terminates regardless of rule
/// interaction.
const MAX_ROUNDS: usize = 8;

/// Query optimizer that applies rewrite passes to a fixpoint.
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizerPass>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// Creates an optimizer with the default passes, applied in this order:
    ///
    /// 1. PredicatePushdown - move single-source where conjuncts ahead of joins
    /// 2. JoinStrategySelect - promote eligible equi-joins to the hash strategy
    /// 3. SubqueryHoist - mark uncorrelated scalar subqueries for one-shot
    ///    evaluation
    pub fn new() -> Self {
        Self {
            passes: vec![
                Box::new(PredicatePushdown),
                Box::new(JoinStrategySelect),
                Box::new(SubqueryHoist),
            ],
        }
    }

    /// Creates an optimizer with custom passes.
    pub fn with_passes(passes: Vec<Box<dyn OptimizerPass>>) -> Self {
        Self { passes }
    }

    /// Rewrites a plan, applying the pass list until no pass changes the
    /// plan or the round bound is reached.
    pub fn optimize(&self, mut plan: QueryPlan) -> QueryPlan {
        for _ in 0..MAX_ROUNDS {
            let before = plan.clone();
            for pass in &self.passes {
                plan = pass.apply(plan);
            }
            if plan == before {
                break;
            }
        }
        plan
    }
}

/// Rewrites a plan with the default optimizer.
pub fn optimize(plan: QueryPlan) -> QueryPlan {
    Optimizer::new().optimize(plan)
}

/// Applies `f` to every nested source plan of `plan`'s from/join nodes.
pub(crate) fn map_source_plans(plan: QueryPlan, f: &dyn Fn(QueryPlan) -> QueryPlan) -> QueryPlan {
    let nodes = plan
        .nodes
        .into_iter()
        .map(|node| match node {
            PlanNode::From {
                alias,
                source,
                filter,
            } => PlanNode::From {
                alias,
                source: map_source(source, f),
                filter,
            },
            PlanNode::Join {
                alias,
                source,
                spec,
                on,
                filter,
            } => PlanNode::Join {
                alias,
                source: map_source(source, f),
                spec,
                on,
                filter,
            },
            other => other,
        })
        .collect();
    QueryPlan { nodes }
}

fn map_source(source: SourceRef, f: &dyn Fn(QueryPlan) -> QueryPlan) -> SourceRef {
    match source {
        SourceRef::Plan(p) => SourceRef::Plan(Box::new(f(*p))),
        named => named,
    }
}
