//! Subquery hoisting pass.
//!
//! A scalar subquery that references no enclosing alias produces the same
//! value for every row, so the scheduler can evaluate it once per query and
//! substitute the result. This pass marks such subqueries; the substitution
//! happens at execution time (the optimizer itself never evaluates).

use crate::ast::Expr;
use crate::optimizer::{map_source_plans, OptimizerPass};
use crate::plan::QueryPlan;
use hashbrown::HashSet;

pub struct SubqueryHoist;

impl OptimizerPass for SubqueryHoist {
    fn apply(&self, plan: QueryPlan) -> QueryPlan {
        let plan = map_source_plans(plan, &|p| self.apply(p));
        plan.map_exprs(&mut |e| mark(e, self))
    }

    fn name(&self) -> &'static str {
        "subquery_hoist"
    }
}

fn mark(expr: Expr, pass: &SubqueryHoist) -> Expr {
    match expr.try_rewrite(&mut |e| Ok(mark_node(e, pass))) {
        Ok(e) => e,
        Err(_) => unreachable!("infallible rewrite"),
    }
}

fn mark_node(expr: Expr, pass: &SubqueryHoist) -> Expr {
    match expr {
        Expr::Subquery { plan, .. } => {
            // Hoist nested levels first, then test this subquery itself.
            let plan = Box::new(pass.apply(*plan));
            let mut free = HashSet::new();
            let mut unqualified = false;
            plan.collect_free_aliases(&mut free, &mut unqualified);
            let hoisted = free.is_empty() && !unqualified;
            Expr::Subquery { plan, hoisted }
        }
        Expr::Exists { plan, negated } => Expr::Exists {
            plan: Box::new(pass.apply(*plan)),
            negated,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::plan::{PlanNode, QueryPlan};

    fn hoisted_flag(plan: &QueryPlan) -> Option<bool> {
        plan.nodes.iter().find_map(|n| match n {
            PlanNode::Where(Expr::BinaryOp { right, .. }) => match right.as_ref() {
                Expr::Subquery { hoisted, .. } => Some(*hoisted),
                _ => None,
            },
            _ => None,
        })
    }

    #[test]
    fn test_uncorrelated_subquery_marked() {
        let sub = QueryPlan::from_binding("o").select([(Expr::max(Expr::field("o", "amount")), "m")]);
        let plan = QueryPlan::from_binding("u")
            .filter(Expr::gt(Expr::field("u", "balance"), Expr::subquery(sub)))
            .select([(Expr::field("u", "id"), "id")]);

        let out = SubqueryHoist.apply(plan);
        assert_eq!(hoisted_flag(&out), Some(true));
    }

    #[test]
    fn test_correlated_subquery_not_marked() {
        let sub = QueryPlan::from_binding("o")
            .filter(Expr::eq(Expr::field("o", "uid"), Expr::field("u", "id")))
            .select([(Expr::max(Expr::field("o", "amount")), "m")]);
        let plan = QueryPlan::from_binding("u")
            .filter(Expr::gt(Expr::field("u", "balance"), Expr::subquery(sub)))
            .select([(Expr::field("u", "id"), "id")]);

        let out = SubqueryHoist.apply(plan);
        assert_eq!(hoisted_flag(&out), Some(false));
    }
}
