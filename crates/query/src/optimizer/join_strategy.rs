//! Join strategy selection pass.
//!
//! Promotes nested-loop joins whose predicate is a conjunction of
//! left/right equality comparisons to the hash strategy. Cross joins and
//! predicates the hash executor cannot key stay nested-loop.

use crate::optimizer::{map_source_plans, OptimizerPass};
use crate::plan::{equi_split, JoinKind, JoinStrategy, PlanNode, QueryPlan};
use hashbrown::HashSet;

pub struct JoinStrategySelect;

impl OptimizerPass for JoinStrategySelect {
    fn apply(&self, plan: QueryPlan) -> QueryPlan {
        let plan = map_source_plans(plan, &|p| self.apply(p));

        let mut left_aliases: HashSet<String> = HashSet::new();
        let nodes = plan
            .nodes
            .into_iter()
            .map(|node| match node {
                PlanNode::From {
                    alias,
                    source,
                    filter,
                } => {
                    left_aliases.insert(alias.clone());
                    PlanNode::From {
                        alias,
                        source,
                        filter,
                    }
                }
                PlanNode::Join {
                    alias,
                    source,
                    mut spec,
                    on,
                    filter,
                } => {
                    if spec.strategy == JoinStrategy::NestedLoop
                        && spec.kind != JoinKind::Cross
                    {
                        if let Some(on) = &on {
                            if equi_split(on, &left_aliases, &alias).is_some() {
                                spec.strategy = JoinStrategy::Hash;
                            }
                        }
                    }
                    left_aliases.insert(alias.clone());
                    PlanNode::Join {
                        alias,
                        source,
                        spec,
                        on,
                        filter,
                    }
                }
                other => other,
            })
            .collect();
        QueryPlan { nodes }
    }

    fn name(&self) -> &'static str {
        "join_strategy_select"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::plan::QueryPlan;

    fn strategy_of(plan: &QueryPlan) -> JoinStrategy {
        plan.nodes
            .iter()
            .find_map(|n| match n {
                PlanNode::Join { spec, .. } => Some(spec.strategy),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_equi_join_promoted() {
        let plan = QueryPlan::from_binding("u")
            .join_on(
                "o",
                JoinKind::Inner,
                Expr::eq(Expr::field("u", "id"), Expr::field("o", "uid")),
            )
            .select([(Expr::field("u", "id"), "id")]);

        let out = JoinStrategySelect.apply(plan);
        assert_eq!(strategy_of(&out), JoinStrategy::Hash);
    }

    #[test]
    fn test_composite_equi_join_promoted() {
        let plan = QueryPlan::from_binding("u")
            .join_on(
                "o",
                JoinKind::Left,
                Expr::and(
                    Expr::eq(Expr::field("u", "id"), Expr::field("o", "uid")),
                    Expr::eq(Expr::field("u", "region"), Expr::field("o", "region")),
                ),
            )
            .select([(Expr::field("u", "id"), "id")]);

        let out = JoinStrategySelect.apply(plan);
        assert_eq!(strategy_of(&out), JoinStrategy::Hash);
    }

    #[test]
    fn test_range_join_stays_nested_loop() {
        let plan = QueryPlan::from_binding("u")
            .join_on(
                "o",
                JoinKind::Inner,
                Expr::gt(Expr::field("u", "id"), Expr::field("o", "uid")),
            )
            .select([(Expr::field("u", "id"), "id")]);

        let out = JoinStrategySelect.apply(plan);
        assert_eq!(strategy_of(&out), JoinStrategy::NestedLoop);
    }

    #[test]
    fn test_cross_join_untouched() {
        let plan = QueryPlan::from_binding("u")
            .cross_join("o")
            .select([(Expr::field("u", "id"), "id")]);

        let out = JoinStrategySelect.apply(plan);
        assert_eq!(strategy_of(&out), JoinStrategy::NestedLoop);
    }
}
