//! Predicate pushdown pass.
//!
//! Splits `where` conjunctions and attaches conjuncts that reference a
//! single binding to that binding's source filter, so they run before any
//! join touches the rows.
//!
//! Outer joins restrict what may move:
//! - a conjunct on the from-side can only move past inner/left/cross joins
//!   (a right/full join would null-extend from-side fields after the fact);
//! - a conjunct on a joined binding can move into that join only when the
//!   join is inner/cross or right-preserving for that side, and no later
//!   join null-extends it.

use crate::ast::Expr;
use crate::optimizer::{map_source_plans, OptimizerPass};
use crate::plan::{JoinKind, PlanNode, QueryPlan};

pub struct PredicatePushdown;

impl OptimizerPass for PredicatePushdown {
    fn apply(&self, plan: QueryPlan) -> QueryPlan {
        let plan = map_source_plans(plan, &|p| self.apply(p));
        self.push(plan)
    }

    fn name(&self) -> &'static str {
        "predicate_pushdown"
    }
}

/// Join kinds a from-side conjunct may move past.
fn passable_for_left(kind: JoinKind) -> bool {
    matches!(kind, JoinKind::Inner | JoinKind::Left | JoinKind::Cross)
}

/// Join kinds whose own (right) side accepts a pushed conjunct.
fn accepts_right_push(kind: JoinKind) -> bool {
    matches!(kind, JoinKind::Inner | JoinKind::Right | JoinKind::Cross)
}

impl PredicatePushdown {
    fn push(&self, plan: QueryPlan) -> QueryPlan {
        let mut conjuncts: Vec<Expr> = Vec::new();
        let mut kept: Vec<PlanNode> = Vec::new();
        for node in plan.nodes {
            match node {
                PlanNode::Where(e) => conjuncts.extend(e.split_conjuncts()),
                other => kept.push(other),
            }
        }
        if conjuncts.is_empty() {
            return QueryPlan { nodes: kept };
        }

        // Join layout: (position in kept, alias, kind), in clause order.
        let from_alias = kept.iter().find_map(|n| match n {
            PlanNode::From { alias, .. } => Some(alias.clone()),
            _ => None,
        });
        let joins: Vec<(usize, String, JoinKind)> = kept
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                PlanNode::Join { alias, spec, .. } => Some((i, alias.clone(), spec.kind)),
                _ => None,
            })
            .collect();

        let mut residual: Vec<Expr> = Vec::new();
        for conjunct in conjuncts {
            let aliases = match conjunct.aliases() {
                Some(a) if a.len() == 1 => a,
                // Multi-source or opaque conjuncts stay where they were.
                _ => {
                    residual.push(conjunct);
                    continue;
                }
            };
            let alias = match aliases.iter().next() {
                Some(a) => a.clone(),
                None => {
                    residual.push(conjunct);
                    continue;
                }
            };

            if Some(&alias) == from_alias.as_ref() {
                if joins.iter().all(|(_, _, kind)| passable_for_left(*kind)) {
                    attach_filter(&mut kept, 0, conjunct);
                } else {
                    residual.push(conjunct);
                }
                continue;
            }

            match joins.iter().position(|(_, a, _)| *a == alias) {
                Some(join_idx) => {
                    let (node_pos, _, kind) = joins[join_idx];
                    let later_ok = joins[join_idx + 1..]
                        .iter()
                        .all(|(_, _, k)| passable_for_left(*k));
                    if accepts_right_push(kind) && later_ok {
                        attach_filter(&mut kept, node_pos, conjunct);
                    } else {
                        residual.push(conjunct);
                    }
                }
                None => residual.push(conjunct),
            }
        }

        if let Some(residual) = Expr::conjoin(residual) {
            // Residual filter sits directly after the last binding node,
            // which is where the original where clause was valid.
            let insert_at = kept
                .iter()
                .rposition(|n| matches!(n, PlanNode::From { .. } | PlanNode::Join { .. }))
                .map(|i| i + 1)
                .unwrap_or(0);
            kept.insert(insert_at, PlanNode::Where(residual));
        }

        QueryPlan { nodes: kept }
    }
}

fn attach_filter(nodes: &mut [PlanNode], position: usize, conjunct: Expr) {
    // Position 0 addresses the from node; join positions address themselves.
    let target = if position == 0 {
        nodes.iter_mut().find(|n| matches!(n, PlanNode::From { .. }))
    } else {
        nodes.get_mut(position)
    };
    if let Some(PlanNode::From { filter, .. } | PlanNode::Join { filter, .. }) = target {
        *filter = Some(match filter.take() {
            Some(existing) => Expr::and(existing, conjunct),
            None => conjunct,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::plan::{JoinKind, QueryPlan};

    fn users_orders(kind: JoinKind) -> QueryPlan {
        QueryPlan::from_binding("u").join_on(
            "o",
            kind,
            Expr::eq(Expr::field("u", "id"), Expr::field("o", "uid")),
        )
    }

    fn from_filter(plan: &QueryPlan) -> Option<&Expr> {
        plan.nodes.iter().find_map(|n| match n {
            PlanNode::From { filter, .. } => filter.as_ref(),
            _ => None,
        })
    }

    fn join_filter(plan: &QueryPlan) -> Option<&Expr> {
        plan.nodes.iter().find_map(|n| match n {
            PlanNode::Join { filter, .. } => filter.as_ref(),
            _ => None,
        })
    }

    fn where_node(plan: &QueryPlan) -> Option<&Expr> {
        plan.nodes.iter().find_map(|n| match n {
            PlanNode::Where(e) => Some(e),
            _ => None,
        })
    }

    #[test]
    fn test_push_from_side_conjunct() {
        let plan = users_orders(JoinKind::Inner)
            .filter(Expr::gt(Expr::field("u", "age"), Expr::lit(18i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        assert!(from_filter(&pushed).is_some());
        assert!(where_node(&pushed).is_none());
    }

    #[test]
    fn test_push_join_side_conjunct() {
        let plan = users_orders(JoinKind::Inner)
            .filter(Expr::gt(Expr::field("o", "amount"), Expr::lit(100i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        assert!(join_filter(&pushed).is_some());
        assert!(where_node(&pushed).is_none());
    }

    #[test]
    fn test_split_mixed_conjunction() {
        let plan = users_orders(JoinKind::Inner)
            .filter(Expr::and(
                Expr::gt(Expr::field("u", "age"), Expr::lit(18i64)),
                Expr::gt(Expr::field("u", "balance"), Expr::field("o", "amount")),
            ))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        // Single-source conjunct moved; cross-source conjunct stayed.
        assert!(from_filter(&pushed).is_some());
        assert!(where_node(&pushed).is_some());
    }

    #[test]
    fn test_left_join_blocks_right_side_push() {
        let plan = users_orders(JoinKind::Left)
            .filter(Expr::gt(Expr::field("o", "amount"), Expr::lit(100i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        assert!(join_filter(&pushed).is_none());
        assert!(where_node(&pushed).is_some());
    }

    #[test]
    fn test_right_join_blocks_from_side_push() {
        let plan = users_orders(JoinKind::Right)
            .filter(Expr::gt(Expr::field("u", "age"), Expr::lit(18i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        assert!(from_filter(&pushed).is_none());
        assert!(where_node(&pushed).is_some());
    }

    #[test]
    fn test_right_join_accepts_right_side_push() {
        let plan = users_orders(JoinKind::Right)
            .filter(Expr::gt(Expr::field("o", "amount"), Expr::lit(100i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        assert!(join_filter(&pushed).is_some());
    }

    #[test]
    fn test_unqualified_conjunct_stays() {
        let plan = users_orders(JoinKind::Inner)
            .filter(Expr::gt(Expr::named("age"), Expr::lit(18i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let pushed = PredicatePushdown.apply(plan);
        assert!(from_filter(&pushed).is_none());
        assert!(where_node(&pushed).is_some());
    }

    #[test]
    fn test_idempotent() {
        let plan = users_orders(JoinKind::Inner)
            .filter(Expr::gt(Expr::field("u", "age"), Expr::lit(18i64)))
            .select([(Expr::field("u", "id"), "id")]);

        let once = PredicatePushdown.apply(plan);
        let twice = PredicatePushdown.apply(once.clone());
        assert_eq!(once, twice);
    }
}
