//! Plan validation.
//!
//! Validation is a pure function over a plan: it never mutates the tree and
//! has no side effects. Every structural error it can raise is a
//! `QuerySemantic` error; evaluation never raises those.

use crate::ast::Expr;
use crate::plan::{equi_split, FrameKind, JoinKind, JoinStrategy, NamedExpr, PlanNode, QueryPlan, SourceRef};
use hashbrown::HashSet;
use rill_core::{Error, Result};

/// Validates a query plan, recursing into nested and subquery plans.
pub fn validate(plan: &QueryPlan) -> Result<()> {
    if plan.nodes.is_empty() {
        return Err(Error::query_semantic("plan has no clauses"));
    }

    check_clause_order(plan)?;
    check_sources(plan)?;
    check_joins(plan)?;
    check_grouping(plan)?;
    check_windows(plan)?;

    // Recurse into nested plans: sources and subquery expressions.
    for node in &plan.nodes {
        match node {
            PlanNode::From { source, .. } | PlanNode::Join { source, .. } => {
                if let SourceRef::Plan(p) = source {
                    validate(p)?;
                }
            }
            _ => {}
        }
    }

    let mut nested_err = None;
    plan.for_each_expr(&mut |e| {
        if nested_err.is_none() {
            if let Err(err) = validate_subqueries(e) {
                nested_err = Some(err);
            }
        }
    });
    match nested_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn validate_subqueries(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Subquery { plan, .. } | Expr::Exists { plan, .. } => validate(plan),
        Expr::BinaryOp { left, right, .. } => {
            validate_subqueries(left)?;
            validate_subqueries(right)
        }
        Expr::UnaryOp { expr, .. } => validate_subqueries(expr),
        Expr::Between {
            expr, low, high, ..
        } => {
            validate_subqueries(expr)?;
            validate_subqueries(low)?;
            validate_subqueries(high)
        }
        Expr::In { expr, list, .. } => {
            validate_subqueries(expr)?;
            for item in list {
                validate_subqueries(item)?;
            }
            Ok(())
        }
        Expr::Aggregate(call) => match &call.expr {
            Some(e) => validate_subqueries(e),
            None => Ok(()),
        },
        Expr::Field(_) | Expr::Literal(_) => Ok(()),
    }
}

fn check_clause_order(plan: &QueryPlan) -> Result<()> {
    let mut prev_rank = 0u8;
    let mut prev_keyword = "";

    for (i, node) in plan.nodes.iter().enumerate() {
        let rank = node.rank();
        if i == 0 {
            if !matches!(node, PlanNode::From { .. }) {
                return Err(Error::query_semantic(format!(
                    "plan must start with a from clause, found {}",
                    node.keyword()
                )));
            }
        } else {
            if matches!(node, PlanNode::From { .. }) {
                return Err(Error::query_semantic("plan has more than one from clause"));
            }
            if rank < prev_rank {
                return Err(Error::query_semantic(format!(
                    "clause order violated: {} after {}",
                    node.keyword(),
                    prev_keyword
                )));
            }
        }
        prev_rank = rank;
        prev_keyword = node.keyword();
    }

    // Repeatable clauses are join and where only.
    for keyword in ["groupby", "having", "orderby", "limit", "select", "window"] {
        let count = plan
            .nodes
            .iter()
            .filter(|n| n.keyword() == keyword)
            .count();
        if count > 1 {
            return Err(Error::query_semantic(format!(
                "plan has {} {} clauses, at most one allowed",
                count, keyword
            )));
        }
    }

    if plan.select_node().is_none() {
        return Err(Error::query_semantic("plan has no select clause"));
    }

    let has_group = plan.nodes.iter().any(|n| matches!(n, PlanNode::GroupBy { .. }));
    let has_having = plan.nodes.iter().any(|n| matches!(n, PlanNode::Having(_)));
    if has_having && !has_group {
        return Err(Error::query_semantic("having clause requires a groupby clause"));
    }

    Ok(())
}

fn check_sources(plan: &QueryPlan) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for node in &plan.nodes {
        if let PlanNode::From { alias, .. } | PlanNode::Join { alias, .. } = node {
            if !seen.insert(alias.as_str()) {
                return Err(Error::query_semantic(format!(
                    "alias {} bound more than once",
                    alias
                )));
            }
        }
    }
    Ok(())
}

fn check_joins(plan: &QueryPlan) -> Result<()> {
    let mut left_aliases: HashSet<String> = HashSet::new();

    for node in &plan.nodes {
        match node {
            PlanNode::From { alias, .. } => {
                left_aliases.insert(alias.clone());
            }
            PlanNode::Join {
                alias, spec, on, ..
            } => {
                match spec.kind {
                    JoinKind::Cross => {
                        if on.is_some() {
                            return Err(Error::query_semantic(
                                "cross join must not carry a predicate",
                            ));
                        }
                        if spec.strategy == JoinStrategy::Hash {
                            return Err(Error::query_semantic(
                                "cross join cannot use the hash strategy",
                            ));
                        }
                    }
                    _ => {
                        let on = on.as_ref().ok_or_else(|| {
                            Error::query_semantic(format!(
                                "{:?} join on {} has no predicate",
                                spec.kind, alias
                            ))
                        })?;
                        if spec.strategy == JoinStrategy::Hash
                            && equi_split(on, &left_aliases, alias).is_none()
                        {
                            return Err(Error::query_semantic(format!(
                                "hash strategy requested for join on {} but the predicate \
                                 is not a conjunction of left/right equality comparisons",
                                alias
                            )));
                        }
                    }
                }
                left_aliases.insert(alias.clone());
            }
            _ => {}
        }
    }
    Ok(())
}

/// With a GroupBy present, every non-aggregate select expression must appear
/// in the group keys.
fn check_grouping(plan: &QueryPlan) -> Result<()> {
    let keys: Option<&Vec<NamedExpr>> = plan.nodes.iter().find_map(|n| match n {
        PlanNode::GroupBy { keys } => Some(keys),
        _ => None,
    });
    let keys = match keys {
        Some(k) => k,
        None => return Ok(()),
    };
    let (items, _) = match plan.select_node() {
        Some(s) => s,
        None => return Ok(()),
    };

    for item in items {
        if !covered_by_keys(&item.expr, keys) {
            return Err(Error::query_semantic(format!(
                "select item {} is neither aggregated nor listed in groupby",
                item.name
            )));
        }
    }
    Ok(())
}

fn covered_by_keys(expr: &Expr, keys: &[NamedExpr]) -> bool {
    if keys.iter().any(|k| k.expr == *expr) {
        return true;
    }
    match expr {
        Expr::Literal(_) | Expr::Aggregate(_) => true,
        // A reference to a key's output name is a reference to the key.
        Expr::Field(f) => f.source.is_none() && keys.iter().any(|k| k.name == f.name),
        Expr::BinaryOp { left, right, .. } => {
            covered_by_keys(left, keys) && covered_by_keys(right, keys)
        }
        Expr::UnaryOp { expr, .. } => covered_by_keys(expr, keys),
        Expr::Between {
            expr, low, high, ..
        } => {
            covered_by_keys(expr, keys) && covered_by_keys(low, keys) && covered_by_keys(high, keys)
        }
        Expr::In { expr, list, .. } => {
            covered_by_keys(expr, keys) && list.iter().all(|e| covered_by_keys(e, keys))
        }
        // Subqueries are self-contained at this level.
        Expr::Subquery { .. } | Expr::Exists { .. } => true,
    }
}

fn check_windows(plan: &QueryPlan) -> Result<()> {
    for node in &plan.nodes {
        if let PlanNode::Window { exprs } = node {
            for w in exprs {
                if let Some(frame) = &w.spec.frame {
                    if frame.kind == FrameKind::Range && w.spec.order_by.len() != 1 {
                        return Err(Error::query_semantic(format!(
                            "window {} uses a range frame, which requires exactly one \
                             order key",
                            w.name
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, WindowFunc};
    use crate::plan::{FrameSpec, JoinSpec, SortKey, WindowSpec, WindowExpr};

    fn select_x(plan: QueryPlan) -> QueryPlan {
        plan.select([(Expr::field("t", "x"), "x")])
    }

    #[test]
    fn test_valid_minimal_plan() {
        let plan = select_x(QueryPlan::from_binding("t"));
        assert!(validate(&plan).is_ok());
    }

    #[test]
    fn test_empty_plan_rejected() {
        let plan = QueryPlan::default();
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_missing_select_rejected() {
        let plan = QueryPlan::from_binding("t");
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_clause_order_violation() {
        let mut plan = select_x(QueryPlan::from_binding("t"));
        // Where after Select.
        plan.nodes
            .push(PlanNode::Where(Expr::gt(Expr::field("t", "x"), Expr::lit(0i64))));
        let err = validate(&plan).unwrap_err();
        assert!(err.is_semantic());
    }

    #[test]
    fn test_double_from_rejected() {
        let mut plan = select_x(QueryPlan::from_binding("t"));
        plan.nodes.insert(
            1,
            PlanNode::From {
                alias: "u".into(),
                source: SourceRef::Binding("u".into()),
                filter: None,
            },
        );
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let plan = QueryPlan::from_binding("t")
            .join_on(
                "t",
                JoinKind::Inner,
                Expr::eq(Expr::field("t", "x"), Expr::field("t", "x")),
            )
            .select([(Expr::field("t", "x"), "x")]);
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_hash_join_requires_equi_predicate() {
        let plan = QueryPlan::from_binding("a")
            .join_spec(
                "b",
                SourceRef::Binding("b".into()),
                JoinSpec::hash(JoinKind::Inner),
                Some(Expr::gt(Expr::field("a", "x"), Expr::field("b", "y"))),
            )
            .select([(Expr::field("a", "x"), "x")]);
        let err = validate(&plan).unwrap_err();
        assert!(err.is_semantic());

        let ok = QueryPlan::from_binding("a")
            .join_spec(
                "b",
                SourceRef::Binding("b".into()),
                JoinSpec::hash(JoinKind::Inner),
                Some(Expr::eq(Expr::field("a", "x"), Expr::field("b", "y"))),
            )
            .select([(Expr::field("a", "x"), "x")]);
        assert!(validate(&ok).is_ok());
    }

    #[test]
    fn test_cross_join_with_predicate_rejected() {
        let plan = QueryPlan::from_binding("a")
            .join_spec(
                "b",
                SourceRef::Binding("b".into()),
                JoinSpec::new(JoinKind::Cross),
                Some(Expr::eq(Expr::field("a", "x"), Expr::field("b", "y"))),
            )
            .select([(Expr::field("a", "x"), "x")]);
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_group_coverage() {
        // x is grouped; selecting x and count() is fine.
        let ok = QueryPlan::from_binding("t")
            .group_by([(Expr::field("t", "x"), "x")])
            .select([
                (Expr::field("t", "x"), "x"),
                (Expr::count_all(), "n"),
            ]);
        assert!(validate(&ok).is_ok());

        // y is neither grouped nor aggregated.
        let bad = QueryPlan::from_binding("t")
            .group_by([(Expr::field("t", "x"), "x")])
            .select([(Expr::field("t", "y"), "y")]);
        let err = validate(&bad).unwrap_err();
        assert!(err.is_semantic());
    }

    #[test]
    fn test_group_coverage_by_key_name() {
        let ok = QueryPlan::from_binding("t")
            .group_by([(Expr::field("t", "x"), "x")])
            .select([(Expr::named("x"), "x")]);
        assert!(validate(&ok).is_ok());
    }

    #[test]
    fn test_having_requires_group() {
        let plan = QueryPlan::from_binding("t")
            .having(Expr::gt(Expr::count_all(), Expr::lit(1i64)))
            .select([(Expr::count_all(), "n")]);
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_range_frame_needs_single_order_key() {
        let bad = select_x(QueryPlan::from_binding("t")).window([WindowExpr::new(
            WindowFunc::aggregate(Expr::sum(Expr::named("x"))),
            WindowSpec::new().frame(FrameSpec::range(None, Some(0))),
            "running",
        )]);
        assert!(validate(&bad).is_err());

        let ok = select_x(QueryPlan::from_binding("t")).window([WindowExpr::new(
            WindowFunc::aggregate(Expr::sum(Expr::named("x"))),
            WindowSpec::new()
                .order_by([SortKey::asc(Expr::named("x"))])
                .frame(FrameSpec::range(None, Some(0))),
            "running",
        )]);
        assert!(validate(&ok).is_ok());
    }

    #[test]
    fn test_nested_subquery_validated() {
        let bad_inner = QueryPlan::from_binding("o"); // no select
        let plan = QueryPlan::from_binding("t")
            .filter(Expr::exists(bad_inner))
            .select([(Expr::field("t", "x"), "x")]);
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let plan = select_x(QueryPlan::from_binding("t"));
        let snapshot = plan.clone();
        let _ = validate(&plan);
        assert_eq!(plan, snapshot);
    }
}
