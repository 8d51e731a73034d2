//! Property-based tests: join strategy equivalence and the optimizer
//! round-trip contract, over randomly generated inputs.

use proptest::prelude::*;
use rill_core::{Row, Value};
use rill_query::ast::Expr;
use rill_query::bindings::Bindings;
use rill_query::plan::{JoinKind, JoinSpec, QueryPlan, SortKey, SourceRef};
use rill_query::scheduler::{execute, ExecOptions};
use std::collections::HashMap;

/// Strategy for key columns: a narrow range forces collisions, and None
/// exercises null-key routing.
fn key_strategy() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        3 => (-5i64..5).prop_map(Some),
        1 => Just(None),
    ]
}

fn table_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Vec<Value>>> {
    prop::collection::vec((key_strategy(), -100i64..100), 0..max_rows).prop_map(|rows| {
        rows.into_iter()
            .map(|(k, v)| {
                vec![
                    k.map(Value::Int64).unwrap_or(Value::Null),
                    Value::Int64(v),
                ]
            })
            .collect()
    })
}

fn bind(left: Vec<Vec<Value>>, right: Vec<Vec<Value>>) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.bind_table("l", &["k", "v"], left);
    bindings.bind_table("r", &["k", "v"], right);
    bindings
}

fn join_plan(spec: JoinSpec) -> QueryPlan {
    QueryPlan::from_binding("l")
        .join_spec(
            "r",
            SourceRef::Binding("r".into()),
            spec,
            Some(Expr::eq(Expr::field("l", "k"), Expr::field("r", "k"))),
        )
        .select([
            (Expr::field("l", "k"), "lk"),
            (Expr::field("l", "v"), "lv"),
            (Expr::field("r", "k"), "rk"),
            (Expr::field("r", "v"), "rv"),
        ])
}

fn run_plan(plan: &QueryPlan, bindings: &Bindings, optimize: bool) -> Vec<Row> {
    execute(
        plan,
        bindings,
        ExecOptions {
            optimize,
            parallel: false,
        },
    )
    .unwrap()
    .into_vec()
    .unwrap()
}

/// Rows as a multiset keyed by their debug rendering.
fn multiset(rows: &[Row]) -> HashMap<String, usize> {
    let mut out = HashMap::new();
    for row in rows {
        *out.entry(format!("{:?}", row.values())).or_insert(0) += 1;
    }
    out
}

proptest! {
    /// Hash join and nested-loop join produce the same multiset of combined
    /// rows for any equi-join, any kind, any finite inputs.
    #[test]
    fn hash_equals_nested_loop(
        left in table_strategy(25),
        right in table_strategy(25),
        kind_pick in 0usize..4,
    ) {
        let kind = [JoinKind::Inner, JoinKind::Left, JoinKind::Right, JoinKind::Full][kind_pick];
        let bindings = bind(left, right);

        let nested = join_plan(JoinSpec::new(kind));
        let hashed = join_plan(JoinSpec::hash(kind));

        let nested_rows = run_plan(&nested, &bindings, false);
        let hashed_rows = run_plan(&hashed, &bindings, false);

        prop_assert_eq!(multiset(&nested_rows), multiset(&hashed_rows));
        // Both strategies also agree on emission order.
        prop_assert_eq!(nested_rows, hashed_rows);
    }

    /// Optimized and verbatim execution agree on the row multiset; with an
    /// orderby they agree on order too.
    #[test]
    fn optimizer_round_trip(
        left in table_strategy(20),
        right in table_strategy(20),
        threshold in -50i64..50,
    ) {
        let bindings = bind(left, right);
        let plan = QueryPlan::from_binding("l")
            .join_on(
                "r",
                JoinKind::Inner,
                Expr::eq(Expr::field("l", "k"), Expr::field("r", "k")),
            )
            .filter(Expr::and(
                Expr::gt(Expr::field("l", "v"), Expr::lit(threshold)),
                Expr::le(Expr::field("r", "v"), Expr::lit(threshold + 60)),
            ))
            .order_by([
                SortKey::asc(Expr::field("l", "v")),
                SortKey::asc(Expr::field("r", "v")),
            ])
            .select([
                (Expr::field("l", "v"), "lv"),
                (Expr::field("r", "v"), "rv"),
            ]);

        let optimized = run_plan(&plan, &bindings, true);
        let verbatim = run_plan(&plan, &bindings, false);
        prop_assert_eq!(optimized, verbatim);
    }

    /// Left outer joins preserve every left row at least once.
    #[test]
    fn left_join_preserves_left(
        left in table_strategy(20),
        right in table_strategy(20),
    ) {
        let left_count = left.len();
        let bindings = bind(left, right);
        let plan = join_plan(JoinSpec::hash(JoinKind::Left));
        let rows = run_plan(&plan, &bindings, false);
        prop_assert!(rows.len() >= left_count);
    }

    /// An inner join never invents rows: its cardinality equals the
    /// pair count computed directly.
    #[test]
    fn inner_join_count(
        left in table_strategy(20),
        right in table_strategy(20),
    ) {
        let mut expected = 0usize;
        for l in &left {
            for r in &right {
                if !l[0].is_null() && l[0] == r[0] {
                    expected += 1;
                }
            }
        }
        let bindings = bind(left, right);
        let plan = join_plan(JoinSpec::hash(JoinKind::Inner));
        let rows = run_plan(&plan, &bindings, false);
        prop_assert_eq!(rows.len(), expected);
    }

    /// Pagination yields the requested page of the ordered sequence.
    #[test]
    fn limit_yields_page(
        values in prop::collection::vec(-100i64..100, 0..40),
        offset in 0usize..10,
        size in 0usize..10,
    ) {
        let mut bindings = Bindings::new();
        bindings.bind_table(
            "t",
            &["x"],
            values.iter().map(|v| vec![Value::Int64(*v)]).collect(),
        );
        let plan = QueryPlan::from_binding("t")
            .limit_offset(offset, size)
            .select([(Expr::field("t", "x"), "x")]);

        let rows = run_plan(&plan, &bindings, true);
        let expected: Vec<i64> = values.iter().skip(offset).take(size).copied().collect();
        let actual: Vec<i64> = rows
            .iter()
            .map(|r| r.get(0).unwrap().as_i64().unwrap())
            .collect();
        prop_assert_eq!(actual, expected);
    }
}
