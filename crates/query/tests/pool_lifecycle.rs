//! Worker pool lifecycle tests.
//!
//! These run in their own test binary: shutdown is terminal and
//! process-wide, so no other test sharing the process could use parallel
//! execution afterwards.

use rill_core::{Error, Value};
use rill_query::ast::Expr;
use rill_query::bindings::Bindings;
use rill_query::plan::{JoinKind, QueryPlan};
use rill_query::scheduler::{execute, pool, ExecOptions};

fn sample_bindings() -> Bindings {
    let mut bindings = Bindings::new();
    bindings.bind_table(
        "l",
        &["k"],
        (0..10).map(|i| vec![Value::Int64(i)]).collect(),
    );
    bindings.bind_table(
        "r",
        &["k"],
        (0..10).map(|i| vec![Value::Int64(i % 5)]).collect(),
    );
    bindings
}

fn parallel_join_plan() -> QueryPlan {
    QueryPlan::from_binding("l")
        .join_on(
            "r",
            JoinKind::Inner,
            Expr::eq(Expr::field("l", "k"), Expr::field("r", "k")),
        )
        .select([(Expr::field("l", "k"), "k")])
}

#[test]
fn shutdown_is_terminal() {
    let bindings = sample_bindings();
    let options = ExecOptions {
        parallel: true,
        ..Default::default()
    };

    // Parallel execution works while the pool is alive.
    let rows = execute(&parallel_join_plan(), &bindings, options)
        .unwrap()
        .into_vec()
        .unwrap();
    assert_eq!(rows.len(), 10);

    pool::shutdown(false);
    assert!(pool::is_shut_down());

    // Parallel work after shutdown fails; there is no sequential fallback
    // and no restart.
    let err = execute(&parallel_join_plan(), &bindings, options)
        .unwrap()
        .into_vec()
        .unwrap_err();
    assert!(matches!(err, Error::PoolShutdown));

    // Sequential execution is unaffected.
    let rows = execute(&parallel_join_plan(), &bindings, ExecOptions::default())
        .unwrap()
        .into_vec()
        .unwrap();
    assert_eq!(rows.len(), 10);

    // Shutdown is idempotent, immediate or not.
    pool::shutdown(true);
    assert!(pool::is_shut_down());
}
