//! Query plan model.
//!
//! A [`QueryPlan`] is the ordered list of clause nodes the engine receives
//! from a front-end: `From`, zero or more `Join`s, then optional `Where`,
//! `GroupBy`, `Having`, `OrderBy`, `Limit`, the mandatory `Select`, and an
//! optional trailing `Window`. Clause order is a hard invariant checked by
//! [`validate`](crate::plan::validate); the clauses are not commutative.

mod validate;

pub use validate::validate;

use crate::ast::{Expr, NullOrder, SortOrder, WindowFunc};
use hashbrown::HashSet;

/// The source a `From` or `Join` binds: a named binding supplied by the
/// caller, or the result of a nested plan.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceRef {
    /// A binding looked up by name at execution time.
    Binding(String),
    /// A nested query whose result rows feed this binding.
    Plan(Box<QueryPlan>),
}

/// Join kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// Join execution strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinStrategy {
    /// Scan the buffered right side once per left row; works for any
    /// predicate shape.
    #[default]
    NestedLoop,
    /// Build a multi-map on one side, probe with the other; requires an
    /// equi-conjunction predicate.
    Hash,
}

/// Join specification: kind plus execution strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub strategy: JoinStrategy,
}

impl JoinSpec {
    /// Creates a join spec with the default nested-loop strategy.
    pub fn new(kind: JoinKind) -> Self {
        Self {
            kind,
            strategy: JoinStrategy::NestedLoop,
        }
    }

    /// Creates a hash-strategy join spec.
    pub fn hash(kind: JoinKind) -> Self {
        Self {
            kind,
            strategy: JoinStrategy::Hash,
        }
    }
}

/// An expression paired with its output field name.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedExpr {
    pub expr: Expr,
    pub name: String,
}

impl NamedExpr {
    pub fn new(expr: Expr, name: impl Into<String>) -> Self {
        Self {
            expr,
            name: name.into(),
        }
    }
}

impl<S: Into<String>> From<(Expr, S)> for NamedExpr {
    fn from((expr, name): (Expr, S)) -> Self {
        NamedExpr::new(expr, name)
    }
}

/// A sort key: expression, direction, and null placement.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub order: SortOrder,
    pub nulls: NullOrder,
}

impl SortKey {
    /// Creates an ascending sort key with the default nulls-last placement.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            order: SortOrder::Asc,
            nulls: NullOrder::NullsLast,
        }
    }

    /// Creates a descending sort key with the default nulls-last placement.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            order: SortOrder::Desc,
            nulls: NullOrder::NullsLast,
        }
    }

    /// Overrides null placement to nulls-first.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = NullOrder::NullsFirst;
        self
    }
}

/// Window frame kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Bounds count physical row offsets from the current row.
    Rows,
    /// Bounds count order-key value distance from the current row's key.
    Range,
}

/// Window frame bounds. `None` means unbounded; `0` is the current row;
/// negative offsets precede it and positive offsets follow it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSpec {
    pub kind: FrameKind,
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl FrameSpec {
    pub fn rows(lower: Option<i64>, upper: Option<i64>) -> Self {
        Self {
            kind: FrameKind::Rows,
            lower,
            upper,
        }
    }

    pub fn range(lower: Option<i64>, upper: Option<i64>) -> Self {
        Self {
            kind: FrameKind::Range,
            lower,
            upper,
        }
    }
}

/// Window specification: partitioning, ordering, and an optional frame.
///
/// Without an explicit frame, functions that have an order see the partition
/// start through the current row; functions without an order see the whole
/// partition.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<SortKey>,
    pub frame: Option<FrameSpec>,
}

impl WindowSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_by<I: IntoIterator<Item = Expr>>(mut self, exprs: I) -> Self {
        self.partition_by = exprs.into_iter().collect();
        self
    }

    pub fn order_by<I: IntoIterator<Item = SortKey>>(mut self, keys: I) -> Self {
        self.order_by = keys.into_iter().collect();
        self
    }

    pub fn frame(mut self, frame: FrameSpec) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// A window function call with its spec and output field name.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowExpr {
    pub func: WindowFunc,
    pub spec: WindowSpec,
    pub name: String,
}

impl WindowExpr {
    pub fn new(func: WindowFunc, spec: WindowSpec, name: impl Into<String>) -> Self {
        Self {
            func,
            spec,
            name: name.into(),
        }
    }
}

/// A single clause of a query plan.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanNode {
    /// The driving data source binding.
    From {
        alias: String,
        source: SourceRef,
        /// Source-local predicate, populated by predicate pushdown.
        filter: Option<Expr>,
    },
    /// An additional binding combined with the rows so far.
    Join {
        alias: String,
        source: SourceRef,
        spec: JoinSpec,
        /// Join predicate; None only for cross joins.
        on: Option<Expr>,
        /// Source-local predicate, populated by predicate pushdown.
        filter: Option<Expr>,
    },
    /// Row filter.
    Where(Expr),
    /// Grouping keys; downstream clauses see one row per group.
    GroupBy { keys: Vec<NamedExpr> },
    /// Filter over completed groups.
    Having(Expr),
    /// Full-materialization stable sort.
    OrderBy { keys: Vec<SortKey> },
    /// Lazy pagination.
    Limit { offset: usize, size: usize },
    /// Projection.
    Select {
        items: Vec<NamedExpr>,
        distinct: bool,
    },
    /// Window function columns appended to the projected rows.
    Window { exprs: Vec<WindowExpr> },
}

impl PlanNode {
    /// Canonical clause rank; plans must be non-decreasing in this rank.
    pub fn rank(&self) -> u8 {
        match self {
            PlanNode::From { .. } => 0,
            PlanNode::Join { .. } => 1,
            PlanNode::Where(_) => 2,
            PlanNode::GroupBy { .. } => 3,
            PlanNode::Having(_) => 4,
            PlanNode::OrderBy { .. } => 5,
            PlanNode::Limit { .. } => 6,
            PlanNode::Select { .. } => 7,
            PlanNode::Window { .. } => 8,
        }
    }

    /// The clause keyword, for diagnostics.
    pub fn keyword(&self) -> &'static str {
        match self {
            PlanNode::From { .. } => "from",
            PlanNode::Join { .. } => "join",
            PlanNode::Where(_) => "where",
            PlanNode::GroupBy { .. } => "groupby",
            PlanNode::Having(_) => "having",
            PlanNode::OrderBy { .. } => "orderby",
            PlanNode::Limit { .. } => "limit",
            PlanNode::Select { .. } => "select",
            PlanNode::Window { .. } => "window",
        }
    }
}

/// A complete query: an ordered sequence of clause nodes.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct QueryPlan {
    pub nodes: Vec<PlanNode>,
}

impl QueryPlan {
    /// Starts a plan from a named binding, aliased by the same name.
    pub fn from_binding(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        let source = SourceRef::Binding(alias.clone());
        Self::from_source(alias, source)
    }

    /// Starts a plan from an explicit source.
    pub fn from_source(alias: impl Into<String>, source: SourceRef) -> Self {
        Self {
            nodes: vec![PlanNode::From {
                alias: alias.into(),
                source,
                filter: None,
            }],
        }
    }

    /// Starts a plan whose source is another plan's result.
    pub fn from_plan(alias: impl Into<String>, plan: QueryPlan) -> Self {
        Self::from_source(alias, SourceRef::Plan(Box::new(plan)))
    }

    /// Adds a join against a named binding.
    pub fn join_on(mut self, alias: impl Into<String>, kind: JoinKind, on: Expr) -> Self {
        let alias = alias.into();
        self.nodes.push(PlanNode::Join {
            source: SourceRef::Binding(alias.clone()),
            alias,
            spec: JoinSpec::new(kind),
            on: Some(on),
            filter: None,
        });
        self
    }

    /// Adds a cross join against a named binding.
    pub fn cross_join(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.nodes.push(PlanNode::Join {
            source: SourceRef::Binding(alias.clone()),
            alias,
            spec: JoinSpec::new(JoinKind::Cross),
            on: None,
            filter: None,
        });
        self
    }

    /// Adds a join with an explicit source and spec.
    pub fn join_spec(
        mut self,
        alias: impl Into<String>,
        source: SourceRef,
        spec: JoinSpec,
        on: Option<Expr>,
    ) -> Self {
        self.nodes.push(PlanNode::Join {
            alias: alias.into(),
            source,
            spec,
            on,
            filter: None,
        });
        self
    }

    /// Adds a Where clause.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.nodes.push(PlanNode::Where(predicate));
        self
    }

    /// Adds a GroupBy clause.
    pub fn group_by<I, N>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NamedExpr>,
    {
        self.nodes.push(PlanNode::GroupBy {
            keys: keys.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds a Having clause.
    pub fn having(mut self, predicate: Expr) -> Self {
        self.nodes.push(PlanNode::Having(predicate));
        self
    }

    /// Adds an OrderBy clause.
    pub fn order_by<I: IntoIterator<Item = SortKey>>(mut self, keys: I) -> Self {
        self.nodes.push(PlanNode::OrderBy {
            keys: keys.into_iter().collect(),
        });
        self
    }

    /// Adds a Limit clause with offset 0.
    pub fn limit(self, size: usize) -> Self {
        self.limit_offset(0, size)
    }

    /// Adds a Limit clause with an explicit offset.
    pub fn limit_offset(mut self, offset: usize, size: usize) -> Self {
        self.nodes.push(PlanNode::Limit { offset, size });
        self
    }

    /// Adds the Select clause.
    pub fn select<I, N>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NamedExpr>,
    {
        self.nodes.push(PlanNode::Select {
            items: items.into_iter().map(Into::into).collect(),
            distinct: false,
        });
        self
    }

    /// Adds a distinct Select clause.
    pub fn select_distinct<I, N>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NamedExpr>,
    {
        self.nodes.push(PlanNode::Select {
            items: items.into_iter().map(Into::into).collect(),
            distinct: true,
        });
        self
    }

    /// Adds a Window clause.
    pub fn window<I: IntoIterator<Item = WindowExpr>>(mut self, exprs: I) -> Self {
        self.nodes.push(PlanNode::Window {
            exprs: exprs.into_iter().collect(),
        });
        self
    }

    /// Returns the aliases bound by this plan's From and Join nodes.
    pub fn bound_aliases(&self) -> HashSet<String> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                PlanNode::From { alias, .. } | PlanNode::Join { alias, .. } => Some(alias.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the Select node, if present.
    pub fn select_node(&self) -> Option<(&Vec<NamedExpr>, bool)> {
        self.nodes.iter().find_map(|n| match n {
            PlanNode::Select { items, distinct } => Some((items, *distinct)),
            _ => None,
        })
    }

    /// Visits every expression appearing directly in this plan's nodes.
    pub fn for_each_expr<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        for node in &self.nodes {
            match node {
                PlanNode::From { filter, .. } => {
                    if let Some(e) = filter {
                        f(e);
                    }
                }
                PlanNode::Join { on, filter, .. } => {
                    if let Some(e) = on {
                        f(e);
                    }
                    if let Some(e) = filter {
                        f(e);
                    }
                }
                PlanNode::Where(e) | PlanNode::Having(e) => f(e),
                PlanNode::GroupBy { keys } => {
                    for k in keys {
                        f(&k.expr);
                    }
                }
                PlanNode::OrderBy { keys } => {
                    for k in keys {
                        f(&k.expr);
                    }
                }
                PlanNode::Limit { .. } => {}
                PlanNode::Select { items, .. } => {
                    for item in items {
                        f(&item.expr);
                    }
                }
                PlanNode::Window { exprs } => {
                    for w in exprs {
                        for p in &w.spec.partition_by {
                            f(p);
                        }
                        for k in &w.spec.order_by {
                            f(&k.expr);
                        }
                        match &w.func {
                            WindowFunc::Lead { expr, default, .. }
                            | WindowFunc::Lag { expr, default, .. } => {
                                f(expr);
                                if let Some(d) = default {
                                    f(d);
                                }
                            }
                            WindowFunc::FirstValue(expr)
                            | WindowFunc::LastValue(expr)
                            | WindowFunc::NthValue { expr, .. } => f(expr),
                            WindowFunc::Aggregate(call) => {
                                if let Some(e) = &call.expr {
                                    f(e);
                                }
                            }
                            WindowFunc::RowNumber
                            | WindowFunc::Rank
                            | WindowFunc::DenseRank
                            | WindowFunc::PercentRank
                            | WindowFunc::CumeDist => {}
                        }
                    }
                }
            }
        }
    }

    /// Rebuilds the plan, passing every node-level expression through `f`.
    /// `f` is responsible for its own recursion into expression trees.
    pub fn try_map_exprs(
        self,
        f: &mut dyn FnMut(Expr) -> rill_core::Result<Expr>,
    ) -> rill_core::Result<QueryPlan> {
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| -> rill_core::Result<PlanNode> {
                Ok(match node {
                    PlanNode::From {
                        alias,
                        source,
                        filter,
                    } => PlanNode::From {
                        alias,
                        source,
                        filter: filter.map(&mut *f).transpose()?,
                    },
                    PlanNode::Join {
                        alias,
                        source,
                        spec,
                        on,
                        filter,
                    } => PlanNode::Join {
                        alias,
                        source,
                        spec,
                        on: on.map(&mut *f).transpose()?,
                        filter: filter.map(&mut *f).transpose()?,
                    },
                    PlanNode::Where(e) => PlanNode::Where(f(e)?),
                    PlanNode::Having(e) => PlanNode::Having(f(e)?),
                    PlanNode::GroupBy { keys } => PlanNode::GroupBy {
                        keys: keys
                            .into_iter()
                            .map(|k| {
                                Ok(NamedExpr {
                                    expr: f(k.expr)?,
                                    name: k.name,
                                })
                            })
                            .collect::<rill_core::Result<Vec<_>>>()?,
                    },
                    PlanNode::OrderBy { keys } => PlanNode::OrderBy {
                        keys: keys
                            .into_iter()
                            .map(|k| {
                                Ok(SortKey {
                                    expr: f(k.expr)?,
                                    order: k.order,
                                    nulls: k.nulls,
                                })
                            })
                            .collect::<rill_core::Result<Vec<_>>>()?,
                    },
                    PlanNode::Limit { offset, size } => PlanNode::Limit { offset, size },
                    PlanNode::Select { items, distinct } => PlanNode::Select {
                        items: items
                            .into_iter()
                            .map(|i| {
                                Ok(NamedExpr {
                                    expr: f(i.expr)?,
                                    name: i.name,
                                })
                            })
                            .collect::<rill_core::Result<Vec<_>>>()?,
                        distinct,
                    },
                    PlanNode::Window { exprs } => PlanNode::Window {
                        exprs: exprs
                            .into_iter()
                            .map(|w| {
                                Ok(WindowExpr {
                                    func: map_window_func(w.func, f)?,
                                    spec: WindowSpec {
                                        partition_by: w
                                            .spec
                                            .partition_by
                                            .into_iter()
                                            .map(&mut *f)
                                            .collect::<rill_core::Result<Vec<_>>>()?,
                                        order_by: w
                                            .spec
                                            .order_by
                                            .into_iter()
                                            .map(|k| {
                                                Ok(SortKey {
                                                    expr: f(k.expr)?,
                                                    order: k.order,
                                                    nulls: k.nulls,
                                                })
                                            })
                                            .collect::<rill_core::Result<Vec<_>>>()?,
                                        frame: w.spec.frame,
                                    },
                                    name: w.name,
                                })
                            })
                            .collect::<rill_core::Result<Vec<_>>>()?,
                    },
                })
            })
            .collect::<rill_core::Result<Vec<_>>>()?;
        Ok(QueryPlan { nodes })
    }

    /// Infallible variant of [`QueryPlan::try_map_exprs`].
    pub fn map_exprs(self, f: &mut dyn FnMut(Expr) -> Expr) -> QueryPlan {
        match self.try_map_exprs(&mut |e| Ok(f(e))) {
            Ok(plan) => plan,
            Err(_) => unreachable!("infallible expression mapping"),
        }
    }

    /// Collects aliases referenced by this plan that it does not bind itself
    /// (free references, i.e. correlation with an enclosing query).
    pub fn collect_free_aliases(&self, out: &mut HashSet<String>, unqualified: &mut bool) {
        let bound = self.bound_aliases();
        let mut referenced = HashSet::new();

        self.for_each_expr(&mut |e| {
            e.collect_aliases(&mut referenced, unqualified);
        });

        // Nested source plans contribute their own free aliases.
        for node in &self.nodes {
            match node {
                PlanNode::From { source, .. } | PlanNode::Join { source, .. } => {
                    if let SourceRef::Plan(p) = source {
                        p.collect_free_aliases(&mut referenced, unqualified);
                    }
                }
                _ => {}
            }
        }

        for alias in referenced {
            if !bound.contains(&alias) {
                out.insert(alias);
            }
        }
    }

    /// Renders the plan one clause per line, for optimizer inspection.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                PlanNode::From {
                    alias,
                    source,
                    filter,
                } => {
                    out.push_str(&format!("from {} = {}", alias, source_label(source)));
                    if let Some(f) = filter {
                        out.push_str(&format!(" [filter: {:?}]", f));
                    }
                }
                PlanNode::Join {
                    alias,
                    source,
                    spec,
                    on,
                    filter,
                } => {
                    out.push_str(&format!(
                        "{:?} join ({:?}) {} = {}",
                        spec.kind,
                        spec.strategy,
                        alias,
                        source_label(source)
                    ));
                    if let Some(on) = on {
                        out.push_str(&format!(" on {:?}", on));
                    }
                    if let Some(f) = filter {
                        out.push_str(&format!(" [filter: {:?}]", f));
                    }
                }
                PlanNode::Where(e) => out.push_str(&format!("where {:?}", e)),
                PlanNode::GroupBy { keys } => {
                    out.push_str(&format!(
                        "groupby {}",
                        keys.iter()
                            .map(|k| k.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                PlanNode::Having(e) => out.push_str(&format!("having {:?}", e)),
                PlanNode::OrderBy { keys } => {
                    out.push_str(&format!("orderby ({} keys)", keys.len()))
                }
                PlanNode::Limit { offset, size } => {
                    out.push_str(&format!("limit {} offset {}", size, offset))
                }
                PlanNode::Select { items, distinct } => {
                    out.push_str(&format!(
                        "select{} {}",
                        if *distinct { " distinct" } else { "" },
                        items
                            .iter()
                            .map(|i| i.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                PlanNode::Window { exprs } => {
                    out.push_str(&format!("window ({} exprs)", exprs.len()))
                }
            }
            out.push('\n');
        }
        out
    }
}

fn map_window_func(
    func: WindowFunc,
    f: &mut dyn FnMut(Expr) -> rill_core::Result<Expr>,
) -> rill_core::Result<WindowFunc> {
    use crate::ast::AggregateCall;
    Ok(match func {
        WindowFunc::Lead {
            expr,
            offset,
            default,
        } => WindowFunc::Lead {
            expr: Box::new(f(*expr)?),
            offset,
            default: match default {
                Some(d) => Some(Box::new(f(*d)?)),
                None => None,
            },
        },
        WindowFunc::Lag {
            expr,
            offset,
            default,
        } => WindowFunc::Lag {
            expr: Box::new(f(*expr)?),
            offset,
            default: match default {
                Some(d) => Some(Box::new(f(*d)?)),
                None => None,
            },
        },
        WindowFunc::FirstValue(e) => WindowFunc::FirstValue(Box::new(f(*e)?)),
        WindowFunc::LastValue(e) => WindowFunc::LastValue(Box::new(f(*e)?)),
        WindowFunc::NthValue { expr, n } => WindowFunc::NthValue {
            expr: Box::new(f(*expr)?),
            n,
        },
        WindowFunc::Aggregate(call) => WindowFunc::Aggregate(AggregateCall {
            func: call.func,
            expr: match call.expr {
                Some(e) => Some(Box::new(f(*e)?)),
                None => None,
            },
        }),
        ranking @ (WindowFunc::RowNumber
        | WindowFunc::Rank
        | WindowFunc::DenseRank
        | WindowFunc::PercentRank
        | WindowFunc::CumeDist) => ranking,
    })
}

fn source_label(source: &SourceRef) -> String {
    match source {
        SourceRef::Binding(name) => name.clone(),
        SourceRef::Plan(_) => "(subquery)".into(),
    }
}

/// Splits a join predicate into composite equi-join keys.
///
/// Succeeds when the predicate is a conjunction of equality comparisons, each
/// between an expression referencing only `left_aliases` and one referencing
/// only `right_alias`. Returns the paired key expressions (left keys, right
/// keys); sides may appear in either order in the predicate.
pub fn equi_split(
    on: &Expr,
    left_aliases: &HashSet<String>,
    right_alias: &str,
) -> Option<(Vec<Expr>, Vec<Expr>)> {
    let conjuncts = on.clone().split_conjuncts();
    let mut left_keys = Vec::with_capacity(conjuncts.len());
    let mut right_keys = Vec::with_capacity(conjuncts.len());

    for conjunct in conjuncts {
        let (l, r) = match conjunct {
            Expr::BinaryOp {
                left,
                op: crate::ast::BinaryOp::Eq,
                right,
            } => (*left, *right),
            _ => return None,
        };

        let l_aliases = l.aliases()?;
        let r_aliases = r.aliases()?;

        let l_is_left = !l_aliases.is_empty() && l_aliases.iter().all(|a| left_aliases.contains(a));
        let l_is_right = l_aliases.iter().all(|a| a == right_alias) && !l_aliases.is_empty();
        let r_is_left = !r_aliases.is_empty() && r_aliases.iter().all(|a| left_aliases.contains(a));
        let r_is_right = r_aliases.iter().all(|a| a == right_alias) && !r_aliases.is_empty();

        if l_is_left && r_is_right {
            left_keys.push(l);
            right_keys.push(r);
        } else if l_is_right && r_is_left {
            left_keys.push(r);
            right_keys.push(l);
        } else {
            return None;
        }
    }

    Some((left_keys, right_keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn aliases(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_builders() {
        let plan = QueryPlan::from_binding("u")
            .join_on(
                "o",
                JoinKind::Inner,
                Expr::eq(Expr::field("u", "id"), Expr::field("o", "user_id")),
            )
            .filter(Expr::gt(Expr::field("o", "amount"), Expr::lit(100i64)))
            .select([(Expr::field("u", "name"), "name")]);

        assert_eq!(plan.nodes.len(), 4);
        assert!(matches!(plan.nodes[0], PlanNode::From { .. }));
        assert!(matches!(plan.nodes[3], PlanNode::Select { .. }));
    }

    #[test]
    fn test_bound_aliases() {
        let plan = QueryPlan::from_binding("u").cross_join("o");
        let bound = plan.bound_aliases();
        assert!(bound.contains("u"));
        assert!(bound.contains("o"));
    }

    #[test]
    fn test_equi_split_simple() {
        let on = Expr::eq(Expr::field("u", "id"), Expr::field("o", "user_id"));
        let (l, r) = equi_split(&on, &aliases(&["u"]), "o").unwrap();
        assert_eq!(l, vec![Expr::field("u", "id")]);
        assert_eq!(r, vec![Expr::field("o", "user_id")]);
    }

    #[test]
    fn test_equi_split_swapped_and_composite() {
        let on = Expr::and(
            Expr::eq(Expr::field("o", "user_id"), Expr::field("u", "id")),
            Expr::eq(Expr::field("u", "region"), Expr::field("o", "region")),
        );
        let (l, r) = equi_split(&on, &aliases(&["u"]), "o").unwrap();
        assert_eq!(l.len(), 2);
        assert_eq!(l[0], Expr::field("u", "id"));
        assert_eq!(r[1], Expr::field("o", "region"));
    }

    #[test]
    fn test_equi_split_rejects_non_equi() {
        let on = Expr::gt(Expr::field("u", "id"), Expr::field("o", "user_id"));
        assert!(equi_split(&on, &aliases(&["u"]), "o").is_none());

        let mixed = Expr::and(
            Expr::eq(Expr::field("u", "id"), Expr::field("o", "user_id")),
            Expr::gt(Expr::field("u", "age"), Expr::lit(18i64)),
        );
        assert!(equi_split(&mixed, &aliases(&["u"]), "o").is_none());
    }

    #[test]
    fn test_equi_split_rejects_literal_side() {
        let on = Expr::eq(Expr::field("u", "id"), Expr::lit(1i64));
        assert!(equi_split(&on, &aliases(&["u"]), "o").is_none());
    }

    #[test]
    fn test_collect_free_aliases() {
        // Inner plan referencing an outer alias "u".
        let inner = QueryPlan::from_binding("o")
            .filter(Expr::eq(Expr::field("o", "user_id"), Expr::field("u", "id")))
            .select([(Expr::field("o", "amount"), "amount")]);

        let mut free = HashSet::new();
        let mut unqualified = false;
        inner.collect_free_aliases(&mut free, &mut unqualified);
        assert!(free.contains("u"));
        assert!(!free.contains("o"));
    }

    #[test]
    fn test_explain() {
        let plan = QueryPlan::from_binding("t").select([(Expr::field("t", "x"), "x")]);
        let text = plan.explain();
        assert!(text.contains("from t"));
        assert!(text.contains("select x"));
    }
}
