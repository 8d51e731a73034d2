//! Expression AST definitions.

use crate::executor::entry::GroupContext;
use crate::plan::QueryPlan;
use hashbrown::HashSet;
use rill_core::{Result, Value};
use std::sync::Arc;

/// Reference to a field of a bound source.
///
/// `source` is the binding alias; a `None` source matches any field whose
/// unqualified name is unique in the current row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Binding alias, if qualified.
    pub source: Option<String>,
    /// Field name.
    pub name: String,
}

impl FieldRef {
    /// Creates a qualified field reference.
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            name: name.into(),
        }
    }

    /// Creates an unqualified field reference.
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            source: None,
            name: name.into(),
        }
    }

    /// Returns the qualified name (`source.name`) when a source is present.
    pub fn qualified(&self) -> String {
        match &self.source {
            Some(s) => format!("{}.{}", s, self.name),
            None => self.name.clone(),
        }
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Placement of null keys in a sort, independent of direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NullOrder {
    #[default]
    NullsLast,
    NullsFirst,
}

/// A caller-supplied aggregation function operating on the full group.
#[derive(Clone)]
pub struct UserAgg(pub Arc<dyn Fn(&GroupContext<'_>) -> Result<Value> + Send + Sync>);

impl core::fmt::Debug for UserAgg {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("UserAgg(..)")
    }
}

impl PartialEq for UserAgg {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Aggregate functions.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Median,
    StDev,
    StDevP,
    Var,
    VarP,
    /// Caller-supplied aggregation over the whole group.
    Custom(UserAgg),
}

impl AggregateFunc {
    /// Returns true if this function must retain all group values before
    /// computing (as opposed to a streaming accumulator).
    pub fn is_buffering(&self) -> bool {
        matches!(
            self,
            AggregateFunc::Median
                | AggregateFunc::StDev
                | AggregateFunc::StDevP
                | AggregateFunc::Var
                | AggregateFunc::VarP
        )
    }
}

/// An aggregate function call.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    /// Argument expression; None for `count()`.
    pub expr: Option<Box<Expr>>,
}

/// Expression AST node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Field reference.
    Field(FieldRef),
    /// Literal value.
    Literal(Value),
    /// Binary operation.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation.
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    /// BETWEEN range test.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// IN list membership test.
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// Aggregate function call (valid inside grouped evaluation).
    Aggregate(AggregateCall),
    /// Scalar subquery: must yield at most one row.
    Subquery {
        plan: Box<QueryPlan>,
        /// Set by the optimizer when the subquery references no outer alias
        /// and can be evaluated once per query.
        hoisted: bool,
    },
    /// EXISTS subquery test.
    Exists { plan: Box<QueryPlan>, negated: bool },
}

impl Expr {
    /// Creates a qualified field reference expression.
    pub fn field(source: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Field(FieldRef::new(source, name))
    }

    /// Creates an unqualified field reference expression.
    pub fn named(name: impl Into<String>) -> Self {
        Expr::Field(FieldRef::unqualified(name))
    }

    /// Creates a literal expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality expression.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eq, right)
    }

    /// Creates a not-equal expression.
    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ne, right)
    }

    /// Creates a less-than expression.
    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Lt, right)
    }

    /// Creates a less-than-or-equal expression.
    pub fn le(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Le, right)
    }

    /// Creates a greater-than expression.
    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Gt, right)
    }

    /// Creates a greater-than-or-equal expression.
    pub fn ge(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ge, right)
    }

    /// Creates an AND expression.
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::And, right)
    }

    /// Creates an OR expression.
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Or, right)
    }

    /// Creates an addition expression.
    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Add, right)
    }

    /// Creates a subtraction expression.
    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Sub, right)
    }

    /// Creates a multiplication expression.
    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Mul, right)
    }

    /// Creates a division expression.
    pub fn div(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Div, right)
    }

    /// Creates a modulo expression.
    pub fn rem(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Mod, right)
    }

    /// Creates a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// Creates a negation expression.
    pub fn neg(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Neg,
            expr: Box::new(expr),
        }
    }

    /// Creates an IS NULL expression.
    pub fn is_null(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::IsNull,
            expr: Box::new(expr),
        }
    }

    /// Creates an IS NOT NULL expression.
    pub fn is_not_null(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::IsNotNull,
            expr: Box::new(expr),
        }
    }

    /// Creates a BETWEEN expression.
    pub fn between(expr: Expr, low: Expr, high: Expr) -> Self {
        Expr::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    /// Creates an IN expression over literal values.
    pub fn in_list(expr: Expr, values: Vec<Value>) -> Self {
        Expr::In {
            expr: Box::new(expr),
            list: values.into_iter().map(Expr::Literal).collect(),
            negated: false,
        }
    }

    /// Creates a `count()` aggregate counting all rows.
    pub fn count_all() -> Self {
        Expr::Aggregate(AggregateCall {
            func: AggregateFunc::Count,
            expr: None,
        })
    }

    /// Creates a `count(expr)` aggregate counting non-null values.
    pub fn count(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Count, expr)
    }

    /// Creates a SUM aggregate.
    pub fn sum(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Sum, expr)
    }

    /// Creates an AVG aggregate.
    pub fn avg(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Avg, expr)
    }

    /// Creates a MIN aggregate.
    pub fn min(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Min, expr)
    }

    /// Creates a MAX aggregate.
    pub fn max(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Max, expr)
    }

    /// Creates a MEDIAN aggregate.
    pub fn median(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Median, expr)
    }

    /// Creates a sample standard deviation aggregate.
    pub fn stdev(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::StDev, expr)
    }

    /// Creates a population standard deviation aggregate.
    pub fn stdevp(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::StDevP, expr)
    }

    /// Creates a sample variance aggregate.
    pub fn var(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::Var, expr)
    }

    /// Creates a population variance aggregate.
    pub fn varp(expr: Expr) -> Self {
        Self::aggregate(AggregateFunc::VarP, expr)
    }

    /// Creates a caller-supplied aggregate receiving the whole group.
    pub fn agg<F>(f: F) -> Self
    where
        F: Fn(&GroupContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Expr::Aggregate(AggregateCall {
            func: AggregateFunc::Custom(UserAgg(Arc::new(f))),
            expr: None,
        })
    }

    fn aggregate(func: AggregateFunc, expr: Expr) -> Self {
        Expr::Aggregate(AggregateCall {
            func,
            expr: Some(Box::new(expr)),
        })
    }

    /// Creates a scalar subquery expression.
    pub fn subquery(plan: QueryPlan) -> Self {
        Expr::Subquery {
            plan: Box::new(plan),
            hoisted: false,
        }
    }

    /// Creates an EXISTS subquery expression.
    pub fn exists(plan: QueryPlan) -> Self {
        Expr::Exists {
            plan: Box::new(plan),
            negated: false,
        }
    }

    /// Returns true if any node of this expression is an aggregate call.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate(_) => true,
            Expr::Field(_) | Expr::Literal(_) => false,
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::UnaryOp { expr, .. } => expr.contains_aggregate(),
            Expr::Between {
                expr, low, high, ..
            } => expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate(),
            Expr::In { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Expr::contains_aggregate)
            }
            // Aggregates inside a subquery belong to the subquery.
            Expr::Subquery { .. } | Expr::Exists { .. } => false,
        }
    }

    /// Returns true if any node of this expression is a subquery.
    pub fn contains_subquery(&self) -> bool {
        match self {
            Expr::Subquery { .. } | Expr::Exists { .. } => true,
            Expr::Field(_) | Expr::Literal(_) => false,
            Expr::BinaryOp { left, right, .. } => {
                left.contains_subquery() || right.contains_subquery()
            }
            Expr::UnaryOp { expr, .. } => expr.contains_subquery(),
            Expr::Between {
                expr, low, high, ..
            } => expr.contains_subquery() || low.contains_subquery() || high.contains_subquery(),
            Expr::In { expr, list, .. } => {
                expr.contains_subquery() || list.iter().any(Expr::contains_subquery)
            }
            Expr::Aggregate(call) => call
                .expr
                .as_ref()
                .map(|e| e.contains_subquery())
                .unwrap_or(false),
        }
    }

    /// Collects the binding aliases referenced by this expression.
    ///
    /// Sets `unqualified` when a field reference carries no alias, in which
    /// case alias-based analyses must treat the expression as opaque.
    /// Subqueries are entered; aliases they bind themselves are not reported.
    pub fn collect_aliases(&self, out: &mut HashSet<String>, unqualified: &mut bool) {
        match self {
            Expr::Field(f) => match &f.source {
                Some(s) => {
                    out.insert(s.clone());
                }
                None => *unqualified = true,
            },
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_aliases(out, unqualified);
                right.collect_aliases(out, unqualified);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_aliases(out, unqualified),
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.collect_aliases(out, unqualified);
                low.collect_aliases(out, unqualified);
                high.collect_aliases(out, unqualified);
            }
            Expr::In { expr, list, .. } => {
                expr.collect_aliases(out, unqualified);
                for item in list {
                    item.collect_aliases(out, unqualified);
                }
            }
            Expr::Aggregate(call) => {
                if let Some(e) = &call.expr {
                    e.collect_aliases(out, unqualified);
                }
            }
            Expr::Subquery { plan, .. } | Expr::Exists { plan, .. } => {
                let mut inner = HashSet::new();
                plan.collect_free_aliases(&mut inner, unqualified);
                out.extend(inner);
            }
        }
    }

    /// Returns the aliases this expression references, or None when an
    /// unqualified field makes the set unknowable.
    pub fn aliases(&self) -> Option<HashSet<String>> {
        let mut out = HashSet::new();
        let mut unqualified = false;
        self.collect_aliases(&mut out, &mut unqualified);
        if unqualified {
            None
        } else {
            Some(out)
        }
    }

    /// Rebuilds this expression bottom-up through `f`. Subquery plans are
    /// not entered; `f` sees the subquery node itself and decides.
    pub fn try_rewrite(
        self,
        f: &mut dyn FnMut(Expr) -> rill_core::Result<Expr>,
    ) -> rill_core::Result<Expr> {
        let rebuilt = match self {
            Expr::Field(_) | Expr::Literal(_) | Expr::Subquery { .. } | Expr::Exists { .. } => self,
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: Box::new(left.try_rewrite(f)?),
                op,
                right: Box::new(right.try_rewrite(f)?),
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op,
                expr: Box::new(expr.try_rewrite(f)?),
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(expr.try_rewrite(f)?),
                low: Box::new(low.try_rewrite(f)?),
                high: Box::new(high.try_rewrite(f)?),
                negated,
            },
            Expr::In {
                expr,
                list,
                negated,
            } => Expr::In {
                expr: Box::new(expr.try_rewrite(f)?),
                list: list
                    .into_iter()
                    .map(|e| e.try_rewrite(f))
                    .collect::<rill_core::Result<Vec<_>>>()?,
                negated,
            },
            Expr::Aggregate(call) => Expr::Aggregate(AggregateCall {
                func: call.func,
                expr: match call.expr {
                    Some(e) => Some(Box::new(e.try_rewrite(f)?)),
                    None => None,
                },
            }),
        };
        f(rebuilt)
    }

    /// Splits a conjunction into its conjuncts.
    pub fn split_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::BinaryOp {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let mut out = left.split_conjuncts();
                out.extend(right.split_conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Joins conjuncts back into a single AND chain.
    pub fn conjoin(mut conjuncts: Vec<Expr>) -> Option<Expr> {
        let first = if conjuncts.is_empty() {
            return None;
        } else {
            conjuncts.remove(0)
        };
        Some(conjuncts.into_iter().fold(first, Expr::and))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ref() {
        let f = FieldRef::new("u", "id");
        assert_eq!(f.qualified(), "u.id");

        let f = FieldRef::unqualified("id");
        assert_eq!(f.qualified(), "id");
    }

    #[test]
    fn test_expr_builders() {
        let f = Expr::field("t", "c");
        assert!(matches!(f, Expr::Field(_)));

        let l = Expr::lit(42i64);
        assert!(matches!(l, Expr::Literal(Value::Int64(42))));

        let eq = Expr::eq(Expr::field("t", "a"), Expr::field("t", "b"));
        assert!(matches!(eq, Expr::BinaryOp { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_contains_aggregate() {
        let plain = Expr::gt(Expr::field("t", "a"), Expr::lit(1i64));
        assert!(!plain.contains_aggregate());

        let agg = Expr::add(Expr::sum(Expr::field("t", "a")), Expr::lit(1i64));
        assert!(agg.contains_aggregate());
    }

    #[test]
    fn test_split_and_conjoin() {
        let e = Expr::and(
            Expr::and(
                Expr::gt(Expr::field("a", "x"), Expr::lit(1i64)),
                Expr::lt(Expr::field("b", "y"), Expr::lit(2i64)),
            ),
            Expr::eq(Expr::field("a", "z"), Expr::lit(3i64)),
        );

        let parts = e.clone().split_conjuncts();
        assert_eq!(parts.len(), 3);

        let rejoined = Expr::conjoin(parts).unwrap();
        assert_eq!(rejoined, e);
    }

    #[test]
    fn test_aliases() {
        let e = Expr::and(
            Expr::gt(Expr::field("a", "x"), Expr::lit(1i64)),
            Expr::lt(Expr::field("b", "y"), Expr::field("a", "z")),
        );
        let aliases = e.aliases().unwrap();
        assert!(aliases.contains("a"));
        assert!(aliases.contains("b"));
        assert_eq!(aliases.len(), 2);

        let opaque = Expr::gt(Expr::named("x"), Expr::lit(1i64));
        assert!(opaque.aliases().is_none());
    }

    #[test]
    fn test_buffering_classification() {
        assert!(AggregateFunc::Median.is_buffering());
        assert!(AggregateFunc::StDevP.is_buffering());
        assert!(!AggregateFunc::Count.is_buffering());
        assert!(!AggregateFunc::Avg.is_buffering());
    }
}
