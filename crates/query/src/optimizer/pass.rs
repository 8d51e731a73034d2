//! Optimizer pass trait.

use crate::plan::QueryPlan;

/// An optimization pass that rewrites a plan into an equivalent plan.
pub trait OptimizerPass {
    /// Rewrites the given plan.
    fn apply(&self, plan: QueryPlan) -> QueryPlan;

    /// Returns the name of this pass.
    fn name(&self) -> &'static str {
        "unnamed"
    }
}
