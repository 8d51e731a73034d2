//! Filter operator.

use crate::ast::Expr;
use crate::eval::{eval, is_true, Env};
use crate::executor::entry::Entry;
use crate::executor::operator::{BoxedOperator, Operator};
use rill_core::{FieldNames, Result};

/// Filters entries by a predicate, pulling upstream until a match or
/// exhaustion. Serves both `where` (plain rows) and `having` (group rows).
pub struct FilterOp {
    input: BoxedOperator,
    predicate: Expr,
    env: Env,
}

impl FilterOp {
    pub fn new(input: BoxedOperator, predicate: Expr, env: Env) -> Self {
        Self {
            input,
            predicate,
            env,
        }
    }
}

impl Operator for FilterOp {
    fn next(&mut self) -> Result<Option<Entry>> {
        while let Some(entry) = self.input.next()? {
            let verdict = eval(&self.predicate, &entry, &self.env)?;
            if is_true(&verdict)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn names(&self) -> FieldNames {
        self.input.names()
    }
}
