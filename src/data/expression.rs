// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::collections::hash_map::HashMap;
use std::rc::Rc;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

mod ast;
mod grammar;

use self::ast::{Expr, ExprVar};

/// An error when evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// Failed to parse an expression.
    #[error("failed to parse expression")]
    ParseFailure {
        /// The parser error.
        #[from]
        source: peg::error::ParseError<peg::str::LineCol>,
    },
    /// Reference to a parameter which is not bound.
    #[error("unbound parameter `${}`", index)]
    UndefinedParameter {
        /// The index of the parameter.
        index: usize,
    },
}

impl ExpressionError {
    fn undefined_parameter(index: usize) -> Self {
        Self::UndefinedParameter {
            index,
        }
    }
}

/// The value of an expression.
pub type Value = f32;

/// Positional parameters (`$1`, `$2`, ...) bound by a reference.
pub type Parameters = HashMap<usize, Value>;

/// The context in which to execute an expression.
///
/// This provides values for variables referenced in expressions.
pub trait ExpressionContext {
    /// Get the value of a positional parameter.
    fn param(&self, index: usize) -> Option<Value>;
    /// Get a random value.
    fn rand(&self) -> Value;
    /// Get the difficulty of the entity using the expression.
    fn rank(&self) -> Value;
}

/// An expression which may be evaluated to compute a value.
#[derive(Debug, Clone)]
pub struct Expression {
    expr: Expr,
}

impl Expression {
    /// Parse an expression from a string.
    pub fn parse<E>(expr: E) -> Result<Self, ExpressionError>
    where
        E: AsRef<str>,
    {
        Ok(grammar::expression(expr.as_ref()).map(|expr| {
            Expression {
                expr: expr.constant_fold(),
            }
        })?)
    }

    /// Evaluate the expression with a given context.
    ///
    /// Arithmetic follows IEEE rules, so `5/0` is infinite and `5%0` is NaN.
    pub fn eval(&self, ctx: &dyn ExpressionContext) -> Result<Value, ExpressionError> {
        Self::eval_expr(&self.expr, ctx)
    }

    fn eval_expr(expr: &Expr, ctx: &dyn ExpressionContext) -> Result<Value, ExpressionError> {
        match *expr {
            Expr::Unary {
                op: o,
                expr: ref e,
            } => Self::eval_expr(e.as_ref(), ctx).map(|r| o.eval(r)),
            Expr::Binary {
                op: o,
                lhs: ref l,
                rhs: ref r,
            } => {
                Self::eval_expr(l.as_ref(), ctx)
                    .and_then(|lr| Self::eval_expr(r.as_ref(), ctx).map(|rr| o.eval(lr, rr)))
            },
            Expr::Float(f) => Ok(f),
            Expr::Var(v) => {
                match v {
                    ExprVar::Rank => Ok(ctx.rank()),
                    ExprVar::Rand => Ok(ctx.rand()),
                    ExprVar::Param(index) => {
                        ctx.param(index)
                            .ok_or_else(|| ExpressionError::undefined_parameter(index))
                    },
                }
            },
        }
    }
}

/// What to do when an expression uses a parameter which is not bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UnboundParameter {
    /// Treat the parameter as `0`.
    #[serde(rename = "zero")]
    Zero,
    /// Fail the evaluation with [`ExpressionError::UndefinedParameter`].
    #[serde(rename = "report")]
    Report,
}

impl Default for UnboundParameter {
    fn default() -> Self {
        UnboundParameter::Zero
    }
}

/// Evaluates expression text against the variables currently in scope.
///
/// Parsed expressions are cached by their text, so evaluating the same body again does not
/// parse it again.
#[derive(Debug, Clone)]
pub struct Evaluator {
    rand: Value,
    rank: Value,
    params: Rc<Parameters>,
    unbound: UnboundParameter,
    cache: HashMap<String, Expression>,
}

impl Evaluator {
    /// Create an evaluator with no parameters bound.
    pub fn new() -> Self {
        Evaluator {
            rand: 0.,
            rank: 0.,
            params: Rc::new(Parameters::new()),
            unbound: UnboundParameter::default(),
            cache: HashMap::new(),
        }
    }

    /// Set the value of `$rand`.
    pub fn set_rand(&mut self, rand: Value) {
        self.rand = rand;
    }

    /// Set the value of `$rank`.
    pub fn set_rank(&mut self, rank: Value) {
        self.rank = rank;
    }

    /// Set the parameters visible as `$1..$N`.
    pub fn set_parameters(&mut self, params: Rc<Parameters>) {
        self.params = params;
    }

    /// Set the policy for unbound parameters.
    pub fn set_unbound_parameter(&mut self, unbound: UnboundParameter) {
        self.unbound = unbound;
    }

    /// Evaluate expression text.
    ///
    /// Blank text evaluates to `0`.
    pub fn evaluate(&mut self, text: &str) -> Result<Value, ExpressionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(0.);
        }

        if !self.cache.contains_key(text) {
            let expr = Expression::parse(text)?;
            self.cache.insert(text.into(), expr);
        }

        let this: &Self = self;
        match this.cache.get(text) {
            Some(expr) => expr.eval(this),
            None => Ok(0.),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionContext for Evaluator {
    fn param(&self, index: usize) -> Option<Value> {
        self.params.get(&index).copied().or_else(|| {
            match self.unbound {
                UnboundParameter::Zero => {
                    debug!("unbound parameter `${}` evaluated as 0", index);
                    Some(0.)
                },
                UnboundParameter::Report => None,
            }
        })
    }

    fn rand(&self) -> Value {
        self.rand
    }

    fn rank(&self) -> Value {
        self.rank
    }
}
