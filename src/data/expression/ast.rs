// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use crate::data::expression::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprVar {
    Rank,
    Rand,
    Param(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
}

impl UnaryOp {
    pub fn eval(self, v: Value) -> Value {
        match self {
            UnaryOp::Negate => -v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Apply the operator with plain IEEE semantics; division by zero is not special-cased.
    pub fn eval(self, l: Value, r: Value) -> Value {
        match self {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            BinaryOp::Mod => l % r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Float(Value),
    Var(ExprVar),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    /// Collapse subtrees which do not depend on any variable.
    pub fn constant_fold(self) -> Self {
        match self {
            Expr::Unary {
                op,
                expr,
            } => {
                match expr.constant_fold() {
                    Expr::Float(f) => Expr::Float(op.eval(f)),
                    expr => Expr::unary(op, expr),
                }
            },
            Expr::Binary {
                op,
                lhs,
                rhs,
            } => {
                match (lhs.constant_fold(), rhs.constant_fold()) {
                    (Expr::Float(l), Expr::Float(r)) => Expr::Float(op.eval(l, r)),
                    (lhs, rhs) => Expr::binary(op, lhs, rhs),
                }
            },
            expr => expr,
        }
    }
}
