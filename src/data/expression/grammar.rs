// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use crate::data::expression::ast::{BinaryOp, Expr, ExprVar, UnaryOp};
use crate::data::expression::Value;

fn fold_left(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs))
}

peg::parser! {
    grammar parser() for str {
        rule _() = quiet!{[' ' | '\t' | '\r' | '\n']*}

        pub rule expression() -> Expr
            = _ e:sum() _ { e }

        rule sum() -> Expr
            = first:product() rest:(_ op:sum_op() _ e:product() { (op, e) })* {
                fold_left(first, rest)
            }

        rule sum_op() -> BinaryOp
            = "+" { BinaryOp::Add }
            / "-" { BinaryOp::Sub }

        rule product() -> Expr
            = first:factor() rest:(_ op:product_op() _ e:factor() { (op, e) })* {
                fold_left(first, rest)
            }

        rule product_op() -> BinaryOp
            = "*" { BinaryOp::Mul }
            / "/" { BinaryOp::Div }
            / "%" { BinaryOp::Mod }

        rule factor() -> Expr
            = "-" _ e:atom() { Expr::unary(UnaryOp::Negate, e) }
            / atom()

        rule atom() -> Expr
            = n:number() { Expr::Float(n) }
            / "(" _ e:sum() _ ")" { e }
            / v:variable() { Expr::Var(v) }

        rule number() -> Value
            = n:$(['0'..='9']+ ("." ['0'..='9']*)? / "." ['0'..='9']+) {?
                n.parse().or(Err("number"))
            }

        rule variable() -> ExprVar
            = "$rand" { ExprVar::Rand }
            / "$rank" { ExprVar::Rank }
            / "$" n:$(['0'..='9']+) {?
                n.parse().map(ExprVar::Param).or(Err("parameter index"))
            }
    }
}

pub use self::parser::expression;
