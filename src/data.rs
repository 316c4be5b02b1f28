// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! Data entities
//!
//! These are the data structures used to represent a BulletML file.

mod document;
mod element;
mod expression;
mod parse;

pub use self::document::{Document, DocumentWarning, Orientation};
pub use self::element::{Change, DirectionKind, Element, ElementKind};
pub use self::expression::{
    Evaluator, Expression, ExpressionContext, ExpressionError, Parameters, UnboundParameter, Value,
};
pub use self::parse::ParseError;
