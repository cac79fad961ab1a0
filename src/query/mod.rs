//! Query representation, its two front-ends and provider planning.
//!
//! Queries are written either as Scopus-style strings and handed to [`parse`], or
//! assembled with the combinators in [`builder`]. Both produce the same [`Query`] tree.
//! Before a provider runs a query, [`QueryPlan::build`] splits it into a natively
//! searchable part and a residual predicate evaluated with [`matches`].

mod ast;
pub mod builder;
mod eval;
mod parser;
mod plan;

pub use ast::{conjoin, Field, Query, YearBounds, YearOp};
pub use eval::matches;
pub(crate) use eval::split_terms;
pub use parser::{parse, QuerySyntaxError, SyntaxErrorKind};
pub use plan::{CapabilityGap, QueryPlan};
