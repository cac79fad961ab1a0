//! Algebraic construction of queries without going through the string syntax.
//!
//! Every constructor produces exactly the tree the parser produces for the equivalent
//! string, so `builder::title("a")? & builder::author("b")?` equals
//! `parse("TITLE(a) AND AUTHOR(b)")`. `&`, `|` and `!` follow the same left-associative
//! conventions as `AND`, `OR` and `NOT`.
//!
//! Leaves reject what the string form cannot express (blank text, parentheses, years
//! outside four digits), so every tree built here renders to a string that parses back
//! to the same tree.

use std::ops::{BitAnd, BitOr, Not};

use super::ast::{Field, Query, YearOp};
use super::parser::{QuerySyntaxError, SyntaxErrorKind};

/// Years a `PUBYEAR` comparison can express
const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// A field leaf, rejecting text the string syntax cannot carry.
///
/// Errors point into the rendered `FIELD(text)` form.
fn leaf(field: Field, text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    let text: String = text.into();
    let rendered = || format!("{}({})", field.keyword(), text);
    if let Some(offset) = text.find(['(', ')']) {
        let position = field.keyword().len() + 1 + offset;
        return Err(QuerySyntaxError::new(SyntaxErrorKind::UnmatchedParen, position, rendered()));
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(QuerySyntaxError::new(SyntaxErrorKind::EmptyArgument, 0, rendered()));
    }
    Ok(Query::field(field, trimmed))
}

pub fn title(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::Title, text)
}

/// `ABS(text)`
pub fn abs(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::Abstract, text)
}

pub fn keywords(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::Keywords, text)
}

/// `TITLE-ABS(text)`
pub fn title_abs(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::TitleAbs, text)
}

/// `TITLE-ABS-KEY(text)`
pub fn title_abs_key(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::TitleAbsKey, text)
}

pub fn author(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::Author, text)
}

pub fn doi(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::Doi, text)
}

/// `ALL(text)`
pub fn fulltext(text: impl Into<String>) -> Result<Query, QuerySyntaxError> {
    leaf(Field::Fulltext, text)
}

/// A single `PUBYEAR <op> year` comparison. The year must fit in four digits.
pub fn pubyear(op: YearOp, year: i32) -> Result<Query, QuerySyntaxError> {
    if !YEARS.contains(&year) {
        return Err(QuerySyntaxError::new(
            SyntaxErrorKind::MalformedYear,
            0,
            format!("PUBYEAR {} {}", op.symbol(), year),
        ));
    }
    Ok(Query::year(op, year))
}

/// Inclusive year range.
///
/// Produces `PUBYEAR >= start AND PUBYEAR <= end`, or the single bound when only one is
/// given. A range with equal ends is still a range, not `PUBYEAR = year`. Returns `None`
/// when neither bound is given.
pub fn year_range(start: Option<i32>, end: Option<i32>) -> Result<Option<Query>, QuerySyntaxError> {
    Ok(match (start, end) {
        (Some(start), Some(end)) => Some(pubyear(YearOp::Gte, start)?.and(pubyear(YearOp::Lte, end)?)),
        (Some(start), None) => Some(pubyear(YearOp::Gte, start)?),
        (None, Some(end)) => Some(pubyear(YearOp::Lte, end)?),
        (None, None) => None,
    })
}

pub fn and(left: Query, right: Query) -> Query {
    left.and(right)
}

pub fn or(left: Query, right: Query) -> Query {
    left.or(right)
}

pub fn not(operand: Query) -> Query {
    operand.negate()
}

pub fn and_not(left: Query, right: Query) -> Query {
    left.and_not(right)
}

/// Left-folded conjunction of all parts, `None` when empty
pub fn all_of(parts: impl IntoIterator<Item = Query>) -> Option<Query> {
    parts.into_iter().reduce(Query::and)
}

/// Left-folded disjunction of all parts, `None` when empty
pub fn any_of(parts: impl IntoIterator<Item = Query>) -> Option<Query> {
    parts.into_iter().reduce(Query::or)
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        self.and(rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        self.or(rhs)
    }
}

impl Not for Query {
    type Output = Query;

    fn not(self) -> Query {
        self.negate()
    }
}
