//! The provider-independent query tree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Searchable field kinds.
///
/// `TitleAbs` and `TitleAbsKey` are first-class kinds rather than shorthand for an `Or`
/// of their constituents, so providers that search combined fields natively receive the
/// combined hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Abstract,
    Keywords,
    TitleAbs,
    TitleAbsKey,
    Author,
    Doi,
    Fulltext,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Title,
        Field::Abstract,
        Field::Keywords,
        Field::TitleAbs,
        Field::TitleAbsKey,
        Field::Author,
        Field::Doi,
        Field::Fulltext,
    ];

    /// Canonical Scopus-style keyword used when rendering
    pub fn keyword(&self) -> &'static str {
        match self {
            Field::Title => "TITLE",
            Field::Abstract => "ABS",
            Field::Keywords => "KEY",
            Field::TitleAbs => "TITLE-ABS",
            Field::TitleAbsKey => "TITLE-ABS-KEY",
            Field::Author => "AUTHOR",
            Field::Doi => "DOI",
            Field::Fulltext => "ALL",
        }
    }

    /// Resolve a keyword, case-insensitively
    pub fn from_keyword(keyword: &str) -> Option<Field> {
        let field = match keyword.to_ascii_uppercase().as_str() {
            "TITLE" => Field::Title,
            "ABS" | "ABSTRACT" => Field::Abstract,
            "KEY" | "KEYWORDS" => Field::Keywords,
            "TITLE-ABS" => Field::TitleAbs,
            "TITLE-ABS-KEY" => Field::TitleAbsKey,
            "AUTHOR" | "AUTH" => Field::Author,
            "DOI" => Field::Doi,
            "ALL" | "FULLTEXT" => Field::Fulltext,
            _ => return None,
        };
        Some(field)
    }

    /// The single fields a combined field stands for
    pub fn constituents(&self) -> &'static [Field] {
        match self {
            Field::TitleAbs => &[Field::Title, Field::Abstract],
            Field::TitleAbsKey => &[Field::Title, Field::Abstract, Field::Keywords],
            Field::Title => &[Field::Title],
            Field::Abstract => &[Field::Abstract],
            Field::Keywords => &[Field::Keywords],
            Field::Author => &[Field::Author],
            Field::Doi => &[Field::Doi],
            Field::Fulltext => &[Field::Fulltext],
        }
    }

    /// Free-text fields that an all-fields search is guaranteed to cover
    pub fn is_text(&self) -> bool {
        !matches!(self, Field::Doi | Field::Fulltext)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Publication-year comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearOp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl YearOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            YearOp::Eq => "=",
            YearOp::Gt => ">",
            YearOp::Lt => "<",
            YearOp::Gte => ">=",
            YearOp::Lte => "<=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<YearOp> {
        match symbol {
            "=" => Some(YearOp::Eq),
            ">" => Some(YearOp::Gt),
            "<" => Some(YearOp::Lt),
            ">=" => Some(YearOp::Gte),
            "<=" => Some(YearOp::Lte),
            _ => None,
        }
    }

    /// Whether `year` satisfies `year <op> bound`
    pub fn matches(&self, year: i32, bound: i32) -> bool {
        match self {
            YearOp::Eq => year == bound,
            YearOp::Gt => year > bound,
            YearOp::Lt => year < bound,
            YearOp::Gte => year >= bound,
            YearOp::Lte => year <= bound,
        }
    }

    /// Inclusive `(min, max)` interval accepted by `<op> bound`
    pub fn bounds(&self, bound: i32) -> (Option<i32>, Option<i32>) {
        match self {
            YearOp::Eq => (Some(bound), Some(bound)),
            YearOp::Gt => (Some(bound.saturating_add(1)), None),
            YearOp::Gte => (Some(bound), None),
            YearOp::Lt => (None, Some(bound.saturating_sub(1))),
            YearOp::Lte => (None, Some(bound)),
        }
    }

    /// Operator accepting exactly the years this one rejects, if expressible as one comparison
    pub fn complement(&self) -> Option<YearOp> {
        match self {
            YearOp::Eq => None,
            YearOp::Gt => Some(YearOp::Lte),
            YearOp::Lt => Some(YearOp::Gte),
            YearOp::Gte => Some(YearOp::Lt),
            YearOp::Lte => Some(YearOp::Gt),
        }
    }
}

/// A search expression.
///
/// Leaves are field or year predicates; `And`, `Or` and `Not` are the only internal
/// nodes. Values are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "node")]
pub enum Query {
    Field { field: Field, text: String },
    Year { op: YearOp, year: i32 },
    And { left: Box<Query>, right: Box<Query> },
    Or { left: Box<Query>, right: Box<Query> },
    Not { operand: Box<Query> },
}

impl Query {
    pub fn field(field: Field, text: impl Into<String>) -> Query {
        Query::Field {
            field,
            text: text.into(),
        }
    }

    pub fn year(op: YearOp, year: i32) -> Query {
        Query::Year { op, year }
    }

    /// Conjunction of `self` and `other`
    pub fn and(self, other: Query) -> Query {
        Query::And {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Disjunction of `self` and `other`
    pub fn or(self, other: Query) -> Query {
        Query::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self AND NOT other`
    pub fn and_not(self, other: Query) -> Query {
        self.and(other.negate())
    }

    pub fn negate(self) -> Query {
        Query::Not {
            operand: Box::new(self),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Query::Field { .. } | Query::Year { .. })
    }

    /// Top-level conjuncts, left to right (a non-`And` node is its own single conjunct)
    pub fn conjuncts(&self) -> Vec<&Query> {
        let mut out = Vec::new();
        collect_conjuncts(self, &mut out);
        out
    }

    /// Visit every leaf predicate
    pub fn leaves(&self) -> Vec<&Query> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        match self {
            Query::Field { .. } | Query::Year { .. } => 1,
            Query::And { left, right } | Query::Or { left, right } => 1 + left.size() + right.size(),
            Query::Not { operand } => 1 + operand.size(),
        }
    }
}

fn collect_conjuncts<'a>(query: &'a Query, out: &mut Vec<&'a Query>) {
    match query {
        Query::And { left, right } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

fn collect_leaves<'a>(query: &'a Query, out: &mut Vec<&'a Query>) {
    match query {
        Query::And { left, right } | Query::Or { left, right } => {
            collect_leaves(left, out);
            collect_leaves(right, out);
        }
        Query::Not { operand } => collect_leaves(operand, out),
        leaf => out.push(leaf),
    }
}

/// Fold a conjunction back together, left-associated
pub fn conjoin(parts: Vec<Query>) -> Option<Query> {
    parts.into_iter().reduce(Query::and)
}

/// Intersection of the year constraints found among a list of conjuncts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearBounds {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl YearBounds {
    pub fn from_conjuncts<'a>(conjuncts: impl IntoIterator<Item = &'a Query>) -> YearBounds {
        let mut bounds = YearBounds::default();
        for query in conjuncts {
            if let Query::Year { op, year } = query {
                bounds.restrict(*op, *year);
            }
        }
        bounds
    }

    pub fn restrict(&mut self, op: YearOp, year: i32) {
        let (lo, hi) = op.bounds(year);
        if let Some(lo) = lo {
            self.min = Some(self.min.map_or(lo, |m| m.max(lo)));
        }
        if let Some(hi) = hi {
            self.max = Some(self.max.map_or(hi, |m| m.min(hi)));
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl fmt::Display for Query {
    /// Renders the Scopus-style string form; parsing the output yields the same tree.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Field { field, text } => write!(f, "{}({})", field.keyword(), text),
            Query::Year { op, year } => write!(f, "PUBYEAR {} {:04}", op.symbol(), year),
            Query::And { left, right } => {
                write_operand(f, left, matches!(**left, Query::Or { .. }))?;
                match &**right {
                    Query::Not { operand } => {
                        f.write_str(" AND NOT ")?;
                        write_operand(f, operand, !operand.is_leaf() && !matches!(**operand, Query::Not { .. }))
                    }
                    other => {
                        f.write_str(" AND ")?;
                        write_operand(f, other, matches!(other, Query::Or { .. } | Query::And { .. }))
                    }
                }
            }
            Query::Or { left, right } => {
                write_operand(f, left, false)?;
                f.write_str(" OR ")?;
                write_operand(f, right, matches!(**right, Query::Or { .. }))
            }
            Query::Not { operand } => {
                f.write_str("NOT ")?;
                write_operand(f, operand, matches!(**operand, Query::And { .. } | Query::Or { .. }))
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, query: &Query, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", query)
    } else {
        write!(f, "{}", query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_keywords_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_keyword(field.keyword()), Some(field));
            assert_eq!(Field::from_keyword(&field.keyword().to_lowercase()), Some(field));
        }
        assert_eq!(Field::from_keyword("AUTH"), Some(Field::Author));
        assert_eq!(Field::from_keyword("SRCTITLE"), None);
    }

    #[test]
    fn test_year_op_matches() {
        assert!(YearOp::Gte.matches(2020, 2020));
        assert!(!YearOp::Gt.matches(2020, 2020));
        assert!(YearOp::Lt.matches(2019, 2020));
        assert!(YearOp::Eq.matches(2020, 2020));
        assert!(!YearOp::Lte.matches(2021, 2020));
    }

    #[test]
    fn test_year_bounds_intersection() {
        let q = Query::year(YearOp::Gte, 2018)
            .and(Query::year(YearOp::Lt, 2023))
            .and(Query::year(YearOp::Gt, 2019));
        let bounds = YearBounds::from_conjuncts(q.conjuncts());
        assert_eq!(bounds, YearBounds { min: Some(2020), max: Some(2022) });
    }

    #[test]
    fn test_year_bounds_saturate() {
        assert_eq!(YearOp::Gt.bounds(i32::MAX), (Some(i32::MAX), None));
        assert_eq!(YearOp::Lt.bounds(i32::MIN), (None, Some(i32::MIN)));
    }

    #[test]
    fn test_display_and_not() {
        let q = Query::field(Field::Title, "x").and_not(Query::field(Field::Author, "y"));
        assert_eq!(q.to_string(), "TITLE(x) AND NOT AUTHOR(y)");
    }

    #[test]
    fn test_display_parenthesizes_by_precedence() {
        let q = Query::field(Field::Title, "a")
            .or(Query::field(Field::Title, "b"))
            .and(Query::year(YearOp::Gte, 2020));
        assert_eq!(q.to_string(), "(TITLE(a) OR TITLE(b)) AND PUBYEAR >= 2020");

        let right_nested = Query::field(Field::Title, "a")
            .and(Query::field(Field::Title, "b").and(Query::field(Field::Title, "c")));
        assert_eq!(right_nested.to_string(), "TITLE(a) AND (TITLE(b) AND TITLE(c))");
    }

    #[test]
    fn test_conjuncts_flatten() {
        let q = Query::field(Field::Title, "a")
            .and(Query::field(Field::Author, "b"))
            .and(Query::field(Field::Doi, "c").or(Query::field(Field::Doi, "d")));
        assert_eq!(q.conjuncts().len(), 3);
        assert_eq!(q.leaves().len(), 4);
        assert_eq!(q.size(), 7);
    }
}
