//! Splitting a query into what a provider can search natively and what must be
//! re-checked client-side.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ast::{conjoin, Field, Query};
use crate::sources::{SourceCapabilities, SourceError};

/// A subtree a provider could not evaluate natively.
///
/// Gaps never abort a search. The affected records are filtered client-side instead,
/// and that filter is authoritative even where the provider already filtered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGap {
    pub provider: String,
    /// The affected subtree in query-string form
    pub subtree: String,
    pub reason: String,
}

impl fmt::Display for CapabilityGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.provider, self.subtree, self.reason)
    }
}

/// Native query plus the client-side predicate needed to make it exact
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// A query the provider can translate; it matches a superset of the original
    pub native: Query,

    /// Predicate applied to every returned record, if the native query is not exact
    pub residual: Option<Query>,

    pub gaps: Vec<CapabilityGap>,
}

impl QueryPlan {
    /// Plan `query` for a provider with the given capabilities.
    ///
    /// Fails with [`SourceError::Unsupported`] when nothing in the query can be searched
    /// natively.
    pub fn build(provider: &str, query: &Query, caps: SourceCapabilities) -> Result<QueryPlan, SourceError> {
        let mut planner = Planner {
            provider,
            caps,
            gaps: Vec::new(),
        };

        let mut native_parts = Vec::new();
        let mut residual_parts = Vec::new();
        for conjunct in query.conjuncts() {
            let expanded = planner.expand(conjunct);
            let relaxed = match &expanded {
                Query::Not { operand } => planner.exclude(&expanded, operand),
                other => planner.relax(other),
            };
            if !relaxed.exact {
                residual_parts.push(conjunct.clone());
            }
            if let Some(native) = relaxed.query {
                native_parts.push(native);
            }
        }

        // Nothing can be searched when there are only exclusions
        if native_parts.iter().all(|q| matches!(q, Query::Not { .. })) {
            native_parts.clear();
        }

        let native = conjoin(native_parts).ok_or_else(|| {
            SourceError::Unsupported(format!("{} cannot search any part of '{}'", provider, query))
        })?;

        Ok(QueryPlan {
            native,
            residual: conjoin(residual_parts),
            gaps: planner.gaps,
        })
    }

    pub fn is_exact(&self) -> bool {
        self.residual.is_none()
    }
}

struct Relaxed {
    query: Option<Query>,
    exact: bool,
}

impl Relaxed {
    fn exact(query: Query) -> Self {
        Self {
            query: Some(query),
            exact: true,
        }
    }

    fn approx(query: Option<Query>) -> Self {
        Self { query, exact: false }
    }
}

struct Planner<'a> {
    provider: &'a str,
    caps: SourceCapabilities,
    gaps: Vec<CapabilityGap>,
}

impl Planner<'_> {
    fn gap(&mut self, subtree: &Query, reason: impl Into<String>) {
        self.gaps.push(CapabilityGap {
            provider: self.provider.to_string(),
            subtree: subtree.to_string(),
            reason: reason.into(),
        });
    }

    /// Replace combined fields the provider lacks by an `Or` of their constituents,
    /// when every constituent and disjunction are supported.
    fn expand(&self, query: &Query) -> Query {
        match query {
            Query::Field { field, text } if !self.caps.supports_field(*field) => {
                let parts = field.constituents();
                let expandable = parts.len() > 1
                    && self.caps.contains(SourceCapabilities::DISJUNCTION)
                    && parts.iter().all(|f| self.caps.supports_field(*f));
                if expandable {
                    parts
                        .iter()
                        .map(|f| Query::field(*f, text.clone()))
                        .reduce(Query::or)
                        .unwrap_or_else(|| query.clone())
                } else {
                    query.clone()
                }
            }
            Query::And { left, right } => self.expand(left).and(self.expand(right)),
            Query::Or { left, right } => self.expand(left).or(self.expand(right)),
            Query::Not { operand } => self.expand(operand).negate(),
            leaf => leaf.clone(),
        }
    }

    /// Compute the largest natively searchable query matching a superset of `query`
    fn relax(&mut self, query: &Query) -> Relaxed {
        match query {
            Query::Field { field, text } => {
                if self.caps.supports_field(*field) {
                    Relaxed::exact(query.clone())
                } else if field.is_text() && self.caps.contains(SourceCapabilities::FULLTEXT) {
                    self.gap(query, format!("{} is searched as full text", field));
                    Relaxed::approx(Some(Query::field(Field::Fulltext, text.clone())))
                } else {
                    self.gap(query, format!("{} is not searchable", field));
                    Relaxed::approx(None)
                }
            }
            Query::Year { .. } => {
                if self.caps.contains(SourceCapabilities::YEAR_FILTER) {
                    Relaxed::exact(query.clone())
                } else {
                    self.gap(query, "year filtering is not supported");
                    Relaxed::approx(None)
                }
            }
            Query::And { left, right } => {
                let left = self.relax(left);
                let right = self.relax(right);
                let exact = left.exact && right.exact;
                let parts: Vec<Query> = left.query.into_iter().chain(right.query).collect();
                Relaxed {
                    query: conjoin(parts),
                    exact,
                }
            }
            Query::Or { left, right } => {
                if !self.caps.contains(SourceCapabilities::DISJUNCTION) {
                    self.gap(query, "disjunction is not supported");
                    return Relaxed::approx(None);
                }
                let left = self.relax(left);
                let right = self.relax(right);
                match (left.query, right.query) {
                    (Some(l), Some(r)) => Relaxed {
                        query: Some(l.or(r)),
                        exact: left.exact && right.exact,
                    },
                    // One side unconstrained makes the whole disjunction unconstrained
                    _ => Relaxed::approx(None),
                }
            }
            // Negation is native only as a top-level exclusion, see `exclude`
            Query::Not { .. } => {
                self.gap(query, "nested negation is not supported");
                Relaxed::approx(None)
            }
        }
    }

    /// Plan a top-level `AND NOT` operand: native only when the operand itself is
    /// exactly searchable, since excluding a superset would drop matching records
    fn exclude(&mut self, query: &Query, operand: &Query) -> Relaxed {
        let grouped = operand.is_leaf() || self.caps.contains(SourceCapabilities::DISJUNCTION);
        if !self.caps.contains(SourceCapabilities::NEGATION) || !grouped {
            self.gap(query, "negation is not supported");
            return Relaxed::approx(None);
        }
        // Gaps inside the operand are reported once, for the whole exclusion
        let mut scratch = Planner {
            provider: self.provider,
            caps: self.caps,
            gaps: Vec::new(),
        };
        let inner = scratch.relax(operand);
        match inner.query {
            Some(q) if inner.exact => Relaxed::exact(q.negate()),
            _ => {
                self.gap(query, "negated subtree is not exactly searchable");
                Relaxed::approx(None)
            }
        }
    }
}
