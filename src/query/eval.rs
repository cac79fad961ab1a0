//! Client-side evaluation of a query against a provider record.

use super::ast::{Field, Query};
use crate::models::ProviderRecord;
use crate::utils::{doi_key, normalize_doi};

/// Whether `record` satisfies `query`.
///
/// Text predicates match case-insensitively. Quoted segments must appear as phrases,
/// remaining terms must each appear somewhere in the searched fields. A record without a
/// year never satisfies a year predicate.
pub fn matches(query: &Query, record: &ProviderRecord) -> bool {
    match query {
        Query::Field { field, text } => field_matches(*field, text, record),
        Query::Year { op, year } => record.year.is_some_and(|y| op.matches(y, *year)),
        Query::And { left, right } => matches(left, record) && matches(right, record),
        Query::Or { left, right } => matches(left, record) || matches(right, record),
        Query::Not { operand } => !matches(operand, record),
    }
}

fn field_matches(field: Field, text: &str, record: &ProviderRecord) -> bool {
    if field == Field::Doi {
        let wanted = normalize_doi(text).map(|d| doi_key(&d));
        let found = record.doi.as_deref().and_then(normalize_doi).map(|d| doi_key(&d));
        return wanted.is_some() && wanted == found;
    }

    let haystack = match field {
        Field::Title => record.title.clone().unwrap_or_default(),
        Field::Abstract => record.r#abstract.clone().unwrap_or_default(),
        Field::Keywords => record.keywords.join(" "),
        Field::TitleAbs => join_present([record.title.as_deref(), record.r#abstract.as_deref()]),
        Field::TitleAbsKey => {
            let keywords = record.keywords.join(" ");
            join_present([
                record.title.as_deref(),
                record.r#abstract.as_deref(),
                Some(keywords.as_str()),
            ])
        }
        Field::Author => record.authors.join(" ; "),
        Field::Fulltext => record.searchable_text(),
        Field::Doi => String::new(),
    };
    text_matches(text, &haystack)
}

fn join_present<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts.into_iter().flatten().collect::<Vec<_>>().join(" ")
}

fn fold(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Match a free-text argument against a haystack
pub(crate) fn text_matches(text: &str, haystack: &str) -> bool {
    let haystack = fold(haystack);
    let (phrases, terms) = split_terms(text);
    if phrases.is_empty() && terms.is_empty() {
        return false;
    }
    phrases.iter().all(|p| haystack.contains(p.as_str())) && terms.iter().all(|t| haystack.contains(t.as_str()))
}

/// Split an argument into quoted phrases and bare terms, all case-folded
pub(crate) fn split_terms(text: &str) -> (Vec<String>, Vec<String>) {
    let mut phrases = Vec::new();
    let mut terms = Vec::new();
    for (i, segment) in text.split('"').enumerate() {
        if i % 2 == 1 {
            let phrase = fold(segment);
            if !phrase.is_empty() {
                phrases.push(phrase);
            }
        } else {
            for word in segment.split_whitespace() {
                let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
                if !word.is_empty() {
                    terms.push(word);
                }
            }
        }
    }
    (phrases, terms)
}
