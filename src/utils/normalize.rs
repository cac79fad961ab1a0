//! Mapping provider records onto the canonical paper shape.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Paper, ProviderRecord, SourceRecord};

static DOI_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)10\.\d+(?:\.\d+)*/\S+").ok());

/// Extract a bare DOI from a DOI string, resolver URL or `doi:` reference.
///
/// Case is preserved. Returns `None` when nothing DOI-shaped is present.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let found = match DOI_PATTERN.as_ref() {
        Some(re) => re.find(raw)?.as_str(),
        None => raw,
    };
    let doi = found.trim_end_matches(['.', ',', ';']);
    if doi.is_empty() {
        None
    } else {
        Some(doi.to_string())
    }
}

/// Comparison key for DOIs: trimmed and case-folded
pub fn doi_key(doi: &str) -> String {
    doi.trim().to_lowercase()
}

/// Comparison key for titles: lower-cased, punctuation stripped, whitespace collapsed
pub fn title_key(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Normalize one provider record into a single-provenance [`Paper`].
///
/// Fields the provider did not supply stay empty; nothing is inferred.
pub fn normalize(record: ProviderRecord) -> Paper {
    let year = record.year.filter(|y| (1000..=9999).contains(y));
    let doi = record.doi.as_deref().and_then(normalize_doi);

    Paper {
        doi,
        title: record.title.as_deref().and_then(clean).unwrap_or_default(),
        year,
        authors: record.authors.iter().filter_map(|a| clean(a)).collect(),
        r#abstract: record.r#abstract.as_deref().and_then(clean),
        url: record.url.filter(|u| !u.trim().is_empty()),
        journal: record.journal.as_deref().and_then(clean),
        publication_date: record.publication_date,
        citation_count: record.citation_count,
        source_records: vec![SourceRecord {
            provider: record.provider,
            native_id: record.native_id,
            raw: record.raw,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi_strips_resolvers() {
        assert_eq!(normalize_doi("10.1000/xyz123").as_deref(), Some("10.1000/xyz123"));
        assert_eq!(
            normalize_doi("https://doi.org/10.1000/XYZ123").as_deref(),
            Some("10.1000/XYZ123")
        );
        assert_eq!(
            normalize_doi("http://dx.doi.org/10.1000/abc").as_deref(),
            Some("10.1000/abc")
        );
        assert_eq!(normalize_doi("doi: 10.1000/abc.").as_deref(), Some("10.1000/abc"));
        assert_eq!(normalize_doi("   "), None);
        assert_eq!(normalize_doi("not a doi"), None);
    }

    #[test]
    fn test_keys() {
        assert_eq!(doi_key(" 10.1/X "), "10.1/x");
        assert_eq!(title_key("  Deep   Learning: A Survey!"), "deep learning a survey");
        assert_eq!(title_key("?!"), "");
    }

    #[test]
    fn test_normalize_record() {
        let record = ProviderRecord::builder("openalex", "W1")
            .title("  Attention   Is All You Need ")
            .authors(["Ashish Vaswani", "  ", "Noam Shazeer"])
            .year(Some(2017))
            .doi(Some("https://doi.org/10.5555/3295222".to_string()))
            .journal(Some("  Advances in   NeurIPS ".to_string()))
            .citation_count(Some(120_000))
            .build();

        let paper = normalize(record);
        assert_eq!(paper.title, "Attention Is All You Need");
        assert_eq!(paper.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(paper.doi.as_deref(), Some("10.5555/3295222"));
        assert_eq!(paper.source_records.len(), 1);
        assert_eq!(paper.source_records[0].provider, "openalex");
        assert_eq!(paper.journal.as_deref(), Some("Advances in NeurIPS"));
        assert_eq!(paper.citation_count, Some(120_000));
    }

    #[test]
    fn test_unresolved_fields_stay_empty() {
        let record = ProviderRecord::builder("arxiv", "2101.00001")
            .title("Untitled work")
            .year(Some(0))
            .doi(Some("".to_string()))
            .build();

        let paper = normalize(record);
        assert_eq!(paper.year, None);
        assert_eq!(paper.doi, None);
        assert_eq!(paper.r#abstract, None);
    }
}
