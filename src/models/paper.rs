//! Paper models: the provider-native record shape and the canonical deduplicated paper.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::utils::{doi_key, title_key};

/// A single record exactly as one provider described a work.
///
/// Adapters extract these fields from their native payload; everything is optional
/// because providers routinely omit titles, years and DOIs. The untouched payload is
/// kept in `raw` so callers can reach provider-specific metadata later.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    /// Provider identifier ("arxiv", "openalex", ...)
    pub provider: String,

    /// Identifier of the record inside the provider (arXiv id, OpenAlex W-id, Scopus EID, ...)
    pub native_id: String,

    pub title: Option<String>,

    pub r#abstract: Option<String>,

    /// Author display names in provider order
    pub authors: Vec<String>,

    /// Author keywords, subject areas or categories
    pub keywords: Vec<String>,

    pub year: Option<i32>,

    pub doi: Option<String>,

    pub url: Option<String>,

    /// Times the work has been cited, as counted by the provider
    pub citation_count: Option<u64>,

    /// Journal, proceedings or other venue name
    pub journal: Option<String>,

    pub publication_date: Option<NaiveDate>,

    /// The provider payload this record was extracted from
    pub raw: Arc<serde_json::Value>,
}

impl ProviderRecord {
    /// Start building a record for `provider` with its native identifier
    pub fn builder(provider: impl Into<String>, native_id: impl Into<String>) -> RecordBuilder {
        RecordBuilder::new(provider, native_id)
    }

    /// Title, abstract and keywords joined for whole-record text matching
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.title.as_deref());
        parts.extend(self.r#abstract.as_deref());
        parts.extend(self.keywords.iter().map(String::as_str));
        parts.extend(self.authors.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Builder for constructing [`ProviderRecord`] values
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: ProviderRecord,
}

impl RecordBuilder {
    /// Create a new builder with the required fields
    pub fn new(provider: impl Into<String>, native_id: impl Into<String>) -> Self {
        Self {
            record: ProviderRecord {
                provider: provider.into(),
                native_id: native_id.into(),
                title: None,
                r#abstract: None,
                authors: Vec::new(),
                keywords: Vec::new(),
                year: None,
                doi: None,
                url: None,
                citation_count: None,
                journal: None,
                publication_date: None,
                raw: Arc::new(serde_json::Value::Null),
            },
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.record.title = Some(title.into());
        self
    }

    /// Set the abstract
    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.record.r#abstract = Some(text.into());
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn year(mut self, year: Option<i32>) -> Self {
        self.record.year = year;
        self
    }

    pub fn doi(mut self, doi: Option<String>) -> Self {
        self.record.doi = doi;
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.record.url = url;
        self
    }

    pub fn citation_count(mut self, count: Option<u64>) -> Self {
        self.record.citation_count = count;
        self
    }

    pub fn journal(mut self, journal: Option<String>) -> Self {
        self.record.journal = journal;
        self
    }

    pub fn publication_date(mut self, date: Option<NaiveDate>) -> Self {
        self.record.publication_date = date;
        self
    }

    /// Attach the native payload
    pub fn raw(mut self, raw: serde_json::Value) -> Self {
        self.record.raw = Arc::new(raw);
        self
    }

    pub fn build(self) -> ProviderRecord {
        self.record
    }
}

/// Provenance entry: which provider contributed a paper and under which identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub provider: String,

    pub native_id: String,

    /// Shared reference to the provider payload
    #[serde(skip)]
    pub raw: Arc<serde_json::Value>,
}

/// Key used to decide whether two records describe the same work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Case-folded, trimmed DOI
    Doi(String),
    /// Normalized title plus publication year
    TitleYear(String, i32),
}

/// A deduplicated scholarly work with the provenance of every record merged into it.
///
/// Papers are created from the first record seen for a work and only grow afterwards:
/// new provenance is appended and empty scalar fields are filled, but values that are
/// already present are never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Digital Object Identifier, without resolver prefix
    pub doi: Option<String>,

    pub title: String,

    pub year: Option<i32>,

    /// Author names in the order given by the first contributing provider
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,

    /// Highest citation count any contributing provider reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,

    /// Every provider record merged into this paper, in arrival order
    pub source_records: Vec<SourceRecord>,
}

impl Paper {
    /// Derive the identity key (DOI first, then title + year)
    pub fn identity_key(&self) -> Option<IdentityKey> {
        if let Some(doi) = self.doi.as_deref() {
            let key = doi_key(doi);
            if !key.is_empty() {
                return Some(IdentityKey::Doi(key));
            }
        }
        self.title_year_key()
            .map(|(title, year)| IdentityKey::TitleYear(title, year))
    }

    /// Normalized title + year, when both are present
    pub fn title_year_key(&self) -> Option<(String, i32)> {
        let year = self.year?;
        let title = title_key(&self.title);
        if title.is_empty() {
            None
        } else {
            Some((title, year))
        }
    }

    /// Names of the providers that contributed this paper
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for record in &self.source_records {
            if !names.contains(&record.provider.as_str()) {
                names.push(&record.provider);
            }
        }
        names
    }

    /// Merge another record of the same work into this paper.
    ///
    /// Provenance is appended (an identical provider/native id pair is kept once) and
    /// scalar fields are only filled when currently empty.
    pub fn absorb(&mut self, other: Paper) {
        if self.doi.is_none() {
            self.doi = other.doi;
        }
        if self.title.trim().is_empty() && !other.title.trim().is_empty() {
            self.title = other.title;
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.authors.is_empty() {
            self.authors = other.authors;
        }
        if self.r#abstract.is_none() {
            self.r#abstract = other.r#abstract;
        }
        if self.url.is_none() {
            self.url = other.url;
        }
        if self.journal.is_none() {
            self.journal = other.journal;
        }
        if self.publication_date.is_none() {
            self.publication_date = other.publication_date;
        }
        // Providers count citations over different corpora
        self.citation_count = self.citation_count.max(other.citation_count);
        for record in other.source_records {
            let seen = self
                .source_records
                .iter()
                .any(|r| r.provider == record.provider && r.native_id == record.native_id);
            if !seen {
                self.source_records.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(provider: &str, id: &str, title: &str, year: Option<i32>, doi: Option<&str>) -> Paper {
        Paper {
            doi: doi.map(str::to_string),
            title: title.to_string(),
            year,
            authors: Vec::new(),
            source_records: vec![SourceRecord {
                provider: provider.to_string(),
                native_id: id.to_string(),
                raw: Arc::new(serde_json::Value::Null),
            }],
            ..Paper::default()
        }
    }

    #[test]
    fn test_identity_key_prefers_doi() {
        let p = paper("openalex", "W1", "Attention", Some(2017), Some(" 10.1/ABC "));
        assert_eq!(p.identity_key(), Some(IdentityKey::Doi("10.1/abc".to_string())));
    }

    #[test]
    fn test_identity_key_title_year() {
        let p = paper("arxiv", "1706.03762", "Attention Is  All You Need!", Some(2017), None);
        assert_eq!(
            p.identity_key(),
            Some(IdentityKey::TitleYear("attention is all you need".to_string(), 2017))
        );

        let no_year = paper("arxiv", "x", "Attention", None, None);
        assert_eq!(no_year.identity_key(), None);
    }

    #[test]
    fn test_absorb_fills_forward_only() {
        let mut first = paper("arxiv", "a1", "First Title", None, None);
        let mut second = paper("openalex", "W2", "Second Title", Some(2020), Some("10.1/x"));
        second.authors = vec!["Ada".to_string()];

        first.absorb(second);

        assert_eq!(first.title, "First Title");
        assert_eq!(first.year, Some(2020));
        assert_eq!(first.doi.as_deref(), Some("10.1/x"));
        assert_eq!(first.authors, vec!["Ada".to_string()]);
        assert_eq!(first.providers(), vec!["arxiv", "openalex"]);
    }

    #[test]
    fn test_absorb_keeps_present_values() {
        let mut first = paper("arxiv", "a1", "Kept", Some(2019), None);
        first.absorb(paper("openalex", "W2", "Ignored", Some(2021), None));
        assert_eq!(first.title, "Kept");
        assert_eq!(first.year, Some(2019));
        assert_eq!(first.source_records.len(), 2);
    }

    #[test]
    fn test_absorb_venue_metadata() {
        let mut first = paper("arxiv", "a1", "Same", Some(2017), None);
        first.citation_count = Some(10);
        let mut second = paper("openalex", "W2", "Same", Some(2017), None);
        second.citation_count = Some(90_000);
        second.journal = Some("NeurIPS".to_string());
        second.publication_date = NaiveDate::from_ymd_opt(2017, 6, 12);

        first.absorb(second);
        assert_eq!(first.citation_count, Some(90_000));
        assert_eq!(first.journal.as_deref(), Some("NeurIPS"));
        assert_eq!(first.publication_date, NaiveDate::from_ymd_opt(2017, 6, 12));

        first.absorb(paper("crossref", "x", "Same", Some(2017), None));
        assert_eq!(first.citation_count, Some(90_000));
    }

    #[test]
    fn test_absorb_ignores_repeated_provenance() {
        let mut first = paper("arxiv", "a1", "Same", Some(2019), None);
        first.absorb(paper("arxiv", "a1", "Same", Some(2019), None));
        assert_eq!(first.source_records.len(), 1);
    }

    #[test]
    fn test_record_builder() {
        let record = ProviderRecord::builder("crossref", "10.1/x")
            .title("A Title")
            .authors(["Ada", "Grace"])
            .year(Some(2001))
            .doi(Some("10.1/x".to_string()))
            .build();

        assert_eq!(record.provider, "crossref");
        assert_eq!(record.authors.len(), 2);
        assert!(record.searchable_text().contains("Grace"));
    }
}
