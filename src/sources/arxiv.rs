//! arXiv source: Atom API with its own boolean field syntax.

use async_trait::async_trait;
use chrono::Datelike;
use feed_rs::parser;
use serde_json::json;
use std::sync::Arc;

use crate::config::HttpConfig;
use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{split_terms, Field, Query};
use crate::sources::{
    split_conjunction, unsupported, NativeQuery, Page, PageRequest, Source, SourceCapabilities, SourceError,
};
use crate::utils::{api_retry_config, HttpClient};

/// Base URL for arXiv API
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv asks clients to wait three seconds between requests
const DEFAULT_REQUESTS_PER_SECOND: f32 = 0.34;

/// arXiv research source
///
/// Translates title, abstract, author and all-fields predicates plus submission-date
/// ranges into `search_query`, including `OR` and `ANDNOT`.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl ArxivSource {
    /// Create a new arXiv source
    pub fn new(http: &HttpConfig, options: &ProviderOptions) -> Result<Self, SourceError> {
        let client = HttpClient::new(http)?
            .with_rate_limit(options.requests_per_second.or(Some(DEFAULT_REQUESTS_PER_SECOND)))
            .with_retry(api_retry_config());
        Ok(Self::with_client(Arc::new(client), ARXIV_API_URL))
    }

    /// Create with a custom HTTP client and endpoint (for testing)
    pub fn with_client(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn prefix(field: Field) -> Option<&'static str> {
        match field {
            Field::Title => Some("ti"),
            Field::Abstract => Some("abs"),
            Field::Author => Some("au"),
            Field::Fulltext => Some("all"),
            _ => None,
        }
    }

    fn render_field(&self, field: Field, text: &str, query: &Query) -> Result<String, SourceError> {
        let prefix = Self::prefix(field).ok_or_else(|| unsupported(self.id(), query))?;
        let (phrases, terms) = split_terms(text);
        let parts: Vec<String> = phrases
            .iter()
            .map(|p| format!("{}:\"{}\"", prefix, p))
            .chain(terms.iter().map(|t| format!("{}:{}", prefix, t)))
            .collect();
        match parts.len() {
            0 => Err(unsupported(self.id(), query)),
            1 => Ok(parts.into_iter().collect()),
            _ => Ok(format!("({})", parts.join(" AND "))),
        }
    }

    fn render(&self, query: &Query) -> Result<String, SourceError> {
        match query {
            Query::Field { field, text } => self.render_field(*field, text, query),
            Query::Year { op, year } => {
                let (lo, hi) = op.bounds(*year);
                Ok(format!(
                    "submittedDate:[{}01010000 TO {}12312359]",
                    lo.unwrap_or(1991),
                    hi.unwrap_or(9999)
                ))
            }
            Query::And { .. } => self.render_conjunction(query),
            Query::Or { left, right } => Ok(format!("({} OR {})", self.render(left)?, self.render(right)?)),
            // arXiv has no unary NOT, only ANDNOT
            Query::Not { .. } => Err(unsupported(self.id(), query)),
        }
    }

    fn render_conjunction(&self, query: &Query) -> Result<String, SourceError> {
        let (positive, negative) = split_conjunction(query);
        let mut parts = positive.iter().map(|q| self.render(q));
        let mut rendered = parts.next().ok_or_else(|| unsupported(self.id(), query))??;
        for part in parts {
            rendered = format!("({} AND {})", rendered, part?);
        }
        for excluded in negative {
            rendered = format!("({} ANDNOT {})", rendered, self.render(excluded)?);
        }
        Ok(rendered)
    }

    /// Strip the URL and version suffix from an entry id
    fn parse_id(id: &str) -> String {
        let id = id.rsplit_once("/abs/").map(|(_, rest)| rest).unwrap_or(id);
        match id.rsplit_once('v') {
            Some((base, version)) if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) => {
                base.to_string()
            }
            _ => id.to_string(),
        }
    }

    /// Parse arXiv Atom feed entry into a provider record
    fn parse_entry(&self, entry: &feed_rs::model::Entry) -> ProviderRecord {
        let native_id = Self::parse_id(&entry.id);
        let title = entry.title.as_ref().map(|t| t.content.clone());
        let summary = entry.summary.as_ref().map(|s| s.content.clone());
        let authors: Vec<String> = entry.authors.iter().map(|a| a.name.clone()).collect();
        let categories: Vec<String> = entry.categories.iter().map(|c| c.term.clone()).collect();
        let doi = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("doi"))
            .map(|l| l.href.clone());
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| entry.id.clone());
        let published = entry.published.or(entry.updated);

        let raw = json!({
            "id": entry.id,
            "title": title,
            "summary": summary,
            "authors": authors,
            "categories": categories,
            "published": published.map(|d| d.to_rfc3339()),
            "updated": entry.updated.map(|d| d.to_rfc3339()),
            "links": entry.links.iter().map(|l| json!({
                "href": l.href,
                "rel": l.rel,
                "title": l.title,
            })).collect::<Vec<_>>(),
        });

        let mut builder = ProviderRecord::builder(self.id(), native_id)
            .authors(authors)
            .keywords(categories)
            .year(published.map(|d| d.year()))
            .publication_date(published.map(|d| d.date_naive()))
            .doi(doi)
            .url(Some(url))
            .raw(raw);
        if let Some(title) = title {
            builder = builder.title(title);
        }
        if let Some(summary) = summary {
            builder = builder.abstract_text(summary);
        }
        builder.build()
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::TITLE
            | SourceCapabilities::ABSTRACT
            | SourceCapabilities::AUTHOR
            | SourceCapabilities::FULLTEXT
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::NEGATION
            | SourceCapabilities::DISJUNCTION
    }

    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError> {
        Ok(NativeQuery::new()
            .param("search_query", self.render(query)?)
            .param("sortBy", "relevance")
            .param("sortOrder", "descending"))
    }

    async fn fetch_page(&self, query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        let mut params = query.params.clone();
        params.push(("start".to_string(), page.offset.to_string()));
        params.push(("max_results".to_string(), page.size.to_string()));

        let body = self
            .client
            .get_text(&self.base_url, &params, &[("Accept", "application/atom+xml".to_string())])
            .await?;
        let feed = parser::parse(body.as_bytes())
            .map_err(|e| SourceError::Parse(format!("Failed to parse Atom feed: {}", e)))?;

        Ok(Page {
            records: feed.entries.iter().map(|e| self.parse_entry(e)).collect(),
            fetched: feed.entries.len(),
            total: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use crate::utils::RetryConfig;

    fn source(base_url: &str) -> ArxivSource {
        let client = HttpClient::new(&HttpConfig::default())
            .unwrap()
            .with_retry(RetryConfig::none());
        ArxivSource::with_client(Arc::new(client), base_url)
    }

    fn search_query(q: &str) -> String {
        let s = source(ARXIV_API_URL);
        let plan = s.plan(&parse(q).unwrap()).unwrap();
        s.translate(&plan.native)
            .unwrap()
            .get("search_query")
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_translate_fields() {
        assert_eq!(search_query("TITLE(transformer)"), "ti:transformer");
        assert_eq!(search_query("AUTHOR(\"Yoshua Bengio\")"), "au:\"yoshua bengio\"");
        assert_eq!(search_query("ALL(graph neural)"), "(all:graph AND all:neural)");
    }

    #[test]
    fn test_translate_boolean_structure() {
        assert_eq!(
            search_query("TITLE(x) AND NOT AUTHOR(y)"),
            "(ti:x ANDNOT au:y)"
        );
        assert_eq!(
            search_query("(TITLE(a) OR ABS(b)) AND PUBYEAR >= 2020"),
            "((ti:a OR abs:b) AND submittedDate:[202001010000 TO 999912312359])"
        );
        assert_eq!(
            search_query("NOT AUTHOR(y) AND TITLE(x)"),
            "(ti:x ANDNOT au:y)"
        );
    }

    #[test]
    fn test_nested_negation_is_filtered_locally() {
        let s = source(ARXIV_API_URL);
        let plan = s
            .plan(&parse("ALL(x) AND (TITLE(a) OR NOT TITLE(b))").unwrap())
            .unwrap();
        assert!(!plan.is_exact());
        assert_eq!(plan.gaps.len(), 1);
        assert_eq!(s.translate(&plan.native).unwrap().get("search_query"), Some("all:x"));

        assert_eq!(search_query("TITLE(a) AND NOT NOT TITLE(b)"), "ti:a");
    }

    #[test]
    fn test_combined_field_expands() {
        assert_eq!(search_query("TITLE-ABS(llm)"), "(ti:llm OR abs:llm)");
        // keywords are not searchable, so the combined field falls back to all fields
        assert_eq!(search_query("TITLE-ABS-KEY(llm)"), "all:llm");
    }

    #[test]
    fn test_year_bounds() {
        assert_eq!(
            search_query("PUBYEAR = 2021 AND ALL(x)"),
            "(submittedDate:[202101010000 TO 202112312359] AND all:x)"
        );
        assert_eq!(
            search_query("ALL(x) AND PUBYEAR < 2000"),
            "(all:x AND submittedDate:[199101010000 TO 199912312359])"
        );
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(ArxivSource::parse_id("http://arxiv.org/abs/1706.03762v5"), "1706.03762");
        assert_eq!(ArxivSource::parse_id("http://arxiv.org/abs/solv-int/9901001v1"), "solv-int/9901001");
        assert_eq!(ArxivSource::parse_id("2301.12345"), "2301.12345");
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <updated>2023-08-02T00:41:18Z</updated>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>The dominant sequence transduction models are based on recurrent networks.</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="doi" href="http://dx.doi.org/10.48550/arXiv.1706.03762" rel="related"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[tokio::test]
    async fn test_fetch_page_parses_feed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/query")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("search_query".into(), "ti:attention".into()),
                mockito::Matcher::UrlEncoded("start".into(), "0".into()),
                mockito::Matcher::UrlEncoded("max_results".into(), "10".into()),
            ]))
            .with_header("content-type", "application/atom+xml")
            .with_body(FEED)
            .create_async()
            .await;

        let s = source(&format!("{}/api/query", server.url()));
        let native = s.translate(&parse("TITLE(attention)").unwrap()).unwrap();
        let options = ProviderOptions::default();
        let page = s
            .fetch_page(&native, &PageRequest { offset: 0, page: 1, size: 10, options: &options })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.native_id, "1706.03762");
        assert_eq!(record.year, Some(2017));
        assert_eq!(record.publication_date, chrono::NaiveDate::from_ymd_opt(2017, 6, 12));
        assert_eq!(record.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(record.keywords, vec!["cs.CL"]);
        assert_eq!(record.doi.as_deref(), Some("http://dx.doi.org/10.48550/arXiv.1706.03762"));
        assert!(record.title.as_deref().unwrap().starts_with("Attention Is All"));
        assert_eq!(record.raw["id"], "http://arxiv.org/abs/1706.03762v7");
    }

    #[tokio::test]
    async fn test_fetch_page_reports_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let s = source(&format!("{}/api/query", server.url()));
        let native = s.translate(&parse("ALL(x)").unwrap()).unwrap();
        let options = ProviderOptions::default();
        let err = s
            .fetch_page(&native, &PageRequest { offset: 0, page: 1, size: 10, options: &options })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 503, .. }));
    }
}
