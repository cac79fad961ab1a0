//! Semantic Scholar research source implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::lookup::found;
use crate::config::HttpConfig;
use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{CapabilityGap, Field, Query, QueryPlan, YearBounds};
use crate::sources::{
    unsupported, CitationDirection, NativeQuery, Page, PageRequest, PaperLookup, Source, SourceCapabilities,
    SourceError,
};
use crate::utils::{api_retry_config, HttpClient};

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const API_FIELDS: &str =
    "paperId,title,abstract,authors,year,externalIds,url,fieldsOfStudy,citationCount,venue,publicationDate";

const AUTHOR_FIELDS: &str = "authorId,name,paperCount,citationCount";

/// Largest `limit` the citation and reference endpoints accept
const MAX_LINKS: usize = 1000;

/// Shared unauthenticated pool allows roughly one request per second
const DEFAULT_REQUESTS_PER_SECOND: f32 = 1.0;

/// Semantic Scholar research source
///
/// The relevance search takes one plain-text query and a year range, so every
/// field predicate is answered through free text and post-filtered. A query that is
/// a single `AUTHOR(...)` goes through the author endpoints instead.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: Arc<HttpClient>,
    base_url: String,
    /// Author name → resolved author id, so paging does not search the name again
    author_ids: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl SemanticScholarSource {
    /// Create a new Semantic Scholar source
    pub fn new(http: &HttpConfig, options: &ProviderOptions) -> Result<Self, SourceError> {
        let client = HttpClient::new(http)?
            .with_rate_limit(options.requests_per_second.or(Some(DEFAULT_REQUESTS_PER_SECOND)))
            .with_retry(api_retry_config());
        Ok(Self::with_client(Arc::new(client), SEMANTIC_API_BASE))
    }

    /// Create with a custom HTTP client and endpoint (for testing)
    pub fn with_client(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            author_ids: Arc::default(),
        }
    }

    fn headers(options: &ProviderOptions) -> Vec<(&'static str, String)> {
        options.api_key.iter().map(|key| ("x-api-key", key.clone())).collect()
    }

    /// Identifier form the paper endpoints resolve.
    ///
    /// arXiv DOIs become `ARXIV:<id>` and other DOIs `DOI:<doi>`; prefixed ids and
    /// Semantic Scholar ids pass through.
    pub(crate) fn normalize_paper_id(paper_id: &str) -> String {
        const ARXIV_DOI: &str = "10.48550/arxiv.";
        let id = paper_id.trim();
        if let Some(arxiv) = id
            .get(..ARXIV_DOI.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(ARXIV_DOI))
            .and_then(|_| id.get(ARXIV_DOI.len()..))
        {
            return format!("ARXIV:{}", arxiv);
        }
        let prefixed = ["DOI:", "ARXIV:", "PMID:", "CorpusId:"]
            .iter()
            .any(|prefix| id.starts_with(prefix));
        if id.contains('/') && !prefixed {
            return format!("DOI:{}", id);
        }
        id.to_string()
    }

    /// Most cited author profile matching `name`
    async fn resolve_author(
        &self,
        name: &str,
        headers: &[(&'static str, String)],
    ) -> Result<Option<String>, SourceError> {
        let cached = self.author_ids.lock().ok().and_then(|ids| ids.get(name).cloned());
        if let Some(id) = cached {
            return Ok(id);
        }

        let params = vec![
            ("query".to_string(), name.to_string()),
            ("limit".to_string(), "10".to_string()),
            ("fields".to_string(), AUTHOR_FIELDS.to_string()),
        ];
        let url = format!("{}/author/search", self.base_url);
        let data = self.client.get_json(&url, &params, headers).await?;
        let profiles: Vec<S2AuthorProfile> = match data.get("data") {
            Some(list) => serde_json::from_value(list.clone())?,
            None => Vec::new(),
        };
        let best = profiles
            .into_iter()
            .filter(|p| p.author_id.is_some())
            .max_by_key(|p| p.citation_count.unwrap_or(0));
        if let Some(profile) = &best {
            debug!(author = ?profile.name, id = ?profile.author_id, "resolved author");
        }

        let id = best.and_then(|p| p.author_id);
        if let Ok(mut ids) = self.author_ids.lock() {
            ids.insert(name.to_string(), id.clone());
        }
        Ok(id)
    }

    async fn author_page(&self, name: &str, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        let headers = Self::headers(page.options);
        let Some(author_id) = self.resolve_author(name, &headers).await? else {
            return Ok(Page {
                total: Some(0),
                ..Page::default()
            });
        };

        let params = vec![
            ("fields".to_string(), API_FIELDS.to_string()),
            ("offset".to_string(), page.offset.to_string()),
            ("limit".to_string(), page.size.to_string()),
        ];
        let url = format!("{}/author/{}/papers", self.base_url, author_id);
        let data = self.client.get_json(&url, &params, &headers).await?;
        self.parse_list(&data, None)
    }

    /// Records of the `data` array, each optionally nested under `key`
    fn parse_list(&self, data: &serde_json::Value, key: Option<&str>) -> Result<Page, SourceError> {
        let items = data
            .get("data")
            .and_then(|d| d.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let paper = match key {
                Some(key) => item.get(key),
                None => Some(item),
            };
            if let Some(paper) = paper.filter(|p| !p.is_null()) {
                records.extend(self.parse_paper(paper.clone())?);
            }
        }
        Ok(Page {
            records,
            fetched: items.len(),
            total: data.get("total").and_then(|t| t.as_u64()).map(|t| t as usize),
        })
    }

    /// Citing papers (`citations`) or cited papers (`references`) of a resolved paper
    async fn linked(
        &self,
        paper_id: &str,
        edge: &str,
        key: &str,
        limit: usize,
        options: &ProviderOptions,
    ) -> Result<Vec<ProviderRecord>, SourceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let params = vec![
            ("fields".to_string(), API_FIELDS.to_string()),
            ("limit".to_string(), limit.min(MAX_LINKS).to_string()),
        ];
        let url = format!("{}/paper/{}/{}", self.base_url, paper_id, edge);
        let data = self.client.get_json(&url, &params, &Self::headers(options)).await?;
        let mut records = self.parse_list(&data, Some(key))?.records;
        records.truncate(limit);
        Ok(records)
    }

    fn year_param(bounds: YearBounds) -> Option<String> {
        match (bounds.min, bounds.max) {
            (Some(lo), Some(hi)) if lo == hi => Some(lo.to_string()),
            (Some(lo), Some(hi)) => Some(format!("{}-{}", lo, hi)),
            (Some(lo), None) => Some(format!("{}-", lo)),
            (None, Some(hi)) => Some(format!("-{}", hi)),
            (None, None) => None,
        }
    }

    fn parse_paper(&self, raw: serde_json::Value) -> Result<Option<ProviderRecord>, SourceError> {
        let paper: S2Paper = serde_json::from_value(raw.clone())?;
        let Some(title) = paper.title.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        let url = paper.url.or_else(|| {
            paper
                .paper_id
                .as_ref()
                .map(|id| format!("https://www.semanticscholar.org/paper/{}", id))
        });
        let doi = paper.external_ids.and_then(|ids| ids.doi);

        let mut builder = ProviderRecord::builder(self.id(), paper.paper_id.unwrap_or_default())
            .title(title)
            .authors(paper.authors.into_iter().filter_map(|a| a.name))
            .keywords(paper.fields_of_study.unwrap_or_default())
            .year(paper.year)
            .doi(doi)
            .url(url)
            .citation_count(paper.citation_count)
            .journal(paper.venue.filter(|v| !v.trim().is_empty()))
            .publication_date(paper.publication_date.as_deref().and_then(|d| d.parse::<NaiveDate>().ok()));
        if let Some(text) = paper.r#abstract {
            builder = builder.abstract_text(text);
        }
        Ok(Some(builder.raw(raw).build()))
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic_scholar"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::FULLTEXT | SourceCapabilities::YEAR_FILTER
    }

    fn max_page_size(&self) -> usize {
        100
    }

    fn max_offset(&self) -> Option<usize> {
        Some(1000)
    }

    /// A lone author predicate is answered by the author endpoints
    fn plan(&self, query: &Query) -> Result<QueryPlan, SourceError> {
        if let Query::Field { field: Field::Author, .. } = query {
            return Ok(QueryPlan {
                native: query.clone(),
                residual: None,
                gaps: vec![CapabilityGap {
                    provider: self.id().to_string(),
                    subtree: query.to_string(),
                    reason: "author resolved to the most cited matching profile".to_string(),
                }],
            });
        }
        QueryPlan::build(self.id(), query, self.capabilities())
    }

    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError> {
        if let Query::Field { field: Field::Author, text } = query {
            return Ok(NativeQuery::new().param("author", text.as_str()));
        }
        let conjuncts = query.conjuncts();
        let mut terms = Vec::new();
        for conjunct in &conjuncts {
            match conjunct {
                Query::Field { field: Field::Fulltext, text } => terms.push(text.as_str()),
                Query::Year { .. } => {}
                other => return Err(unsupported(self.id(), other)),
            }
        }

        // The search endpoint rejects requests without a query string
        if terms.is_empty() {
            return Err(SourceError::Unsupported(format!(
                "{} needs at least one text predicate besides the year range",
                self.id()
            )));
        }

        let mut native = NativeQuery::new().param("query", terms.join(" "));
        if let Some(year) = Self::year_param(YearBounds::from_conjuncts(conjuncts.iter().copied())) {
            native = native.param("year", year);
        }
        Ok(native)
    }

    async fn fetch_page(&self, query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        if let Some(name) = query.get("author") {
            return self.author_page(name, page).await;
        }

        let mut params = query.params.clone();
        params.push(("fields".to_string(), API_FIELDS.to_string()));
        params.push(("offset".to_string(), page.offset.to_string()));
        params.push(("limit".to_string(), page.size.to_string()));

        let url = format!("{}/paper/search", self.base_url);
        let data = self
            .client
            .get_json(&url, &params, &Self::headers(page.options))
            .await?;
        self.parse_list(&data, None)
    }

    fn lookup(&self) -> Option<&dyn PaperLookup> {
        Some(self)
    }
}

#[async_trait]
impl PaperLookup for SemanticScholarSource {
    async fn get(&self, paper_id: &str, options: &ProviderOptions) -> Result<Option<ProviderRecord>, SourceError> {
        let url = format!("{}/paper/{}", self.base_url, Self::normalize_paper_id(paper_id));
        let params = vec![("fields".to_string(), API_FIELDS.to_string())];
        match found(self.client.get_json(&url, &params, &Self::headers(options)).await)? {
            Some(raw) => self.parse_paper(raw),
            None => Ok(None),
        }
    }

    async fn citations(
        &self,
        paper_id: &str,
        direction: CitationDirection,
        max_results: usize,
        options: &ProviderOptions,
    ) -> Result<Vec<ProviderRecord>, SourceError> {
        // Edges are keyed by the Semantic Scholar id, so resolve DOIs first
        let Some(paper) = self.get(paper_id, options).await? else {
            return Ok(Vec::new());
        };
        if paper.native_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        if direction.includes_in() {
            let citing = self
                .linked(&paper.native_id, "citations", "citingPaper", max_results, options)
                .await?;
            records.extend(citing);
        }
        if direction.includes_out() {
            let remaining = max_results.saturating_sub(records.len());
            let cited = self
                .linked(&paper.native_id, "references", "citedPaper", remaining, options)
                .await?;
            records.extend(cited);
        }
        Ok(records)
    }
}

// ===== Semantic Scholar API Types =====

#[derive(Debug, Deserialize)]
struct S2Paper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    r#abstract: Option<String>,
    year: Option<i32>,
    url: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    #[serde(rename = "externalIds")]
    external_ids: Option<S2ExternalIds>,
    #[serde(rename = "fieldsOfStudy")]
    fields_of_study: Option<Vec<String>>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    venue: Option<String>,
    #[serde(rename = "publicationDate")]
    publication_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2AuthorProfile {
    #[serde(rename = "authorId")]
    author_id: Option<String>,
    name: Option<String>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use crate::utils::RetryConfig;

    fn source(base_url: &str) -> SemanticScholarSource {
        let client = HttpClient::new(&HttpConfig::default())
            .unwrap()
            .with_retry(RetryConfig::none());
        SemanticScholarSource::with_client(Arc::new(client), base_url)
    }

    #[test]
    fn test_translate_relaxes_fields() {
        let s = source(SEMANTIC_API_BASE);
        let plan = s
            .plan(&parse("TITLE(transformers) AND AUTHOR(Vaswani) AND PUBYEAR >= 2017").unwrap())
            .unwrap();
        let native = s.translate(&plan.native).unwrap();
        assert_eq!(native.get("query"), Some("transformers Vaswani"));
        assert_eq!(native.get("year"), Some("2017-"));
        assert!(!plan.is_exact());
        assert_eq!(plan.gaps.len(), 2);
    }

    #[test]
    fn test_year_param() {
        let bounds = |q: &str| {
            let q = parse(q).unwrap();
            SemanticScholarSource::year_param(YearBounds::from_conjuncts(q.conjuncts()))
        };
        assert_eq!(bounds("ALL(x) AND PUBYEAR = 2020"), Some("2020".to_string()));
        assert_eq!(bounds("ALL(x) AND PUBYEAR > 2010 AND PUBYEAR < 2015"), Some("2011-2014".to_string()));
        assert_eq!(bounds("ALL(x) AND PUBYEAR <= 1999"), Some("-1999".to_string()));
        assert_eq!(bounds("ALL(x)"), None);
    }

    #[test]
    fn test_year_only_query_is_unsupported() {
        let s = source(SEMANTIC_API_BASE);
        let q = parse("PUBYEAR = 2020").unwrap();
        assert!(matches!(s.translate(&q), Err(SourceError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_api_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/paper/search")
            .match_header("x-api-key", "secret")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("query".into(), "graph".into()),
                mockito::Matcher::UrlEncoded("offset".into(), "0".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "10".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "total": 1,
                  "offset": 0,
                  "data": [{
                    "paperId": "abc123",
                    "title": "Graph Attention Networks",
                    "abstract": null,
                    "year": 2018,
                    "authors": [{"authorId": "1", "name": "Petar Velickovic"}],
                    "externalIds": {"DOI": "10.17863/CAM.48429", "ArXiv": "1710.10903"},
                    "fieldsOfStudy": ["Computer Science"]
                  }, {"paperId": "empty", "title": ""}]
                }"#,
            )
            .create_async()
            .await;

        let s = source(&server.url());
        let native = s.translate(&parse("ALL(graph)").unwrap()).unwrap();
        let options = ProviderOptions::default().with_api_key("secret");
        let page = s
            .fetch_page(&native, &PageRequest { offset: 0, page: 1, size: 10, options: &options })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.total, Some(1));
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.doi.as_deref(), Some("10.17863/CAM.48429"));
        assert_eq!(record.url.as_deref(), Some("https://www.semanticscholar.org/paper/abc123"));
        assert_eq!(record.keywords, vec!["Computer Science"]);
    }

    #[tokio::test]
    async fn test_untitled_entry_does_not_end_paging() {
        use crate::sources::paginate;
        use futures_util::StreamExt;

        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/paper/search")
            .match_query(mockito::Matcher::UrlEncoded("offset".into(), "0".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"total": 4, "data": [
                    {"paperId": "a", "title": "One"},
                    {"paperId": "b", "title": null}
                ]}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/paper/search")
            .match_query(mockito::Matcher::UrlEncoded("offset".into(), "2".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"total": 4, "data": [
                    {"paperId": "c", "title": "Three"},
                    {"paperId": "d", "title": "Four"}
                ]}"#,
            )
            .create_async()
            .await;

        let s = Arc::new(source(&server.url()));
        let plan = s.plan(&parse("ALL(x)").unwrap()).unwrap();
        let options = ProviderOptions::default().with_page_size(2);
        let ids: Vec<String> = paginate::execute(s, plan, options, 100)
            .map(|r| r.unwrap().native_id)
            .collect()
            .await;

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_normalize_paper_id() {
        let n = SemanticScholarSource::normalize_paper_id;
        assert_eq!(n("10.48550/arXiv.1706.03762"), "ARXIV:1706.03762");
        assert_eq!(n("10.48550/ARXIV.1810.04805"), "ARXIV:1810.04805");
        assert_eq!(n(" 10.1038/nature14539 "), "DOI:10.1038/nature14539");
        assert_eq!(n("DOI:10.1038/nature14539"), "DOI:10.1038/nature14539");
        assert_eq!(n("CorpusId:13756489"), "CorpusId:13756489");
        assert_eq!(n("204e3073870fae3d05bcbc2f6a8e263d9b72e776"), "204e3073870fae3d05bcbc2f6a8e263d9b72e776");
    }

    #[tokio::test]
    async fn test_get_by_arxiv_doi() {
        let mut server = mockito::Server::new_async().await;
        let found = server
            .mock("GET", "/paper/ARXIV:1706.03762")
            .match_query(mockito::Matcher::UrlEncoded("fields".into(), API_FIELDS.into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "paperId": "204e3073",
                  "title": "Attention is All you Need",
                  "year": 2017,
                  "authors": [{"name": "Ashish Vaswani"}],
                  "citationCount": 120000,
                  "venue": "Neural Information Processing Systems",
                  "publicationDate": "2017-06-12"
                }"#,
            )
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/paper/DOI:10.1/missing")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": "Paper with id DOI:10.1/missing not found"}"#)
            .create_async()
            .await;

        let s = source(&server.url());
        let options = ProviderOptions::default();
        let record = s.get("10.48550/arXiv.1706.03762", &options).await.unwrap().unwrap();
        assert_eq!(record.native_id, "204e3073");
        assert_eq!(record.citation_count, Some(120_000));
        assert_eq!(record.journal.as_deref(), Some("Neural Information Processing Systems"));
        assert_eq!(record.publication_date, NaiveDate::from_ymd_opt(2017, 6, 12));

        assert!(s.get("10.1/missing", &options).await.unwrap().is_none());
        found.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_citations_follow_both_edges_up_to_cap() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/paper/DOI:10.1/root")
            .match_query(mockito::Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"paperId": "root", "title": "Root", "year": 2017}"#)
            .create_async()
            .await;
        let citations = server
            .mock("GET", "/paper/root/citations")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "3".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"citingPaper": {"paperId": "c1", "title": "Later One", "year": 2019}},
                    {"citingPaper": {"paperId": "c2", "title": null}}
                ]}"#,
            )
            .create_async()
            .await;
        let references = server
            .mock("GET", "/paper/root/references")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "2".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"citedPaper": {"paperId": "r1", "title": "Earlier One", "year": 2014}},
                    {"citedPaper": {"paperId": "r2", "title": "Earlier Two", "year": 2015}}
                ]}"#,
            )
            .create_async()
            .await;

        let s = source(&server.url());
        let records = s
            .citations("10.1/root", CitationDirection::Both, 3, &ProviderOptions::default())
            .await
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.native_id.as_str()).collect();
        assert_eq!(ids, ["c1", "r1", "r2"]);
        citations.assert_async().await;
        references.assert_async().await;
    }

    #[tokio::test]
    async fn test_citations_of_unknown_paper_are_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/paper/nope")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let s = source(&server.url());
        let records = s
            .citations("nope", CitationDirection::In, 10, &ProviderOptions::default())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_author_only_query_uses_author_endpoints() {
        use crate::sources::paginate;
        use futures_util::StreamExt;

        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/author/search")
            .match_query(mockito::Matcher::UrlEncoded("query".into(), "Hinton".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"authorId": "1", "name": "A. Hinton", "citationCount": 12},
                    {"authorId": "1695689", "name": "Geoffrey E. Hinton", "citationCount": 500000}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let first = server
            .mock("GET", "/author/1695689/papers")
            .match_query(mockito::Matcher::UrlEncoded("offset".into(), "0".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"paperId": "a", "title": "Deep learning"},
                    {"paperId": "b", "title": "Dropout"}
                ]}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/author/1695689/papers")
            .match_query(mockito::Matcher::UrlEncoded("offset".into(), "2".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"paperId": "c", "title": "Capsules"}]}"#)
            .create_async()
            .await;

        let s = Arc::new(source(&server.url()));
        let plan = s.plan(&parse("AUTHOR(Hinton)").unwrap()).unwrap();
        assert!(plan.is_exact());
        assert_eq!(plan.gaps.len(), 1);
        assert_eq!(s.translate(&plan.native).unwrap().get("author"), Some("Hinton"));

        let options = ProviderOptions::default().with_page_size(2);
        let ids: Vec<String> = paginate::execute(s, plan, options, 100)
            .map(|r| r.unwrap().native_id)
            .collect()
            .await;

        assert_eq!(ids, vec!["a", "b", "c"]);
        search.assert_async().await;
        first.assert_async().await;
        second.assert_async().await;
    }
}
