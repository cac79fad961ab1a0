//! OpenAlex source: `/works` with a filter list.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::lookup::found;
use crate::config::HttpConfig;
use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{Field, Query, YearOp};
use crate::sources::{
    unsupported, CitationDirection, NativeQuery, Page, PageRequest, PaperLookup, Source, SourceCapabilities,
    SourceError,
};
use crate::utils::{api_retry_config, normalize_doi, HttpClient};

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

const MAX_PER_PAGE: usize = 200;

/// Most alternatives one `|`-joined filter value may carry
const MAX_FILTER_ALTERNATIVES: usize = 100;

/// OpenAlex research source
///
/// Every supported predicate becomes one entry of the comma-separated `filter`
/// parameter, so only conjunctions are expressible natively.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl OpenAlexSource {
    /// Create a new OpenAlex source
    pub fn new(http: &HttpConfig, options: &ProviderOptions) -> Result<Self, SourceError> {
        let client = HttpClient::new(http)?
            .with_rate_limit(options.requests_per_second)
            .with_retry(api_retry_config());
        Ok(Self::with_client(Arc::new(client), OPENALEX_API_BASE))
    }

    /// Create with a custom HTTP client and endpoint (for testing)
    pub fn with_client(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Commas separate filters and pipes mean OR inside a filter value
    fn filter_value(text: &str) -> String {
        text.replace([',', '|'], " ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn filter(&self, query: &Query) -> Result<String, SourceError> {
        match query {
            Query::Field { field, text } => {
                let key = match field {
                    Field::Title => "title.search",
                    Field::Abstract => "abstract.search",
                    Field::TitleAbs => "title_and_abstract.search",
                    Field::Author => "raw_author_name.search",
                    Field::Fulltext => "default.search",
                    Field::Doi => {
                        let doi = normalize_doi(text).ok_or_else(|| unsupported(self.id(), query))?;
                        return Ok(format!("doi:https://doi.org/{}", doi.to_lowercase()));
                    }
                    _ => return Err(unsupported(self.id(), query)),
                };
                Ok(format!("{}:{}", key, Self::filter_value(text)))
            }
            Query::Year { op, year } => Ok(match op {
                YearOp::Eq => format!("publication_year:{}", year),
                YearOp::Gt => format!("publication_year:>{}", year),
                YearOp::Lt => format!("publication_year:<{}", year),
                YearOp::Gte => format!("publication_year:>{}", year.saturating_sub(1)),
                YearOp::Lte => format!("publication_year:<{}", year.saturating_add(1)),
            }),
            _ => Err(unsupported(self.id(), query)),
        }
    }

    /// Short id (`W2963403868`) from an OpenAlex URL or id
    fn short_id(id: &str) -> &str {
        id.rsplit('/').next().unwrap_or(id)
    }

    /// Path segment addressing one work: `doi:<doi>` for DOIs, the short id otherwise
    fn work_key(paper_id: &str) -> String {
        let id = paper_id.trim();
        if id.contains("openalex.org/") {
            return Self::short_id(id).to_string();
        }
        match normalize_doi(id) {
            Some(doi) => format!("doi:{}", doi),
            None => id.to_string(),
        }
    }

    /// Run one `/works` list request with the polite-pool and key parameters added
    async fn list_works(
        &self,
        mut params: Vec<(String, String)>,
        options: &ProviderOptions,
    ) -> Result<Page, SourceError> {
        if let Some(contact) = &options.contact {
            params.push(("mailto".to_string(), contact.clone()));
        }
        if let Some(key) = &options.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }

        let url = format!("{}/works", self.base_url);
        let data = self.client.get_json(&url, &params, &[]).await?;
        let total = data
            .pointer("/meta/count")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize);
        let results = data
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| SourceError::Parse("OpenAlex response has no results array".to_string()))?;

        let mut records = Vec::with_capacity(results.len());
        for work in results {
            records.extend(self.parse_work(work.clone())?);
        }
        Ok(Page {
            records,
            fetched: results.len(),
            total,
        })
    }

    /// Works whose `cites` filter names `work_id`
    async fn citing(
        &self,
        work_id: &str,
        limit: usize,
        options: &ProviderOptions,
    ) -> Result<Vec<ProviderRecord>, SourceError> {
        let mut records = Vec::new();
        let mut page = 1;
        while records.len() < limit {
            let per_page = (limit - records.len()).min(MAX_PER_PAGE);
            let params = vec![
                ("filter".to_string(), format!("cites:{}", work_id)),
                ("page".to_string(), page.to_string()),
                ("per-page".to_string(), per_page.to_string()),
            ];
            let result = self.list_works(params, options).await?;
            records.extend(result.records);
            if result.fetched < per_page {
                break;
            }
            page += 1;
        }
        records.truncate(limit);
        Ok(records)
    }

    /// The works listed in `referenced_works`, fetched in batches
    async fn referenced(
        &self,
        work: &ProviderRecord,
        limit: usize,
        options: &ProviderOptions,
    ) -> Result<Vec<ProviderRecord>, SourceError> {
        let ids: Vec<&str> = work
            .raw
            .get("referenced_works")
            .and_then(|r| r.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| id.as_str())
            .map(Self::short_id)
            .collect();

        let mut records = Vec::new();
        for batch in ids.chunks(MAX_FILTER_ALTERNATIVES) {
            if records.len() >= limit {
                break;
            }
            let params = vec![
                ("filter".to_string(), format!("openalex:{}", batch.join("|"))),
                ("per-page".to_string(), batch.len().min(MAX_PER_PAGE).to_string()),
            ];
            records.extend(self.list_works(params, options).await?.records);
        }
        records.truncate(limit);
        Ok(records)
    }

    /// Rebuild an abstract from OpenAlex's word → positions index
    fn reconstruct_abstract(index: &HashMap<String, Vec<usize>>) -> String {
        let mut words: Vec<(usize, &str)> = index
            .iter()
            .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
            .collect();
        words.sort_by_key(|(pos, _)| *pos);
        words.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
    }

    fn parse_work(&self, raw: serde_json::Value) -> Result<Option<ProviderRecord>, SourceError> {
        let work: OAWork = serde_json::from_value(raw.clone())?;
        let Some(title) = work.title.or(work.display_name).filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        let native_id = work.id.as_deref().map(Self::short_id).unwrap_or_default().to_string();
        let authors = work
            .authorships
            .iter()
            .filter_map(|a| a.author.display_name.clone())
            .collect::<Vec<_>>();
        let keywords = work
            .keywords
            .iter()
            .chain(work.concepts.iter().take(5))
            .filter_map(|k| k.display_name.clone())
            .collect::<Vec<_>>();
        let (landing_page, journal) = match work.primary_location {
            Some(location) => (location.landing_page_url, location.source.and_then(|s| s.display_name)),
            None => (None, None),
        };
        let url = landing_page.or(work.id);

        let mut builder = ProviderRecord::builder(self.id(), native_id)
            .title(title)
            .authors(authors)
            .keywords(keywords)
            .year(work.publication_year)
            .doi(work.doi)
            .url(url)
            .citation_count(work.cited_by_count)
            .journal(journal)
            .publication_date(work.publication_date.as_deref().and_then(|d| d.parse::<NaiveDate>().ok()));
        if let Some(index) = work.abstract_inverted_index.filter(|i| !i.is_empty()) {
            builder = builder.abstract_text(Self::reconstruct_abstract(&index));
        }
        Ok(Some(builder.raw(raw).build()))
    }
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::TITLE
            | SourceCapabilities::ABSTRACT
            | SourceCapabilities::TITLE_ABS
            | SourceCapabilities::AUTHOR
            | SourceCapabilities::DOI
            | SourceCapabilities::FULLTEXT
            | SourceCapabilities::YEAR_FILTER
    }

    fn max_page_size(&self) -> usize {
        200
    }

    fn default_page_size(&self) -> usize {
        100
    }

    fn max_offset(&self) -> Option<usize> {
        Some(10_000)
    }

    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError> {
        let filters = query
            .conjuncts()
            .into_iter()
            .map(|q| self.filter(q))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NativeQuery::new().param("filter", filters.join(",")))
    }

    async fn fetch_page(&self, query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        let mut params = query.params.clone();
        params.push(("page".to_string(), page.page.to_string()));
        params.push(("per-page".to_string(), page.size.to_string()));
        self.list_works(params, page.options).await
    }

    fn lookup(&self) -> Option<&dyn PaperLookup> {
        Some(self)
    }
}

#[async_trait]
impl PaperLookup for OpenAlexSource {
    async fn get(&self, paper_id: &str, options: &ProviderOptions) -> Result<Option<ProviderRecord>, SourceError> {
        let url = format!("{}/works/{}", self.base_url, Self::work_key(paper_id));
        let mut params = Vec::new();
        if let Some(contact) = &options.contact {
            params.push(("mailto".to_string(), contact.clone()));
        }
        if let Some(key) = &options.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }
        match found(self.client.get_json(&url, &params, &[]).await)? {
            Some(raw) => self.parse_work(raw),
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
        let Some(work) = self.get(paper_id, options).await?.filter(|w| !w.native_id.is_empty()) else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        if direction.includes_in() {
            records.extend(self.citing(&work.native_id, max_results, options).await?);
        }
        if direction.includes_out() {
            let remaining = max_results.saturating_sub(records.len());
            records.extend(self.referenced(&work, remaining, options).await?);
        }
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct OAWork {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    publication_date: Option<String>,
    cited_by_count: Option<u64>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    authorships: Vec<OAAuthorship>,
    #[serde(default)]
    keywords: Vec<OANamed>,
    #[serde(default)]
    concepts: Vec<OANamed>,
    primary_location: Option<OALocation>,
}

#[derive(Debug, Deserialize)]
struct OAAuthorship {
    author: OAAuthor,
}

#[derive(Debug, Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OANamed {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OALocation {
    landing_page_url: Option<String>,
    source: Option<OANamed>,
}
