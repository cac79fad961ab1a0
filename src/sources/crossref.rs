//! CrossRef research source implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

use crate::config::HttpConfig;
use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{conjoin, CapabilityGap, Field, Query, QueryPlan, YearBounds};
use crate::sources::{unsupported, NativeQuery, Page, PageRequest, Source, SourceCapabilities, SourceError};
use crate::utils::{api_retry_config, normalize_doi, HttpClient};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

static JATS_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").ok());

/// CrossRef research source
///
/// Uses the `/works` endpoint: free text goes to `query.bibliographic`, authors to
/// `query.author`, and DOI and publication-date constraints to `filter`.
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl CrossRefSource {
    pub fn new(http: &HttpConfig, options: &ProviderOptions) -> Result<Self, SourceError> {
        let client = HttpClient::new(http)?
            .with_rate_limit(options.requests_per_second)
            .with_retry(api_retry_config());
        Ok(Self::with_client(Arc::new(client), CROSSREF_API_BASE))
    }

    /// Create with a custom HTTP client and endpoint (for testing)
    pub fn with_client(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn strip_markup(text: &str) -> String {
        let text = match JATS_TAG.as_ref() {
            Some(tag) => tag.replace_all(text, " ").into_owned(),
            None => text.to_string(),
        };
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn parse_item(&self, raw: serde_json::Value) -> Result<ProviderRecord, SourceError> {
        let item: CRItem = serde_json::from_value(raw.clone())?;

        let authors = item
            .author
            .iter()
            .filter_map(|a| match (&a.given, &a.family, &a.name) {
                (Some(given), Some(family), _) => Some(format!("{} {}", given, family)),
                (None, Some(family), _) => Some(family.clone()),
                (_, None, Some(name)) => Some(name.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        let issued = item.issued.as_ref().or(item.published.as_ref());
        let year = issued
            .and_then(|d| d.date_parts.first())
            .and_then(|parts| parts.first().copied().flatten());
        let publication_date = issued.and_then(CRDate::full_date);

        let mut builder = ProviderRecord::builder(self.id(), item.doi.clone().unwrap_or_default())
            .authors(authors)
            .keywords(item.subject)
            .year(year)
            .doi(item.doi)
            .url(item.url)
            .citation_count(item.is_referenced_by_count)
            .journal(item.container_title.into_iter().next())
            .publication_date(publication_date);
        if let Some(title) = item.title.into_iter().next() {
            builder = builder.title(title);
        }
        if let Some(text) = item.r#abstract {
            builder = builder.abstract_text(Self::strip_markup(&text));
        }
        Ok(builder.raw(raw).build())
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::AUTHOR
            | SourceCapabilities::DOI
            | SourceCapabilities::FULLTEXT
            | SourceCapabilities::YEAR_FILTER
    }

    fn max_page_size(&self) -> usize {
        1000
    }

    fn default_page_size(&self) -> usize {
        100
    }

    fn max_offset(&self) -> Option<usize> {
        Some(10_000)
    }

    /// `query.author` ranks rather than filters, so author predicates are also
    /// checked on the client
    fn plan(&self, query: &Query) -> Result<QueryPlan, SourceError> {
        let mut plan = QueryPlan::build(self.id(), query, self.capabilities())?;
        let authors: Vec<Query> = plan
            .native
            .conjuncts()
            .into_iter()
            .filter(|q| matches!(q, Query::Field { field: Field::Author, .. }))
            .cloned()
            .collect();
        for author in &authors {
            plan.gaps.push(CapabilityGap {
                provider: self.id().to_string(),
                subtree: author.to_string(),
                reason: "query.author only ranks".to_string(),
            });
        }
        if !authors.is_empty() {
            let mut residual: Vec<Query> = plan.residual.take().into_iter().collect();
            residual.extend(authors);
            plan.residual = conjoin(residual);
        }
        Ok(plan)
    }

    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError> {
        let conjuncts = query.conjuncts();
        let mut bibliographic = Vec::new();
        let mut authors = Vec::new();
        let mut filters = Vec::new();

        for conjunct in &conjuncts {
            match conjunct {
                Query::Field { field: Field::Fulltext, text } => bibliographic.push(text.as_str()),
                Query::Field { field: Field::Author, text } => authors.push(text.as_str()),
                Query::Field { field: Field::Doi, text } => {
                    let doi = normalize_doi(text).ok_or_else(|| unsupported(self.id(), conjunct))?;
                    filters.push(format!("doi:{}", doi));
                }
                Query::Year { .. } => {}
                other => return Err(unsupported(self.id(), other)),
            }
        }

        let bounds = YearBounds::from_conjuncts(conjuncts.iter().copied());
        if let Some(min) = bounds.min {
            filters.push(format!("from-pub-date:{}-01-01", min));
        }
        if let Some(max) = bounds.max {
            filters.push(format!("until-pub-date:{}-12-31", max));
        }

        let mut native = NativeQuery::new();
        if !bibliographic.is_empty() {
            native = native.param("query.bibliographic", bibliographic.join(" "));
        }
        if !authors.is_empty() {
            native = native.param("query.author", authors.join(" "));
        }
        if !filters.is_empty() {
            native = native.param("filter", filters.join(","));
        }
        Ok(native)
    }

    async fn fetch_page(&self, query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        let mut params = query.params.clone();
        params.push(("rows".to_string(), page.size.to_string()));
        params.push(("offset".to_string(), page.offset.to_string()));
        if let Some(contact) = &page.options.contact {
            params.push(("mailto".to_string(), contact.clone()));
        }

        let url = format!("{}/works", self.base_url);
        let data = self.client.get_json(&url, &params, &[]).await?;
        let message = data
            .get("message")
            .ok_or_else(|| SourceError::Parse("CrossRef response has no message".to_string()))?;
        let total = message
            .get("total-results")
            .and_then(|t| t.as_u64())
            .map(|t| t as usize);

        let items = message
            .get("items")
            .and_then(|i| i.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let records = items
            .iter()
            .map(|item| self.parse_item(item.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            records,
            fetched: items.len(),
            total,
        })
    }
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(default)]
    subject: Vec<String>,
    r#abstract: Option<String>,
    issued: Option<CRDate>,
    published: Option<CRDate>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRDate {
    /// The date when year, month and day are all present
    fn full_date(&self) -> Option<NaiveDate> {
        match self.date_parts.first()?.as_slice() {
            [Some(year), Some(month), Some(day), ..] => {
                NaiveDate::from_ymd_opt(*year, u32::try_from(*month).ok()?, u32::try_from(*day).ok()?)
            }
            _ => None,
        }
    }
}
