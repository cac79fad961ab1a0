//! Elsevier Scopus Search API.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::HttpConfig;
use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{Field, Query, YearOp};
use crate::sources::{
    split_conjunction, unsupported, NativeQuery, Page, PageRequest, Source, SourceCapabilities, SourceError,
};
use crate::utils::{api_retry_config, HttpClient};

const SCOPUS_API_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// Scopus research source
///
/// The query language is the one scimesh parses, so the whole tree is sent natively.
/// Requires an Elsevier API key.
#[derive(Debug, Clone)]
pub struct ScopusSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl ScopusSource {
    pub fn new(http: &HttpConfig, options: &ProviderOptions) -> Result<Self, SourceError> {
        let client = HttpClient::new(http)?
            .with_rate_limit(options.requests_per_second)
            .with_retry(api_retry_config());
        Ok(Self::with_client(Arc::new(client), SCOPUS_API_URL))
    }

    /// Create with a custom HTTP client and endpoint (for testing)
    pub fn with_client(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn field_code(field: Field) -> &'static str {
        match field {
            Field::Author => "AUTH",
            other => other.keyword(),
        }
    }

    fn group(&self, query: &Query) -> Result<String, SourceError> {
        let rendered = self.render(query)?;
        Ok(if query.is_leaf() { rendered } else { format!("({})", rendered) })
    }

    fn render(&self, query: &Query) -> Result<String, SourceError> {
        match query {
            Query::Field { field, text } => Ok(format!("{}({})", Self::field_code(*field), text)),
            // PUBYEAR only takes =, > and <
            Query::Year { op, year } => Ok(match op {
                YearOp::Eq => format!("PUBYEAR = {}", year),
                YearOp::Gt => format!("PUBYEAR > {}", year),
                YearOp::Lt => format!("PUBYEAR < {}", year),
                YearOp::Gte => format!("PUBYEAR > {}", year.saturating_sub(1)),
                YearOp::Lte => format!("PUBYEAR < {}", year.saturating_add(1)),
            }),
            Query::And { .. } => {
                let (positive, negative) = split_conjunction(query);
                if positive.is_empty() {
                    return Err(unsupported(self.id(), query));
                }
                let mut parts = Vec::with_capacity(positive.len());
                for part in positive {
                    parts.push(self.group(part)?);
                }
                let mut rendered = parts.join(" AND ");
                for excluded in negative {
                    rendered = format!("{} AND NOT {}", rendered, self.group(excluded)?);
                }
                Ok(rendered)
            }
            Query::Or { left, right } => Ok(format!("{} OR {}", self.group(left)?, self.group(right)?)),
            // Scopus only negates as the right operand of AND NOT
            Query::Not { .. } => Err(unsupported(self.id(), query)),
        }
    }

    fn parse_entry(&self, raw: serde_json::Value) -> Result<Option<ProviderRecord>, SourceError> {
        let entry: ScopusEntry = serde_json::from_value(raw.clone())?;
        if entry.error.is_some() {
            return Ok(None);
        }
        let Some(title) = entry.title.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        let native_id = entry
            .identifier
            .as_deref()
            .map(|id| id.trim_start_matches("SCOPUS_ID:").to_string())
            .or(entry.eid)
            .unwrap_or_default();
        let mut authors: Vec<String> = entry.author.into_iter().filter_map(|a| a.authname).collect();
        if authors.is_empty() {
            authors.extend(entry.creator);
        }
        let keywords = entry
            .authkeywords
            .as_deref()
            .map(|k| {
                k.split('|')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let year = entry
            .cover_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse::<i32>().ok());
        let url = entry
            .link
            .iter()
            .find(|l| l.rel.as_deref() == Some("scopus"))
            .and_then(|l| l.href.clone());

        let mut builder = ProviderRecord::builder(self.id(), native_id)
            .title(title)
            .authors(authors)
            .keywords(keywords)
            .year(year)
            .doi(entry.doi)
            .url(url)
            .journal(entry.publication_name)
            .publication_date(entry.cover_date.as_deref().and_then(|d| d.parse::<NaiveDate>().ok()))
            // Scopus sends the count as a string
            .citation_count(entry.cited_by.as_deref().and_then(|c| c.parse().ok()));
        if let Some(text) = entry.description {
            builder = builder.abstract_text(text);
        }
        Ok(Some(builder.raw(raw).build()))
    }
}

#[async_trait]
impl Source for ScopusSource {
    fn id(&self) -> &str {
        "scopus"
    }

    fn name(&self) -> &str {
        "Scopus"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::all()
    }

    /// The COMPLETE view caps pages at 25
    fn max_page_size(&self) -> usize {
        25
    }

    fn max_offset(&self) -> Option<usize> {
        Some(5000)
    }

    fn check_credentials(&self, options: &ProviderOptions) -> Result<(), SourceError> {
        match &options.api_key {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(SourceError::MissingCredential(
                "scopus requires an Elsevier API key (provider.scopus.api_key or SCIMESH__PROVIDER__SCOPUS__API_KEY)"
                    .to_string(),
            )),
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError> {
        Ok(NativeQuery::new().param("query", self.render(query)?))
    }

    async fn fetch_page(&self, query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        self.check_credentials(page.options)?;
        let api_key = page.options.api_key.clone().unwrap_or_default();

        let mut params = query.params.clone();
        params.push(("start".to_string(), page.offset.to_string()));
        params.push(("count".to_string(), page.size.to_string()));
        params.push(("view".to_string(), "COMPLETE".to_string()));
        let headers = [("X-ELS-APIKey", api_key), ("Accept", "application/json".to_string())];

        let data = self.client.get_json(&self.base_url, &params, &headers).await?;
        let results = data
            .get("search-results")
            .ok_or_else(|| SourceError::Parse("Scopus response has no search-results".to_string()))?;
        let total = results
            .get("opensearch:totalResults")
            .and_then(|t| t.as_str().and_then(|s| s.parse::<usize>().ok()).or(t.as_u64().map(|n| n as usize)));

        let entries = results
            .get("entry")
            .and_then(|e| e.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            records.extend(self.parse_entry(entry.clone())?);
        }
        Ok(Page {
            records,
            fetched: entries.len(),
            total,
        })
    }
}

// ===== Scopus API Types =====

#[derive(Debug, Deserialize)]
struct ScopusEntry {
    error: Option<String>,
    #[serde(rename = "dc:identifier")]
    identifier: Option<String>,
    eid: Option<String>,
    #[serde(rename = "dc:title")]
    title: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    #[serde(rename = "dc:description")]
    description: Option<String>,
    #[serde(rename = "prism:coverDate")]
    cover_date: Option<String>,
    #[serde(rename = "prism:doi")]
    doi: Option<String>,
    #[serde(rename = "prism:publicationName")]
    publication_name: Option<String>,
    #[serde(rename = "citedby-count")]
    cited_by: Option<String>,
    authkeywords: Option<String>,
    #[serde(default)]
    author: Vec<ScopusAuthor>,
    #[serde(default)]
    link: Vec<ScopusLink>,
}

#[derive(Debug, Deserialize)]
struct ScopusAuthor {
    authname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScopusLink {
    #[serde(rename = "@ref")]
    rel: Option<String>,
    #[serde(rename = "@href")]
    href: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use crate::utils::RetryConfig;

    fn source(base_url: &str) -> ScopusSource {
        let client = HttpClient::new(&HttpConfig::default())
            .unwrap()
            .with_retry(RetryConfig::none());
        ScopusSource::with_client(Arc::new(client), base_url)
    }

    fn render(q: &str) -> String {
        let s = source(SCOPUS_API_URL);
        let plan = s.plan(&parse(q).unwrap()).unwrap();
        assert!(plan.is_exact());
        s.translate(&plan.native).unwrap().get("query").unwrap().to_string()
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render("TITLE-ABS-KEY(\"machine learning\") AND AUTHOR(Smith) AND PUBYEAR >= 2020"),
            "TITLE-ABS-KEY(\"machine learning\") AND AUTH(Smith) AND PUBYEAR > 2019"
        );
        assert_eq!(
            render("(TITLE(a) OR ABS(b)) AND NOT KEY(c) AND PUBYEAR <= 2010"),
            "(TITLE(a) OR ABS(b)) AND PUBYEAR < 2011 AND NOT KEY(c)"
        );
        assert_eq!(render("DOI(10.1000/x) OR ALL(y)"), "DOI(10.1000/x) OR ALL(y)");
    }

    #[test]
    fn test_bare_negation_is_unsupported() {
        let s = source(SCOPUS_API_URL);
        let q = parse("NOT TITLE(a)").unwrap();
        assert!(matches!(s.translate(&q), Err(SourceError::Unsupported(_))));
    }

    #[test]
    fn test_nested_negation_is_filtered_locally() {
        let s = source(SCOPUS_API_URL);
        let plan = s
            .plan(&parse("ALL(x) AND (TITLE(a) OR NOT TITLE(b)) AND NOT KEY(c)").unwrap())
            .unwrap();
        assert_eq!(plan.residual, Some(parse("TITLE(a) OR NOT TITLE(b)").unwrap()));
        assert_eq!(
            s.translate(&plan.native).unwrap().get("query"),
            Some("ALL(x) AND NOT KEY(c)")
        );
    }

    #[test]
    fn test_requires_api_key() {
        let s = source(SCOPUS_API_URL);
        assert!(matches!(
            s.check_credentials(&ProviderOptions::default()),
            Err(SourceError::MissingCredential(_))
        ));
        assert!(s
            .check_credentials(&ProviderOptions::default().with_api_key("k"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_fetch_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("X-ELS-APIKey", "key123")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("query".into(), "TITLE(graphene)".into()),
                mockito::Matcher::UrlEncoded("start".into(), "25".into()),
                mockito::Matcher::UrlEncoded("count".into(), "25".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "search-results": {
                    "opensearch:totalResults": "26",
                    "entry": [{
                      "dc:identifier": "SCOPUS_ID:85012345678",
                      "eid": "2-s2.0-85012345678",
                      "dc:title": "Graphene electronics",
                      "dc:creator": "Geim A.",
                      "author": [{"authname": "Geim A."}, {"authname": "Novoselov K."}],
                      "prism:coverDate": "2019-03-01",
                      "prism:publicationName": "Nature Materials",
                      "citedby-count": "1234",
                      "prism:doi": "10.1000/graphene",
                      "authkeywords": "graphene | 2D materials",
                      "link": [{"@ref": "self", "@href": "https://api.elsevier.com/x"},
                               {"@ref": "scopus", "@href": "https://www.scopus.com/record"}]
                    }]
                  }
                }"#,
            )
            .create_async()
            .await;

        let base = format!("{}/", server.url());
        let s = source(&base);
        let native = s.translate(&parse("TITLE(graphene)").unwrap()).unwrap();
        let options = ProviderOptions::default().with_api_key("key123");
        let page = s
            .fetch_page(&native, &PageRequest { offset: 25, page: 2, size: 25, options: &options })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.total, Some(26));
        let record = &page.records[0];
        assert_eq!(record.native_id, "85012345678");
        assert_eq!(record.authors, vec!["Geim A.", "Novoselov K."]);
        assert_eq!(record.keywords, vec!["graphene", "2D materials"]);
        assert_eq!(record.year, Some(2019));
        assert_eq!(record.publication_date, NaiveDate::from_ymd_opt(2019, 3, 1));
        assert_eq!(record.journal.as_deref(), Some("Nature Materials"));
        assert_eq!(record.citation_count, Some(1234));
        assert_eq!(record.url.as_deref(), Some("https://www.scopus.com/record"));
    }

    #[tokio::test]
    async fn test_empty_result_entry_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"search-results": {"opensearch:totalResults": "0", "entry": [{"@_fa": "true", "error": "Result set was empty"}]}}"#)
            .create_async()
            .await;

        let s = source(&format!("{}/", server.url()));
        let options = ProviderOptions::default().with_api_key("key");
        let page = s
            .fetch_page(&NativeQuery::new().param("query", "ALL(x)"), &PageRequest { offset: 0, page: 1, size: 25, options: &options })
            .await
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, Some(0));
    }
}
