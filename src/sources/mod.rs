//! Provider adapters behind one capability-described trait.
//!
//! This module defines the [`Source`] trait that every bibliographic provider implements.
//! An adapter declares which query constructs it can evaluate natively, translates the
//! natively searchable part of a query into request parameters, and fetches one page of
//! records at a time. Pagination, capping and client-side post-filtering are shared and
//! live in [`paginate`]. Adding a provider means implementing `translate` and
//! `fetch_page` and registering it with the [`SourceRegistry`]. Providers with a
//! citation graph also implement [`PaperLookup`].
//!
//! # Feature Flags
//!
//! Individual providers can be disabled at compile time using Cargo features:
//!
//! - `arxiv` - arXiv Atom API (default: enabled)
//! - `openalex` - OpenAlex works API (default: enabled)
//! - `crossref` - CrossRef REST API (default: enabled)
//! - `semantic` - Semantic Scholar Graph API (default: enabled)
//! - `scopus` - Elsevier Scopus Search API, requires an API key (default: enabled)
//!
//! # Feature Groups
//!
//! - `open` - every provider that needs no credential
//! - `full` - all providers (default)

#[cfg(feature = "source-arxiv")]
mod arxiv;
#[cfg(feature = "source-crossref")]
mod crossref;
mod lookup;
#[cfg(feature = "source-openalex")]
mod openalex;
pub mod paginate;
mod registry;
#[cfg(feature = "source-scopus")]
mod scopus;
#[cfg(feature = "source-semantic")]
mod semantic;

pub mod mock;

#[cfg(feature = "source-arxiv")]
pub use arxiv::ArxivSource;
#[cfg(feature = "source-crossref")]
pub use crossref::CrossRefSource;
pub use lookup::{CitationDirection, PaperLookup};
pub use mock::MockSource;
#[cfg(feature = "source-openalex")]
pub use openalex::OpenAlexSource;
pub use paginate::RecordStream;
pub use registry::{SourceCapabilities, SourceRegistry};
#[cfg(feature = "source-scopus")]
pub use scopus::ScopusSource;
#[cfg(feature = "source-semantic")]
pub use semantic::SemanticScholarSource;

use async_trait::async_trait;
use std::fmt;

use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{Query, QueryPlan};

/// Provider-native request parameters produced by [`Source::translate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeQuery {
    pub params: Vec<(String, String)>,
}

impl NativeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for NativeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Which page to fetch
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// Zero-based offset of the first record
    pub offset: usize,
    /// One-based page number, for providers that page by number
    pub page: usize,
    pub size: usize,
    pub options: &'a ProviderOptions,
}

/// One page of provider records
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<ProviderRecord>,
    /// Entries the provider returned, including ones dropped while parsing.
    /// Paging advances by this count.
    pub fetched: usize,
    /// Total hits reported by the provider, when it reports one
    pub total: Option<usize>,
}

/// The contract every provider adapter implements.
///
/// # Implementing a New Source
///
/// 1. Declare the [`SourceCapabilities`] the provider's query language covers
/// 2. Implement `translate` for queries made only of those constructs
/// 3. Implement `fetch_page` to run a translated query for one page
/// 4. Register the adapter with [`SourceRegistry`]
#[async_trait]
pub trait Source: Send + Sync + fmt::Debug {
    /// Unique identifier ("arxiv", "openalex", ...)
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Query constructs the provider evaluates natively
    fn capabilities(&self) -> SourceCapabilities;

    /// Largest page the provider serves
    fn max_page_size(&self) -> usize {
        100
    }

    /// Page size used when the caller does not ask for one
    fn default_page_size(&self) -> usize {
        self.max_page_size()
    }

    /// Deepest offset the provider pages to, if bounded
    fn max_offset(&self) -> Option<usize> {
        None
    }

    /// Fail early when a required credential is missing
    fn check_credentials(&self, _options: &ProviderOptions) -> Result<(), SourceError> {
        Ok(())
    }

    /// Split `query` into a native part and a client-side residual
    fn plan(&self, query: &Query) -> Result<QueryPlan, SourceError> {
        QueryPlan::build(self.id(), query, self.capabilities())
    }

    /// Translate a query built only from supported constructs
    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError>;

    /// Run a translated query for one page
    async fn fetch_page(&self, query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError>;

    /// Paper lookup and citation traversal, for providers that offer them
    fn lookup(&self) -> Option<&dyn PaperLookup> {
        None
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Malformed response (JSON, Atom, unexpected shape)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Non-success HTTP status from the provider
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    /// Credential rejected by the provider
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A credential the provider requires was not supplied
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Nothing in the query is natively searchable by the provider
    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

/// Split a conjunction into positive and negated conjuncts
pub(crate) fn split_conjunction(query: &Query) -> (Vec<&Query>, Vec<&Query>) {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for conjunct in query.conjuncts() {
        match conjunct {
            Query::Not { operand } => negative.push(operand.as_ref()),
            other => positive.push(other),
        }
    }
    (positive, negative)
}

/// Error for a construct an adapter's translator cannot express
pub(crate) fn unsupported(provider: &str, query: &Query) -> SourceError {
    SourceError::Unsupported(format!("{} cannot express '{}'", provider, query))
}
