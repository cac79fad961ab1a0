//! Search options, per-provider accounting and result models.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::models::Paper;
use crate::query::CapabilityGap;
use crate::sources::SourceError;

/// What to do when a provider fails during a federated search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Abort the whole search with the first provider failure
    Fail,
    /// Record the failure and continue with the other providers
    #[default]
    Warn,
    /// Continue silently; failures are only tallied internally
    Ignore,
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OnError::Fail => "fail",
            OnError::Warn => "warn",
            OnError::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

impl FromStr for OnError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(OnError::Fail),
            "warn" => Ok(OnError::Warn),
            "ignore" => Ok(OnError::Ignore),
            other => Err(format!("unknown on_error mode '{}' (expected fail, warn or ignore)", other)),
        }
    }
}

/// Options controlling one federated search invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Cap on records taken from each provider
    pub max_results_per_provider: usize,

    /// Cap on papers emitted overall; reaching it cancels the remaining providers
    pub total_max_results: Option<usize>,

    pub on_error: OnError,

    /// Emit papers incrementally instead of returning one final set
    pub stream: bool,

    /// Collapse records of the same work across providers
    pub dedupe: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results_per_provider: 100,
            total_max_results: None,
            on_error: OnError::Warn,
            stream: false,
            dedupe: true,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-provider cap
    pub fn max_results_per_provider(mut self, max: usize) -> Self {
        self.max_results_per_provider = max;
        self
    }

    /// Set the overall cap
    pub fn total_max_results(mut self, max: usize) -> Self {
        self.total_max_results = Some(max);
        self
    }

    pub fn on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }
}

/// Options for a single selected provider, supplied at call time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Requested page size (clamped to the provider maximum)
    #[serde(default)]
    pub page_size: Option<usize>,

    /// Contact e-mail for polite pools (OpenAlex, CrossRef)
    #[serde(default)]
    pub contact: Option<String>,

    /// API key or token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Client-side request rate limit
    #[serde(default)]
    pub requests_per_second: Option<f32>,
}

impl ProviderOptions {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }
}

/// Per-provider accounting reported with every result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCounts {
    /// The cap requested from the provider
    pub requested: usize,
    /// Records the provider actually contributed
    pub returned: usize,
    /// Failures recorded for the provider
    pub errors: usize,
}

/// A provider failure, contained to that provider unless the search runs with `OnError::Fail`
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("provider '{provider}' failed: {cause}")]
pub struct AdapterFailure {
    pub provider: String,

    #[serde(serialize_with = "serialize_display")]
    pub cause: SourceError,
}

impl AdapterFailure {
    pub fn new(provider: impl Into<String>, cause: SourceError) -> Self {
        Self {
            provider: provider.into(),
            cause,
        }
    }
}

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Final outcome of a federated search
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    /// Papers in first-seen order across providers
    pub papers: Vec<Paper>,

    /// Accounting per selected provider
    pub per_provider: BTreeMap<String, ProviderCounts>,

    /// Provider failures recorded under `OnError::Warn`
    pub failures: Vec<AdapterFailure>,

    /// Subtrees that providers evaluated client-side instead of natively
    pub warnings: Vec<CapabilityGap>,

    /// True when the overall cap cancelled providers that were still running
    pub partial: bool,

    /// Records received from all providers before deduplication
    pub total_records: usize,

    #[serde(skip)]
    pub(crate) suppressed_failures: usize,
}

impl SearchResult {
    /// Summary for export and front-ends
    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            total: self.total_records,
            unique: self.papers.len(),
            per_provider: self.per_provider.clone(),
            partial: self.partial,
        }
    }

    /// Failures swallowed under `OnError::Ignore`
    pub fn suppressed_failures(&self) -> usize {
        self.suppressed_failures
    }

    /// Providers that failed (as recorded under `OnError::Warn`)
    pub fn failed_providers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.provider.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }
}

/// `{total, unique, per_provider}` summary of a finished search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub total: usize,
    pub unique: usize,
    pub per_provider: BTreeMap<String, ProviderCounts>,
    pub partial: bool,
}
