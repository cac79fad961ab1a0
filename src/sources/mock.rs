//! Mock source for tests and offline demos.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::Query;
use crate::sources::{NativeQuery, Page, PageRequest, Source, SourceCapabilities, SourceError};

#[derive(Debug, Clone)]
enum Corpus {
    /// A fixed list served in order
    Fixed(Vec<ProviderRecord>),
    /// An endless run of distinct generated records
    Endless,
}

/// A configurable in-memory source.
///
/// Behavior is fixed at construction through [`MockSourceBuilder`]. Counters record how
/// much work the source did so tests can check that callers stopped paging.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    capabilities: SourceCapabilities,
    corpus: Corpus,
    failure: Option<SourceError>,
    fail_after_pages: usize,
    delay: Duration,
    max_page_size: usize,
    requires_api_key: bool,
    unparseable: Vec<usize>,
    pages_fetched: AtomicUsize,
    records_served: AtomicUsize,
}

impl MockSource {
    /// Start configuring a mock source with the given id
    pub fn builder(id: impl Into<String>) -> MockSourceBuilder {
        MockSourceBuilder::new(id)
    }

    /// Pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    /// Records handed out so far
    pub fn records_served(&self) -> usize {
        self.records_served.load(Ordering::SeqCst)
    }

    fn generated(&self, n: usize) -> ProviderRecord {
        ProviderRecord::builder(self.id.clone(), format!("{}-{}", self.id, n))
            .title(format!("{} result {}", self.id, n))
            .authors([format!("Author {}", n % 7)])
            .year(Some(2000 + (n % 25) as i32))
            .doi(Some(format!("10.5555/{}.{}", self.id, n)))
            .raw(serde_json::json!({ "source": self.id, "n": n }))
            .build()
    }
}

/// Builder for [`MockSource`]
#[derive(Debug, Clone)]
pub struct MockSourceBuilder {
    id: String,
    capabilities: SourceCapabilities,
    corpus: Corpus,
    failure: Option<SourceError>,
    fail_after_pages: usize,
    delay: Duration,
    max_page_size: usize,
    requires_api_key: bool,
    unparseable: Vec<usize>,
}

impl MockSourceBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: SourceCapabilities::all(),
            corpus: Corpus::Fixed(Vec::new()),
            failure: None,
            fail_after_pages: 0,
            delay: Duration::ZERO,
            max_page_size: 100,
            requires_api_key: false,
            unparseable: Vec::new(),
        }
    }

    pub fn capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Serve these records in order
    pub fn records(mut self, records: Vec<ProviderRecord>) -> Self {
        self.corpus = Corpus::Fixed(records);
        self
    }

    /// Serve generated records without end, each with its own DOI
    pub fn endless(mut self) -> Self {
        self.corpus = Corpus::Endless;
        self
    }

    /// Fail every page request with `error`
    pub fn fail_with(mut self, error: SourceError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Serve this many pages successfully before failing
    pub fn fail_after_pages(mut self, pages: usize) -> Self {
        self.fail_after_pages = pages;
        self
    }

    /// Simulated latency of each page request
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Fail with a missing credential unless an API key is supplied
    pub fn require_api_key(mut self) -> Self {
        self.requires_api_key = true;
        self
    }

    /// Positions in the corpus the provider returns but the adapter cannot use,
    /// like an untitled work
    pub fn unparseable(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.unparseable = positions.into_iter().collect();
        self
    }

    pub fn build(self) -> MockSource {
        MockSource {
            id: self.id,
            capabilities: self.capabilities,
            corpus: self.corpus,
            failure: self.failure,
            fail_after_pages: self.fail_after_pages,
            delay: self.delay,
            max_page_size: self.max_page_size,
            requires_api_key: self.requires_api_key,
            unparseable: self.unparseable,
            pages_fetched: AtomicUsize::new(0),
            records_served: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    fn check_credentials(&self, options: &ProviderOptions) -> Result<(), SourceError> {
        if self.requires_api_key && options.api_key.is_none() {
            return Err(SourceError::MissingCredential(format!("{} api key", self.id)));
        }
        Ok(())
    }

    fn translate(&self, query: &Query) -> Result<NativeQuery, SourceError> {
        Ok(NativeQuery::new().param("q", query.to_string()))
    }

    async fn fetch_page(&self, _query: &NativeQuery, page: &PageRequest<'_>) -> Result<Page, SourceError> {
        let fetched = self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            if fetched >= self.fail_after_pages {
                return Err(error.clone());
            }
        }

        let (entries, total): (Vec<(usize, ProviderRecord)>, _) = match &self.corpus {
            Corpus::Fixed(all) => {
                let start = page.offset.min(all.len());
                let end = (page.offset + page.size).min(all.len());
                ((start..end).zip(all[start..end].iter().cloned()).collect(), Some(all.len()))
            }
            Corpus::Endless => (
                (page.offset..page.offset + page.size)
                    .map(|n| (n, self.generated(n)))
                    .collect(),
                None,
            ),
        };
        let fetched = entries.len();
        let records: Vec<ProviderRecord> = entries
            .into_iter()
            .filter(|(n, _)| !self.unparseable.contains(n))
            .map(|(_, record)| record)
            .collect();
        self.records_served.fetch_add(records.len(), Ordering::SeqCst);
        Ok(Page {
            records,
            fetched,
            total,
        })
    }
}
