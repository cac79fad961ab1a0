//! Federated search across the selected providers.
//!
//! Every selected provider runs in its own task: the query is planned against the
//! provider's capabilities, paged lazily and normalized as records arrive. Normalized
//! papers flow through one bounded channel into a single merge task, which is the only
//! owner of the identity index and the per-provider accounting. Reaching the overall cap,
//! a failure under [`OnError::Fail`] or dropping a [`SearchStream`] cancels the provider
//! tasks that are still running.

use futures_util::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::models::{AdapterFailure, OnError, Paper, ProviderCounts, ProviderOptions, SearchOptions, SearchResult};
use crate::query::{parse, CapabilityGap, Query, QuerySyntaxError};
use crate::sources::{paginate, Source, SourceError, SourceRegistry};
use crate::utils::{normalize, Fold, IdentityIndex};

/// Papers buffered between the provider tasks and the merge step
const FUNNEL_CAPACITY: usize = 32;

/// Events buffered for a streaming consumer
const EVENT_CAPACITY: usize = 32;

/// Errors that end a federated search
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Query syntax error: {0}")]
    Syntax(#[from] QuerySyntaxError),

    /// First provider failure under [`OnError::Fail`]
    #[error("{0}")]
    Adapter(AdapterFailure),

    #[error("No providers selected")]
    NoProviders,

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    /// A provider or merge task panicked or was torn down unexpectedly
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One item of a streaming search
#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// A paper confirmed unique so far, emitted in first-confirmed order
    Paper(Paper),
    /// A subtree some provider evaluates client-side
    CapabilityGap(CapabilityGap),
}

/// Fans queries out to providers and merges their results
#[derive(Debug, Clone)]
pub struct Federation {
    registry: Arc<SourceRegistry>,
    config: Arc<Config>,
}

impl Federation {
    pub fn new(registry: SourceRegistry, config: Config) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    /// Federation over every compiled-in provider
    pub fn from_config(config: Config) -> Result<Self, SearchError> {
        let registry = SourceRegistry::from_config(&config)
            .map_err(|e| SearchError::Internal(format!("failed to build providers: {}", e)))?;
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a search and return the merged result once every provider is drained
    pub async fn search(
        &self,
        query: &Query,
        providers: &[&str],
        options: &SearchOptions,
    ) -> Result<SearchResult, SearchError> {
        let run = self.start(query, providers, options, None)?;
        let _guard = run.cancel.drop_guard();
        join_merge(run.merge).await
    }

    /// Parse a query string, then [`search`](Self::search)
    pub async fn search_str(
        &self,
        query: &str,
        providers: &[&str],
        options: &SearchOptions,
    ) -> Result<SearchResult, SearchError> {
        let query = parse(query)?;
        self.search(&query, providers, options).await
    }

    /// Run a search, emitting papers as soon as they are confirmed unique.
    ///
    /// Dropping the returned stream cancels the providers still running.
    pub fn search_stream(
        &self,
        query: &Query,
        providers: &[&str],
        options: &SearchOptions,
    ) -> Result<SearchStream, SearchError> {
        let (events_tx, events) = mpsc::channel(EVENT_CAPACITY);
        let run = self.start(query, providers, options, Some(events_tx))?;
        Ok(SearchStream {
            events,
            merge: run.merge,
            guard: run.cancel.drop_guard(),
        })
    }

    /// Parse a query string, then [`search_stream`](Self::search_stream)
    pub fn search_stream_str(
        &self,
        query: &str,
        providers: &[&str],
        options: &SearchOptions,
    ) -> Result<SearchStream, SearchError> {
        let query = parse(query)?;
        self.search_stream(&query, providers, options)
    }

    /// Resolve provider ids; an empty selection falls back to the configured default
    /// list and then to every registered provider
    fn select(&self, providers: &[&str]) -> Result<Vec<Arc<dyn Source>>, SearchError> {
        let mut ids: Vec<&str> = if !providers.is_empty() {
            providers.to_vec()
        } else if !self.config.search.providers.is_empty() {
            self.config.search.providers.iter().map(String::as_str).collect()
        } else {
            self.registry.ids()
        };

        let mut seen = Vec::new();
        ids.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });
        if ids.is_empty() {
            return Err(SearchError::NoProviders);
        }

        ids.into_iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .cloned()
                    .ok_or_else(|| SearchError::UnknownProvider(id.to_string()))
            })
            .collect()
    }

    fn start(
        &self,
        query: &Query,
        providers: &[&str],
        options: &SearchOptions,
        events: Option<mpsc::Sender<Result<SearchEvent, SearchError>>>,
    ) -> Result<Run, SearchError> {
        let sources = self.select(providers)?;
        let cancel = CancellationToken::new();
        let names: Vec<String> = sources.iter().map(|s| s.id().to_string()).collect();
        info!(
            query = %query,
            providers = ?names,
            max_per_provider = options.max_results_per_provider,
            total_max = ?options.total_max_results,
            on_error = %options.on_error,
            "starting federated search"
        );

        let (tx, rx) = mpsc::channel(FUNNEL_CAPACITY);
        let mut tasks = JoinSet::new();
        if options.total_max_results != Some(0) {
            for (slot, source) in sources.into_iter().enumerate() {
                let provider_options = self.config.provider(source.id());
                tasks.spawn(run_provider(
                    slot,
                    source,
                    query.clone(),
                    provider_options,
                    options.max_results_per_provider,
                    tx.clone(),
                    cancel.child_token(),
                ));
            }
        }
        drop(tx);

        let merge = Merge::new(names, options.clone(), cancel.clone(), events);
        let merge = tokio::spawn(merge.run(rx, tasks));
        Ok(Run { cancel, merge })
    }
}

struct Run {
    cancel: CancellationToken,
    merge: JoinHandle<Result<SearchResult, SearchError>>,
}

async fn join_merge(merge: JoinHandle<Result<SearchResult, SearchError>>) -> Result<SearchResult, SearchError> {
    merge
        .await
        .map_err(|e| SearchError::Internal(format!("merge task failed: {}", e)))?
}

/// Streaming search handle.
///
/// Yields [`SearchEvent`]s; an [`OnError::Fail`] failure arrives as a final `Err` item.
/// Call [`finish`](Self::finish) for the complete [`SearchResult`].
pub struct SearchStream {
    events: mpsc::Receiver<Result<SearchEvent, SearchError>>,
    merge: JoinHandle<Result<SearchResult, SearchError>>,
    guard: DropGuard,
}

impl SearchStream {
    /// Drain the remaining events and return the final result with full provenance
    pub async fn finish(self) -> Result<SearchResult, SearchError> {
        let SearchStream {
            mut events,
            merge,
            guard,
        } = self;
        while events.recv().await.is_some() {}
        let result = join_merge(merge).await;
        drop(guard);
        result
    }

    /// Collect the remaining papers, ignoring capability-gap events
    pub async fn papers(mut self) -> Result<Vec<Paper>, SearchError> {
        let mut papers = Vec::new();
        while let Some(event) = self.next().await {
            if let SearchEvent::Paper(paper) = event? {
                papers.push(paper);
            }
        }
        Ok(papers)
    }
}

impl Stream for SearchStream {
    type Item = Result<SearchEvent, SearchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl std::fmt::Debug for SearchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchStream").finish_non_exhaustive()
    }
}

/// What a provider task sends to the merge step
enum Message {
    Paper { slot: usize, paper: Paper },
    Gap(CapabilityGap),
    Failed { slot: usize, error: SourceError },
    Done { slot: usize },
}

/// Plan, page and normalize one provider until exhausted, failed or cancelled
async fn run_provider(
    slot: usize,
    source: Arc<dyn Source>,
    query: Query,
    options: ProviderOptions,
    cap: usize,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    let provider = source.id().to_string();
    let outcome: Result<(), SourceError> = async {
        let plan = source.plan(&query)?;
        for gap in &plan.gaps {
            warn!(provider = %gap.provider, subtree = %gap.subtree, reason = %gap.reason, "capability gap, filtering client-side");
            if tx.send(Message::Gap(gap.clone())).await.is_err() {
                return Ok(());
            }
        }

        let mut records = paginate::execute(source.clone(), plan, options, cap);
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(provider = %provider, "cancelled");
                    return Ok(());
                }
                next = records.next() => next,
            };
            let Some(record) = next else {
                return Ok(());
            };
            let paper = normalize(record?);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                sent = tx.send(Message::Paper { slot, paper }) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
    .await;

    if let Err(error) = outcome {
        if !cancel.is_cancelled() {
            let _ = tx.send(Message::Failed { slot, error }).await;
        }
    }
    let _ = tx.send(Message::Done { slot }).await;
}

/// The single writer: owns the identity index, ordering and accounting
struct Merge {
    names: Vec<String>,
    options: SearchOptions,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<Result<SearchEvent, SearchError>>>,
    index: IdentityIndex,
    undeduplicated: Vec<Paper>,
    result: SearchResult,
    running: usize,
}

impl Merge {
    fn new(
        names: Vec<String>,
        options: SearchOptions,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<Result<SearchEvent, SearchError>>>,
    ) -> Self {
        let requested = options.max_results_per_provider;
        let per_provider: BTreeMap<String, ProviderCounts> = names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    ProviderCounts {
                        requested,
                        ..ProviderCounts::default()
                    },
                )
            })
            .collect();
        let running = if options.total_max_results == Some(0) { 0 } else { names.len() };

        Self {
            names,
            options,
            cancel,
            events,
            index: IdentityIndex::new(),
            undeduplicated: Vec::new(),
            result: SearchResult {
                per_provider,
                ..SearchResult::default()
            },
            running,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Message>, mut tasks: JoinSet<()>) -> Result<SearchResult, SearchError> {
        let mut outcome = Ok(());
        while let Some(message) = rx.recv().await {
            match self.handle(message).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(error) => {
                    outcome = Err(error);
                    break;
                }
            }
        }

        // Unblock senders, stop the remaining providers and wait for them
        self.cancel.cancel();
        drop(rx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() && outcome.is_ok() {
                    outcome = Err(SearchError::Internal(format!("provider task panicked: {}", e)));
                }
            }
        }

        if let Err(error) = outcome {
            self.emit(Err(error.clone())).await;
            return Err(error);
        }

        let mut result = self.result;
        result.papers = if self.options.dedupe {
            self.index.into_papers()
        } else {
            self.undeduplicated
        };
        info!(
            total = result.total_records,
            unique = result.papers.len(),
            failures = result.failures.len(),
            partial = result.partial,
            "federated search finished"
        );
        Ok(result)
    }

    async fn handle(&mut self, message: Message) -> Result<Flow, SearchError> {
        match message {
            Message::Paper { slot, paper } => Ok(self.merge_paper(slot, paper).await),
            Message::Gap(gap) => {
                self.result.warnings.push(gap.clone());
                Ok(self.emit(Ok(SearchEvent::CapabilityGap(gap))).await)
            }
            Message::Failed { slot, error } => self.fail(slot, error),
            Message::Done { slot } => {
                self.running = self.running.saturating_sub(1);
                trace!(provider = %self.names[slot], running = self.running, "provider finished");
                Ok(Flow::Continue)
            }
        }
    }

    async fn merge_paper(&mut self, slot: usize, paper: Paper) -> Flow {
        if let Some(counts) = self.result.per_provider.get_mut(&self.names[slot]) {
            counts.returned += 1;
        }
        self.result.total_records += 1;

        let confirmed = if self.options.dedupe {
            match self.index.fold(paper) {
                Fold::New(idx) => self.index.get(idx).cloned(),
                Fold::Merged(idx) => {
                    trace!(provider = %self.names[slot], idx, "merged duplicate");
                    None
                }
            }
        } else {
            self.undeduplicated.push(paper.clone());
            Some(paper)
        };

        let Some(paper) = confirmed else {
            return Flow::Continue;
        };
        if self.emit(Ok(SearchEvent::Paper(paper))).await == Flow::Stop {
            return Flow::Stop;
        }

        let unique = if self.options.dedupe {
            self.index.len()
        } else {
            self.undeduplicated.len()
        };
        match self.options.total_max_results {
            Some(max) if unique >= max => {
                self.result.partial = self.running > 0;
                debug!(unique, running = self.running, "overall cap reached, cancelling providers");
                self.cancel.cancel();
                Flow::Stop
            }
            _ => Flow::Continue,
        }
    }

    fn fail(&mut self, slot: usize, error: SourceError) -> Result<Flow, SearchError> {
        let failure = AdapterFailure::new(self.names[slot].clone(), error);
        match self.options.on_error {
            OnError::Fail => {
                warn!(error = %failure, "provider failed, aborting search");
                self.cancel.cancel();
                Err(SearchError::Adapter(failure))
            }
            OnError::Warn => {
                warn!(error = %failure, "provider failed, continuing with the others");
                if let Some(counts) = self.result.per_provider.get_mut(&failure.provider) {
                    counts.errors += 1;
                }
                self.result.failures.push(failure);
                Ok(Flow::Continue)
            }
            OnError::Ignore => {
                debug!(error = %failure, "provider failed, ignored");
                self.result.suppressed_failures += 1;
                Ok(Flow::Continue)
            }
        }
    }

    /// Forward an event to a streaming consumer; a vanished consumer stops the search
    async fn emit(&mut self, event: Result<SearchEvent, SearchError>) -> Flow {
        let Some(events) = &self.events else {
            return Flow::Continue;
        };
        if events.send(event).await.is_err() {
            debug!("stream consumer went away, cancelling providers");
            self.events = None;
            self.cancel.cancel();
            return Flow::Stop;
        }
        Flow::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}
