//! Lazy, capped, post-filtered paging over any [`Source`].

use async_stream::try_stream;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{PageRequest, Source, SourceError};
use crate::models::{ProviderOptions, ProviderRecord};
use crate::query::{matches, QueryPlan};

/// Records of one provider in provider order; ends after the first error
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<ProviderRecord, SourceError>> + Send>>;

/// Execute a planned query against `source`, yielding at most `cap` records.
///
/// Nothing is requested until the stream is polled. Paging stops at the cap, at a short
/// or empty page, at the provider-reported total, or at the provider's deepest offset.
/// Records failing the plan's residual predicate are dropped before they count against
/// the cap. Dropping the stream abandons any request in flight.
pub fn execute(source: Arc<dyn Source>, plan: QueryPlan, options: ProviderOptions, cap: usize) -> RecordStream {
    Box::pin(try_stream! {
        if cap > 0 {
            source.check_credentials(&options)?;
            let native = source.translate(&plan.native)?;
            debug!(provider = source.id(), query = %native, cap, "translated query");

            let page_size = options
                .page_size
                .unwrap_or_else(|| source.default_page_size())
                .clamp(1, source.max_page_size().max(1));

            let mut offset = 0;
            let mut page = 1;
            let mut yielded = 0;

            loop {
                if source.max_offset().is_some_and(|max| offset >= max) {
                    debug!(provider = source.id(), offset, "reached deepest page the provider serves");
                    break;
                }

                let request = PageRequest {
                    offset,
                    page,
                    size: page_size,
                    options: &options,
                };
                trace!(provider = source.id(), offset, size = page_size, "requesting page");
                let result = source.fetch_page(&native, &request).await?;
                let fetched = result.fetched;

                for record in result.records {
                    if let Some(residual) = &plan.residual {
                        if !matches(residual, &record) {
                            trace!(provider = source.id(), id = %record.native_id, "dropped by client-side filter");
                            continue;
                        }
                    }
                    yield record;
                    yielded += 1;
                    if yielded >= cap {
                        break;
                    }
                }

                offset += fetched;
                page += 1;

                if yielded >= cap || fetched < page_size {
                    break;
                }
                if result.total.is_some_and(|total| offset >= total) {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderRecord;
    use crate::query::parse;
    use crate::sources::{MockSource, SourceCapabilities};
    use futures_util::StreamExt;

    fn records(n: usize) -> Vec<ProviderRecord> {
        (0..n)
            .map(|i| {
                ProviderRecord::builder("fixed", i.to_string())
                    .title(if i % 2 == 0 { "even graph" } else { "odd tree" })
                    .year(Some(2000 + i as i32))
                    .build()
            })
            .collect()
    }

    async fn run(source: Arc<MockSource>, query: &str, cap: usize) -> Vec<Result<ProviderRecord, SourceError>> {
        let plan = source.plan(&parse(query).unwrap()).unwrap();
        let options = ProviderOptions::default().with_page_size(4);
        execute(source, plan, options, cap).collect().await
    }

    #[tokio::test]
    async fn test_stops_at_cap() {
        let source = Arc::new(MockSource::builder("fixed").records(records(20)).build());
        let out = run(source.clone(), "ALL(x)", 6).await;
        assert_eq!(out.len(), 6);
        assert_eq!(source.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn test_stops_when_exhausted() {
        let source = Arc::new(MockSource::builder("fixed").records(records(9)).build());
        let out = run(source.clone(), "ALL(x)", 100).await;
        assert_eq!(out.len(), 9);
        assert_eq!(source.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn test_unparseable_entries_do_not_end_paging() {
        let source = Arc::new(
            MockSource::builder("fixed")
                .records(records(10))
                .unparseable([1, 5])
                .build(),
        );
        let out = run(source.clone(), "ALL(x)", 100).await;
        let ids: Vec<String> = out.into_iter().map(|r| r.unwrap().native_id).collect();
        assert_eq!(ids, vec!["0", "2", "3", "4", "6", "7", "8", "9"]);
        assert_eq!(source.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn test_zero_cap_issues_no_request() {
        let source = Arc::new(MockSource::builder("fixed").records(records(9)).build());
        let out = run(source.clone(), "ALL(x)", 0).await;
        assert!(out.is_empty());
        assert_eq!(source.pages_fetched(), 0);
    }

    #[tokio::test]
    async fn test_residual_filter_applies_before_cap() {
        let source = Arc::new(
            MockSource::builder("fixed")
                .capabilities(SourceCapabilities::FULLTEXT)
                .records(records(20))
                .build(),
        );
        let out = run(source, "TITLE(graph) AND PUBYEAR >= 2004", 3).await;
        let ids: Vec<String> = out.into_iter().map(|r| r.unwrap().native_id).collect();
        assert_eq!(ids, vec!["4", "6", "8"]);
    }

    #[tokio::test]
    async fn test_failure_ends_stream() {
        let source = Arc::new(
            MockSource::builder("broken")
                .fail_with(SourceError::Network("connection reset".to_string()))
                .build(),
        );
        let out = run(source, "ALL(x)", 10).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(SourceError::Network(_))));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_fetch() {
        let source = Arc::new(MockSource::builder("locked").require_api_key().records(records(3)).build());
        let out = run(source.clone(), "ALL(x)", 10).await;
        assert!(matches!(out[0], Err(SourceError::MissingCredential(_))));
        assert_eq!(source.pages_fetched(), 0);
    }
}
