//! Core data models for provider records, canonical papers and search results.

mod paper;
mod search;

pub use paper::{IdentityKey, Paper, ProviderRecord, RecordBuilder, SourceRecord};
pub use search::{
    AdapterFailure, OnError, ProviderCounts, ProviderOptions, SearchOptions, SearchResult,
    SearchSummary,
};
