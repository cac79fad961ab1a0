//! Utility modules supporting federated search.
//!
//! - [`normalize`]: map a provider record onto the canonical [`Paper`](crate::models::Paper)
//! - [`IdentityIndex`]: fold papers into a running, first-seen-ordered identity index
//! - [`HttpClient`]: reqwest client with timeouts, rate limiting and retry
//! - [`with_retry`]: execute an operation with automatic retry on transient errors
//!
//! # Deduplication
//!
//! ```rust
//! use scimesh::models::ProviderRecord;
//! use scimesh::utils::{deduplicate, normalize};
//!
//! let a = ProviderRecord::builder("openalex", "W1").title("X").doi(Some("10.1/X".into())).build();
//! let b = ProviderRecord::builder("crossref", "c1").title("X").doi(Some(" 10.1/x".into())).build();
//!
//! let unique = deduplicate([normalize(a), normalize(b)]);
//! assert_eq!(unique.len(), 1);
//! assert_eq!(unique[0].source_records.len(), 2);
//! ```

mod dedup;
mod http;
mod normalize;
pub mod retry;

pub use dedup::{deduplicate, Fold, IdentityIndex};
pub use http::HttpClient;
pub use normalize::{doi_key, normalize, normalize_doi, title_key};
pub use retry::{api_retry_config, with_retry, RetryConfig};
