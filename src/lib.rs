//! # scimesh
//!
//! Federated bibliographic search: write a query once, as a Scopus-style string or with
//! the algebraic builder, and run it concurrently against several academic metadata
//! providers. Results are normalized into one [`Paper`] shape and deduplicated across
//! providers with full provenance.
//!
//! ## Architecture
//!
//! - [`query`]: query tree, string parser, builder and per-provider planning
//! - [`sources`]: provider adapters behind the [`Source`] trait, plus shared paging
//! - [`search`]: the federation orchestrator (concurrency, caps, error policy, streaming)
//! - [`models`]: provider records, canonical papers and search results
//! - [`utils`]: HTTP client, retry, normalization and deduplication
//! - [`config`]: configuration management
//!
//! ```no_run
//! use scimesh::config::Config;
//! use scimesh::models::SearchOptions;
//! use scimesh::search::Federation;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let federation = Federation::from_config(Config::from_env()?)?;
//! let result = federation
//!     .search_str(
//!         "TITLE-ABS(\"graph neural network\") AND PUBYEAR >= 2020",
//!         &["openalex", "arxiv"],
//!         &SearchOptions::default().total_max_results(50),
//!     )
//!     .await?;
//! for paper in &result.papers {
//!     println!("{} {:?}", paper.title, paper.providers());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod models;
pub mod query;
pub mod search;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{Paper, SearchOptions, SearchResult};
pub use query::{parse, Query};
pub use search::{Federation, SearchError, SearchEvent, SearchStream};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
