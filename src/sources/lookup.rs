//! Single-paper lookup and citation traversal, offered by providers with a citation graph.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Source, SourceError};
use crate::models::{ProviderOptions, ProviderRecord};

/// Which edges of the citation graph to follow from a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationDirection {
    /// Papers citing the given one
    In,
    /// Papers the given one cites
    Out,
    /// Citing papers first, then references
    #[default]
    Both,
}

impl CitationDirection {
    pub fn includes_in(&self) -> bool {
        matches!(self, CitationDirection::In | CitationDirection::Both)
    }

    pub fn includes_out(&self) -> bool {
        matches!(self, CitationDirection::Out | CitationDirection::Both)
    }
}

impl fmt::Display for CitationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CitationDirection::In => "in",
            CitationDirection::Out => "out",
            CitationDirection::Both => "both",
        };
        f.write_str(name)
    }
}

impl FromStr for CitationDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(CitationDirection::In),
            "out" => Ok(CitationDirection::Out),
            "both" => Ok(CitationDirection::Both),
            other => Err(format!("unknown citation direction '{}' (expected in, out or both)", other)),
        }
    }
}

/// Lookup by identifier and citation traversal.
///
/// Identifiers are whatever the provider resolves: a DOI, an arXiv DOI, or the
/// provider's own id. An unknown paper is `Ok(None)` or an empty list, not an error.
#[async_trait]
pub trait PaperLookup: Source {
    /// Fetch one paper
    async fn get(&self, paper_id: &str, options: &ProviderOptions) -> Result<Option<ProviderRecord>, SourceError>;

    /// Papers linked to `paper_id` in `direction`, at most `max_results` of them
    async fn citations(
        &self,
        paper_id: &str,
        direction: CitationDirection,
        max_results: usize,
        options: &ProviderOptions,
    ) -> Result<Vec<ProviderRecord>, SourceError>;
}

/// Turn a 404 into `Ok(None)`
pub(crate) fn found<T>(result: Result<T, SourceError>) -> Result<Option<T>, SourceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SourceError::Api { status: 404, .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parsing() {
        assert_eq!("IN".parse::<CitationDirection>(), Ok(CitationDirection::In));
        assert_eq!(" both ".parse::<CitationDirection>(), Ok(CitationDirection::Both));
        assert!("sideways".parse::<CitationDirection>().is_err());
        assert_eq!(CitationDirection::Out.to_string(), "out");
        assert!(CitationDirection::Both.includes_in() && CitationDirection::Both.includes_out());
        assert!(!CitationDirection::In.includes_out());
    }

    #[test]
    fn test_not_found_is_none() {
        let missing: Result<u8, _> = Err(SourceError::Api {
            status: 404,
            message: "Paper not found".into(),
        });
        assert!(matches!(found(missing), Ok(None)));
        assert!(matches!(found(Ok(3)), Ok(Some(3))));
        assert!(found::<u8>(Err(SourceError::RateLimit { retry_after: None })).is_err());
    }
}
