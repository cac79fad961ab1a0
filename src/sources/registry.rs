//! Provider capabilities and the static id → adapter mapping.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Source, SourceError};
use crate::config::Config;
use crate::query::Field;

bitflags::bitflags! {
    /// Query constructs a provider evaluates natively
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const TITLE = 1 << 0;
        const ABSTRACT = 1 << 1;
        const KEYWORDS = 1 << 2;
        const TITLE_ABS = 1 << 3;
        const TITLE_ABS_KEY = 1 << 4;
        const AUTHOR = 1 << 5;
        const DOI = 1 << 6;
        const FULLTEXT = 1 << 7;
        const YEAR_FILTER = 1 << 8;
        const NEGATION = 1 << 9;
        const DISJUNCTION = 1 << 10;
    }
}

impl SourceCapabilities {
    /// Capability flag for a field kind
    pub fn for_field(field: Field) -> SourceCapabilities {
        match field {
            Field::Title => SourceCapabilities::TITLE,
            Field::Abstract => SourceCapabilities::ABSTRACT,
            Field::Keywords => SourceCapabilities::KEYWORDS,
            Field::TitleAbs => SourceCapabilities::TITLE_ABS,
            Field::TitleAbsKey => SourceCapabilities::TITLE_ABS_KEY,
            Field::Author => SourceCapabilities::AUTHOR,
            Field::Doi => SourceCapabilities::DOI,
            Field::Fulltext => SourceCapabilities::FULLTEXT,
        }
    }

    pub fn supports_field(&self, field: Field) -> bool {
        self.contains(Self::for_field(field))
    }

    /// Field kinds searchable natively
    pub fn fields(&self) -> Vec<Field> {
        Field::ALL.into_iter().filter(|f| self.supports_field(*f)).collect()
    }
}

/// Registry of available provider adapters
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every compiled-in provider, configured from `config`
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "source-arxiv")]
        registry.register(Arc::new(super::ArxivSource::new(&config.http, &config.provider("arxiv"))?));
        #[cfg(feature = "source-openalex")]
        registry.register(Arc::new(super::OpenAlexSource::new(&config.http, &config.provider("openalex"))?));
        #[cfg(feature = "source-crossref")]
        registry.register(Arc::new(super::CrossRefSource::new(&config.http, &config.provider("crossref"))?));
        #[cfg(feature = "source-semantic")]
        registry.register(Arc::new(super::SemanticScholarSource::new(
            &config.http,
            &config.provider("semantic_scholar"),
        )?));
        #[cfg(feature = "source-scopus")]
        registry.register(Arc::new(super::ScopusSource::new(&config.http, &config.provider("scopus"))?));

        let _ = config;
        Ok(registry)
    }

    /// Register a source, replacing any source with the same id
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Get a source by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id)
            .ok_or_else(|| SourceError::InvalidRequest(format!("Source '{}' not found", id)))
    }

    /// Get all registered sources
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    /// All source IDs, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Get sources that support a specific capability
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<&Arc<dyn Source>> {
        self.all()
            .filter(|s| s.capabilities().contains(capability))
            .collect()
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
