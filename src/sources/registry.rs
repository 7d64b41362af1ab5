//! Registry for managing bibliographic source adapters.

use std::sync::Arc;

use super::{
    ArxivSource, CrossRefSource, OpenAlexSource, PubMedSource, SemanticScholarSource, Source,
    SourceError, WebSearchSource,
};
use crate::config::Config;
use crate::models::IdentifierKind;
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
        const PMID_LOOKUP = 1 << 2;
        const ARXIV_LOOKUP = 1 << 3;
        const AUTHOR_SEARCH = 1 << 4;
        /// Search can be restricted to a DOI registrant prefix
        const PREFIX_SEARCH = 1 << 5;
        /// Slow or scraping-based; used only by fallback strategies
        const SLOW = 1 << 6;
    }
}

impl SourceCapabilities {
    /// Capability needed to resolve an identifier kind
    pub fn for_identifier(kind: IdentifierKind) -> Self {
        match kind {
            IdentifierKind::Doi => Self::DOI_LOOKUP,
            IdentifierKind::Pmid => Self::PMID_LOOKUP,
            IdentifierKind::Arxiv => Self::ARXIV_LOOKUP,
        }
    }
}

/// Ordered collection of sources.
///
/// Registration order is priority order: strategies walk sources front to
/// back, and the first source resolving an identifier kind is its primary
/// resolver.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in sources allowed by `config`.
    ///
    /// Disabled or misconfigured sources are skipped and logged once here,
    /// never retried per call.
    pub fn from_config(config: &Config, client: Arc<HttpClient>) -> Self {
        let mut registry = Self::new();
        let sources = &config.sources;
        let mailto = config.http.mailto.clone();

        let candidates: Vec<(&str, Result<Arc<dyn Source>, SourceError>)> = vec![
            (
                "crossref",
                CrossRefSource::new(Arc::clone(&client))
                    .with_mailto(mailto.clone())
                    .with_base_url_opt(sources.base_url("crossref"))
                    .map(|s| Arc::new(s) as Arc<dyn Source>),
            ),
            (
                "pubmed",
                PubMedSource::new(Arc::clone(&client))
                    .with_api_key(config.api_keys.ncbi.clone())
                    .with_base_url_opt(sources.base_url("pubmed"))
                    .map(|s| Arc::new(s) as Arc<dyn Source>),
            ),
            (
                "arxiv",
                ArxivSource::new(Arc::clone(&client))
                    .with_base_url_opt(sources.base_url("arxiv"))
                    .map(|s| Arc::new(s) as Arc<dyn Source>),
            ),
            (
                "semantic_scholar",
                SemanticScholarSource::new(Arc::clone(&client))
                    .with_api_key(config.api_keys.semantic_scholar.clone())
                    .with_base_url_opt(sources.base_url("semantic_scholar"))
                    .map(|s| Arc::new(s) as Arc<dyn Source>),
            ),
            (
                "openalex",
                OpenAlexSource::new(Arc::clone(&client))
                    .with_mailto(mailto)
                    .with_base_url_opt(sources.base_url("openalex"))
                    .map(|s| Arc::new(s) as Arc<dyn Source>),
            ),
            (
                "web",
                if sources.web_search_enabled {
                    WebSearchSource::new(Arc::clone(&client))
                        .with_base_url_opt(sources.base_url("web"))
                        .map(|s| Arc::new(s) as Arc<dyn Source>)
                } else {
                    Err(SourceError::Configuration(
                        "web search is disabled".to_string(),
                    ))
                },
            ),
        ];

        for (id, candidate) in candidates {
            if sources.is_disabled(id) {
                tracing::info!("Source '{}' disabled by configuration", id);
                continue;
            }
            match candidate {
                Ok(source) => registry.register(source),
                Err(e) => tracing::warn!("Skipping source '{}': {}", id, e),
            }
        }

        tracing::debug!(
            "Registered sources: {}",
            registry.ids().collect::<Vec<_>>().join(", ")
        );
        registry
    }

    /// Register a source at the lowest priority.
    ///
    /// A source with an already registered ID replaces it in place.
    pub fn register(&mut self, source: Arc<dyn Source>) {
        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(index) => self.sources[index] = source,
            None => self.sources.push(source),
        }
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// Get a source by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id)
            .ok_or_else(|| SourceError::NotFound(format!("Source '{}' not found", id)))
    }

    /// All sources in priority order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    /// Source IDs in priority order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id())
    }

    /// Sources that support a specific capability, in priority order
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<&Arc<dyn Source>> {
        self.all()
            .filter(|s| s.capabilities().contains(capability))
            .collect()
    }

    /// Sources that resolve an identifier kind; the first is the primary
    pub fn resolvers(&self, kind: IdentifierKind) -> Vec<&Arc<dyn Source>> {
        self.with_capability(SourceCapabilities::for_identifier(kind))
    }

    /// First source able to resolve an identifier kind
    pub fn primary_for(&self, kind: IdentifierKind) -> Option<&Arc<dyn Source>> {
        self.resolvers(kind).into_iter().next()
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
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
