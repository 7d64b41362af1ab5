//! Lookup outcome types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::{CitationRecord, IdentifierKind};

/// Priority band of the strategy that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupTier {
    /// Exact resolution by DOI, PMID or arXiv ID
    Identifier,
    /// Title search with similarity scoring
    Search,
    /// Relaxed retries with lower thresholds
    Fallback,
}

impl LookupTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupTier::Identifier => "identifier",
            LookupTier::Search => "search",
            LookupTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for LookupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag naming the service and strategy that produced a match,
/// e.g. `doi`, `semantic_scholar_pmid`, `crossref_search`, `arxiv_fallback`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTag(String);

impl ServiceTag {
    /// Match through the primary resolver of an identifier kind
    pub fn identifier(kind: IdentifierKind) -> Self {
        Self(kind.as_str().to_string())
    }

    /// Match through a secondary identifier resolver
    pub fn secondary_identifier(service: &str, kind: IdentifierKind) -> Self {
        Self(format!("{}_{}", service, kind.as_str()))
    }

    pub fn search(service: &str) -> Self {
        Self(format!("{}_search", service))
    }

    pub fn fallback(service: &str) -> Self {
        Self(format!("{}_fallback", service))
    }

    pub fn author_year(service: &str) -> Self {
        Self(format!("{}_author_year", service))
    }

    pub fn prefix(service: &str) -> Self {
        Self(format!("{}_prefix", service))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of looking up one citation.
///
/// Built only through [`LookupResult::matched`] or [`LookupResult::not_found`],
/// so a found result always carries a record and a source, and a missing one
/// always has zero confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<CitationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ServiceTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tier: Option<LookupTier>,
    confidence: f64,
    full_text_available: bool,
    details: Map<String, Value>,
}

impl LookupResult {
    /// A successful match. Confidence is clamped to `[0, 1]`.
    pub fn matched(
        record: CitationRecord,
        source: ServiceTag,
        tier: LookupTier,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            found: true,
            record: Some(record),
            source: Some(source),
            tier: Some(tier),
            confidence,
            full_text_available: false,
            details: Map::new(),
        }
    }

    /// No match in any tier
    pub fn not_found() -> Self {
        Self {
            found: false,
            record: None,
            source: None,
            tier: None,
            confidence: 0.0,
            full_text_available: false,
            details: Map::new(),
        }
    }

    /// Attach a diagnostic entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Record full-text availability; ignored for missing results
    pub fn with_full_text(mut self, available: bool) -> Self {
        self.full_text_available = self.found && available;
        self
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn record(&self) -> Option<&CitationRecord> {
        self.record.as_ref()
    }

    pub fn source(&self) -> Option<&ServiceTag> {
        self.source.as_ref()
    }

    pub fn tier(&self) -> Option<LookupTier> {
        self.tier
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn full_text_available(&self) -> bool {
        self.full_text_available
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }
}
