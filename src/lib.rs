//! # Citation Auditor
//!
//! Verifies that the works a paper cites exist, by matching noisy reference
//! records against bibliographic databases, and judges whether each found
//! citation is relevant to the citing paper.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (CitationRecord, LookupResult, audit types)
//! - [`sources`]: Bibliographic source adapters behind a capability-based trait
//! - [`matching`]: Similarity scoring and relaxed query variants
//! - [`lookup`]: Tiered lookup strategies and the caching orchestrator
//! - [`audit`]: Concurrent audit pipeline with pluggable evaluators
//! - [`utils`]: HTTP client, rate limiting, caching and identifier validation
//! - [`config`]: Configuration management

pub mod audit;
pub mod config;
pub mod lookup;
pub mod matching;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use audit::{Auditor, CitationEvaluator, CitingPaper, KeywordEvaluator};
pub use lookup::CitationLookup;
pub use models::{CitationRecord, LookupResult};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
