//! Utility modules supporting citation lookups.
//!
//! - [`HttpClient`]: rate-limited HTTP client that logs every call
//! - [`RateLimiter`]: per-service minimum spacing between calls
//! - [`LookupCache`]: TTL + LRU cache of lookup results keyed by [`fingerprint`]
//! - [`ApiCallLog`]: structured record of outbound API calls
//! - [`validate_doi`], [`validate_pmid`], [`validate_arxiv_id`]: identifier normalization
//!
//! # Rate-limited fetch
//!
//! ```rust,no_run
//! use citation_auditor::utils::{ApiRequest, HttpClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let request = ApiRequest::get("crossref", "https://api.crossref.org/works")
//!     .param("query.bibliographic", "deep learning")
//!     .param("rows", 5);
//! let body: Vec<String> = client.fetch(&request, |body| Ok(vec![body.to_string()])).await?;
//! # Ok(())
//! # }
//! ```

mod api_log;
mod cache;
mod http;
mod rate_limit;
mod validate;

pub use api_log::{ApiCallLog, ApiCallRecord, API_LOG_TARGET};
pub use cache::{fingerprint, CachedLookup, LookupCache};
pub use http::{ApiRequest, HttpClient, ResultCount};
pub use rate_limit::RateLimiter;
pub use validate::{doi_prefix, validate_arxiv_id, validate_doi, validate_pmid, ValidationError};
