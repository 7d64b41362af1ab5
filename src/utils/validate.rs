//! Identifier validation and normalization.
//!
//! Citation identifiers arrive in many shapes (`doi:` prefixes, resolver URLs,
//! versioned arXiv IDs). These helpers reduce them to the canonical form used
//! for cache keys and API requests.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Validation error types
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),

    #[error("Invalid PMID: {0}")]
    InvalidPmid(String),

    #[error("Invalid arXiv ID: {0}")]
    InvalidArxivId(String),
}

fn arxiv_new_style() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}\.\d{4,5}$").expect("valid regex"))
}

fn arxiv_old_style() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z\-]+(\.[a-z]{2})?/\d{7}$").expect("valid regex"))
}

/// Validate and normalize a DOI
///
/// DOIs have the format "10.xxxx/xxxxxx" where xxxx is a registrant code
/// and xxxxxx is an item ID. The result is lowercased with any `doi:` or
/// resolver URL prefix removed.
pub fn validate_doi(doi: &str) -> Result<String, ValidationError> {
    let doi = doi.trim().to_lowercase();

    if doi.is_empty() {
        return Err(ValidationError::InvalidDoi("empty DOI".to_string()));
    }

    // Remove any URL prefix if present first
    let doi = doi.strip_prefix("doi:").unwrap_or(&doi).trim();
    let doi = doi.strip_prefix("https://doi.org/").unwrap_or(doi);
    let doi = doi.strip_prefix("http://doi.org/").unwrap_or(doi);
    let doi = doi.strip_prefix("https://dx.doi.org/").unwrap_or(doi);
    let doi = doi.strip_prefix("http://dx.doi.org/").unwrap_or(doi);

    // DOI must start with "10."
    if !doi.starts_with("10.") {
        return Err(ValidationError::InvalidDoi(
            "DOI must start with '10.'".to_string(),
        ));
    }

    // DOI must contain a slash after the prefix
    if !doi.contains('/') {
        return Err(ValidationError::InvalidDoi(
            "DOI must contain a slash".to_string(),
        ));
    }

    if doi.contains("..") || doi.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidDoi(format!(
            "malformed DOI: {}",
            doi
        )));
    }

    Ok(doi.to_string())
}

/// Registrant prefix of a DOI (`10.1038` for `10.1038/nature14539`)
pub fn doi_prefix(doi: &str) -> Option<String> {
    let doi = validate_doi(doi).ok()?;
    doi.split('/').next().map(|p| p.to_string())
}

/// Validate a PubMed identifier: digits only, optional `pmid:` prefix
pub fn validate_pmid(pmid: &str) -> Result<String, ValidationError> {
    let pmid = pmid.trim();
    let pmid = pmid
        .strip_prefix("PMID:")
        .or_else(|| pmid.strip_prefix("pmid:"))
        .unwrap_or(pmid)
        .trim();

    if pmid.is_empty() || !pmid.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPmid(pmid.to_string()));
    }

    Ok(pmid.to_string())
}

/// Validate and normalize an arXiv identifier
///
/// Handles formats like:
/// - "1706.03762"
/// - "1706.03762v5" (version is stripped)
/// - "arXiv:1706.03762"
/// - "https://arxiv.org/abs/1706.03762v5"
/// - "hep-th/9901001" (old-style)
pub fn validate_arxiv_id(id: &str) -> Result<String, ValidationError> {
    let lowered = id.trim().to_lowercase();

    let id = match lowered.find("/abs/") {
        Some(pos) => &lowered[pos + 5..],
        None => lowered.as_str(),
    };
    let id = id.strip_prefix("arxiv:").unwrap_or(id).trim();
    let id = id.trim_end_matches(".pdf");
    let id = strip_version(id);

    if arxiv_new_style().is_match(id) || arxiv_old_style().is_match(id) {
        Ok(id.to_string())
    } else {
        Err(ValidationError::InvalidArxivId(id.to_string()))
    }
}

fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos)
            if pos + 1 < id.len() && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    }
}
