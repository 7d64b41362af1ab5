//! Audit data model: references, their in-text contexts and verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CitationRecord, LookupResult};

/// Where a citation is used in the citing paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationContext {
    /// Text around the citation marker
    pub surrounding_text: String,

    /// The claim the citation is attached to
    pub claim_statement: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// One entry of a paper's reference list, as extracted upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceEntry {
    /// Citation key, e.g. `ref_12` or `vaswani2017`
    pub key: String,

    /// Raw reference text
    pub original_text: String,

    /// Parsed reference used as the lookup query
    pub record: CitationRecord,

    pub contexts: Vec<CitationContext>,
}

/// Topical relevance on a 0-5 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub score: u8,
    pub explanation: String,

    /// Combined relevance in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_similarity: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_overlap: Option<f64>,
}

/// Whether a citation supports the claim it is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JustificationCheck {
    pub justified: bool,
    pub rationale: String,
}

/// Overall verdict for one citation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStatus {
    Pass,
    Suspect,
    Missing,
}

impl CitationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CitationStatus::Pass => "Pass",
            CitationStatus::Suspect => "Suspect",
            CitationStatus::Missing => "Missing",
        }
    }
}

/// Complete audit result for a citation
#[derive(Debug, Clone, Serialize)]
pub struct CitationAudit {
    pub key: String,
    pub original_text: String,

    /// Catalog record when found, otherwise the query as cited
    pub record: CitationRecord,

    pub contexts: Vec<CitationContext>,
    pub lookup: LookupResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<RelevanceScore>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<JustificationCheck>,

    pub status: CitationStatus,
}

impl CitationAudit {
    /// Derive the verdict: missing when not found, suspect when relevance is
    /// 2 or lower or the claim is unsupported, otherwise pass.
    pub fn derive_status(
        lookup: &LookupResult,
        relevance: Option<&RelevanceScore>,
        justification: Option<&JustificationCheck>,
    ) -> CitationStatus {
        if !lookup.found() {
            return CitationStatus::Missing;
        }
        if relevance.is_some_and(|r| r.score <= 2) {
            return CitationStatus::Suspect;
        }
        if justification.is_some_and(|j| !j.justified) {
            return CitationStatus::Suspect;
        }
        CitationStatus::Pass
    }
}

/// Audit report for a whole paper
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub paper_title: String,
    pub generated_at: DateTime<Utc>,
    pub total_citations: usize,
    pub passed_count: usize,
    pub suspect_count: usize,
    pub missing_count: usize,
    pub citations: Vec<CitationAudit>,
}

impl AuditReport {
    /// Build a report and compute the summary counts
    pub fn new(paper_title: impl Into<String>, citations: Vec<CitationAudit>) -> Self {
        let count = |status: CitationStatus| citations.iter().filter(|c| c.status == status).count();
        Self {
            paper_title: paper_title.into(),
            generated_at: Utc::now(),
            total_citations: citations.len(),
            passed_count: count(CitationStatus::Pass),
            suspect_count: count(CitationStatus::Suspect),
            missing_count: count(CitationStatus::Missing),
            citations,
        }
    }
}
