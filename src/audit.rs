//! Citation audit pipeline.
//!
//! Each [`ReferenceEntry`] is looked up, then a [`CitationEvaluator`] judges
//! whether the cited work is relevant to the citing paper and whether it
//! supports the claims it is attached to. Entries are processed concurrently
//! up to `audit.max_concurrent`.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::Config;
use crate::lookup::CitationLookup;
use crate::matching::{normalize_title, title_similarity};
use crate::models::{
    AuditReport, CitationAudit, CitationContext, CitationRecord, JustificationCheck,
    ReferenceEntry, RelevanceScore,
};

/// Fraction of a claim's keywords that must appear in the cited work
const JUSTIFICATION_THRESHOLD: f64 = 0.2;

/// Words too generic to signal topical overlap
const GENERIC_WORDS: &[&str] = &[
    "paper", "study", "studies", "research", "analysis", "using", "based", "approach", "about",
    "their", "there", "these", "those", "which", "where", "while", "within", "without", "other",
    "shown", "shows", "results", "between", "through", "however", "although",
];

/// The paper whose citations are being audited
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitingPaper {
    pub title: String,
    pub abstract_text: Option<String>,
}

impl CitingPaper {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            abstract_text: None,
        }
    }

    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        let abstract_text = abstract_text.into();
        self.abstract_text = (!abstract_text.trim().is_empty()).then_some(abstract_text);
        self
    }

    fn text(&self) -> String {
        match &self.abstract_text {
            Some(a) => format!("{} {}", self.title, a),
            None => self.title.clone(),
        }
    }
}

/// Judges a found citation against the citing paper
#[async_trait]
pub trait CitationEvaluator: Send + Sync {
    /// Topical relevance of `cited` to `paper`
    async fn relevance(
        &self,
        paper: &CitingPaper,
        cited: &CitationRecord,
        contexts: &[CitationContext],
    ) -> RelevanceScore;

    /// Whether `cited` supports the claims in `contexts`. `None` when there
    /// is nothing to check.
    async fn justification(
        &self,
        cited: &CitationRecord,
        contexts: &[CitationContext],
    ) -> Option<JustificationCheck>;
}

/// Lowercased content words longer than four characters
fn keywords(text: &str) -> BTreeSet<String> {
    normalize_title(text)
        .split_whitespace()
        .filter(|w| w.chars().count() > 4 && !GENERIC_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Overlap coefficient: shared keywords over the smaller set
fn overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Option<f64> {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return None;
    }
    Some(a.intersection(b).count() as f64 / smaller as f64)
}

/// Evaluator based on keyword overlap and title similarity. No network.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordEvaluator;

impl KeywordEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn cited_keywords(cited: &CitationRecord) -> BTreeSet<String> {
        let mut text = cited.title.clone().unwrap_or_default();
        if let Some(a) = &cited.abstract_text {
            text.push(' ');
            text.push_str(a);
        }
        keywords(&text)
    }
}

#[async_trait]
impl CitationEvaluator for KeywordEvaluator {
    async fn relevance(
        &self,
        paper: &CitingPaper,
        cited: &CitationRecord,
        contexts: &[CitationContext],
    ) -> RelevanceScore {
        let cited_keywords = Self::cited_keywords(cited);

        let title_sim = cited
            .title_text()
            .and_then(|t| title_similarity(&paper.title, t));
        let keyword_overlap = overlap(&keywords(&paper.text()), &cited_keywords);

        let context_text = contexts
            .iter()
            .map(|c| format!("{} {}", c.surrounding_text, c.claim_statement))
            .collect::<Vec<_>>()
            .join(" ");
        let context_overlap = overlap(&keywords(&context_text), &cited_keywords);

        let components = [
            (title_sim, 0.3),
            (keyword_overlap, 0.4),
            (context_overlap, 0.3),
        ];
        let (weighted, weights) = components
            .iter()
            .filter_map(|(value, weight)| value.map(|v| (v * weight, *weight)))
            .fold((0.0, 0.0), |(s, w), (v, weight)| (s + v, w + weight));
        let overall = if weights > 0.0 { weighted / weights } else { 0.0 };

        let score = (overall * 5.0).round().clamp(0.0, 5.0) as u8;
        let explanation = match score {
            4..=5 => "Strong topical overlap with the citing paper",
            3 => "Moderate topical overlap with the citing paper",
            1..=2 => "Weak topical overlap with the citing paper",
            _ => "No measurable topical overlap with the citing paper",
        };

        RelevanceScore {
            score,
            explanation: explanation.to_string(),
            overall_score: Some(overall),
            title_similarity: title_sim,
            keyword_overlap,
        }
    }

    async fn justification(
        &self,
        cited: &CitationRecord,
        contexts: &[CitationContext],
    ) -> Option<JustificationCheck> {
        let cited_keywords = Self::cited_keywords(cited);

        let mut best: Option<(f64, Vec<String>)> = None;
        for context in contexts {
            let claim = keywords(&context.claim_statement);
            if claim.is_empty() {
                continue;
            }
            let shared: Vec<String> = claim.intersection(&cited_keywords).cloned().collect();
            let support = shared.len() as f64 / claim.len() as f64;
            if best.as_ref().map_or(true, |(s, _)| support > *s) {
                best = Some((support, shared));
            }
        }

        let (support, shared) = best?;
        let justified = support >= JUSTIFICATION_THRESHOLD;
        let rationale = if shared.is_empty() {
            "The cited work shares no key terms with the claim".to_string()
        } else {
            format!(
                "{:.0}% of the claim's key terms appear in the cited work: {}",
                support * 100.0,
                shared.join(", ")
            )
        };
        Some(JustificationCheck {
            justified,
            rationale,
        })
    }
}

/// Runs lookups and evaluations over a paper's reference list
#[derive(Clone)]
pub struct Auditor {
    lookup: CitationLookup,
    evaluator: Arc<dyn CitationEvaluator>,
    max_concurrent: usize,
    enable_fallbacks: bool,
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("lookup", &self.lookup)
            .field("max_concurrent", &self.max_concurrent)
            .field("enable_fallbacks", &self.enable_fallbacks)
            .finish()
    }
}

impl Auditor {
    /// Auditor with the keyword evaluator and limits from `config`
    pub fn new(lookup: CitationLookup, config: &Config) -> Self {
        Self {
            lookup,
            evaluator: Arc::new(KeywordEvaluator::new()),
            max_concurrent: config.audit.max_concurrent,
            enable_fallbacks: config.lookup.enable_fallbacks,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn CitationEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_fallbacks(mut self, enable_fallbacks: bool) -> Self {
        self.enable_fallbacks = enable_fallbacks;
        self
    }

    pub fn lookup(&self) -> &CitationLookup {
        &self.lookup
    }

    /// Audit every entry. Citations in the report keep the input order.
    pub async fn audit(&self, paper: &CitingPaper, entries: Vec<ReferenceEntry>) -> AuditReport {
        tracing::info!(
            "Auditing {} citations of \"{}\" ({} at a time)",
            entries.len(),
            paper.title,
            self.max_concurrent.max(1)
        );

        let mut audits: Vec<(usize, CitationAudit)> = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| async move { (index, self.audit_entry(paper, entry).await) })
            .buffer_unordered(self.max_concurrent.max(1))
            .collect()
            .await;
        audits.sort_by_key(|(index, _)| *index);

        let report = AuditReport::new(
            paper.title.clone(),
            audits.into_iter().map(|(_, audit)| audit).collect(),
        );
        tracing::info!(
            "Audit complete: {} pass, {} suspect, {} missing",
            report.passed_count,
            report.suspect_count,
            report.missing_count
        );
        report
    }

    /// Audit a single entry
    pub async fn audit_entry(&self, paper: &CitingPaper, entry: ReferenceEntry) -> CitationAudit {
        let lookup = self
            .lookup
            .lookup_default(&entry.record, self.enable_fallbacks)
            .await;

        let (record, relevance, justification) = match lookup.record() {
            Some(found) => {
                let relevance = self
                    .evaluator
                    .relevance(paper, found, &entry.contexts)
                    .await;
                let justification = self
                    .evaluator
                    .justification(found, &entry.contexts)
                    .await;
                (found.clone(), Some(relevance), justification)
            }
            None => {
                tracing::debug!("Citation {} not found", entry.key);
                (entry.record.clone(), None, None)
            }
        };

        let status =
            CitationAudit::derive_status(&lookup, relevance.as_ref(), justification.as_ref());
        CitationAudit {
            key: entry.key,
            original_text: entry.original_text,
            record,
            contexts: entry.contexts,
            lookup,
            relevance,
            justification,
            status,
        }
    }
}
