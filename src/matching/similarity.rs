//! Similarity scoring between a cited reference and a catalog candidate.

use serde::Serialize;
use std::collections::HashSet;
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::models::CitationRecord;

/// Weight of the title component
pub const TITLE_WEIGHT: f64 = 0.6;
/// Weight of the year component
pub const YEAR_WEIGHT: f64 = 0.2;
/// Weight of the author component
pub const AUTHOR_WEIGHT: f64 = 0.2;

const ALIGNMENT_WEIGHT: f64 = 0.25;
const JARO_WINKLER_WEIGHT: f64 = 0.35;
const FUZZY_WEIGHT: f64 = 0.25;
const JACCARD_WEIGHT: f64 = 0.15;

/// Surnames closer than this count as a half match
const FUZZY_SURNAME_THRESHOLD: f64 = 0.8;

const SURNAME_PARTICLES: &[&str] = &[
    "van", "von", "de", "der", "den", "del", "della", "da", "di", "du", "la", "le", "ter", "ten",
    "dos", "das", "bin", "al",
];

/// Per-component similarity and the combined score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Title similarity, when both records have a title
    pub title: Option<f64>,
    /// Year agreement, when both records have a year
    pub year: Option<f64>,
    /// Author overlap, when both records list authors
    pub authors: Option<f64>,
    /// Weighted combination in [0, 1]
    pub total: f64,
}

impl ScoreBreakdown {
    /// Combine components, renormalizing over the ones that apply
    pub fn from_components(title: Option<f64>, year: Option<f64>, authors: Option<f64>) -> Self {
        let mut weighted = 0.0;
        let mut weights = 0.0;
        for (value, weight) in [
            (title, TITLE_WEIGHT),
            (year, YEAR_WEIGHT),
            (authors, AUTHOR_WEIGHT),
        ] {
            if let Some(value) = value {
                weighted += value.clamp(0.0, 1.0) * weight;
                weights += weight;
            }
        }

        let total = if weights > 0.0 { weighted / weights } else { 0.0 };
        Self {
            title,
            year,
            authors,
            total,
        }
    }
}

/// Scores how likely two citation records denote the same work.
///
/// Pure and deterministic: no I/O, no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer;

impl SimilarityScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score `candidate` against `query`
    pub fn score(&self, query: &CitationRecord, candidate: &CitationRecord) -> ScoreBreakdown {
        let title = match (query.title_text(), candidate.title_text()) {
            (Some(a), Some(b)) => title_similarity(a, b),
            _ => None,
        };
        let year = match (query.year, candidate.year) {
            (Some(a), Some(b)) => Some(year_similarity(a, b)),
            _ => None,
        };
        let authors = author_similarity(&query.authors, &candidate.authors);

        ScoreBreakdown::from_components(title, year, authors)
    }
}

/// Lowercase, turn punctuation into spaces and collapse whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Blend of character alignment, Jaro-Winkler, edit distance and word
/// overlap over normalized titles. `None` when either title normalizes to
/// nothing.
pub fn title_similarity(a: &str, b: &str) -> Option<f64> {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let score = ALIGNMENT_WEIGHT * alignment_ratio(&a, &b)
        + JARO_WINKLER_WEIGHT * jaro_winkler(&a, &b)
        + FUZZY_WEIGHT * normalized_levenshtein(&a, &b)
        + JACCARD_WEIGHT * word_jaccard(&a, &b);
    Some(score.clamp(0.0, 1.0))
}

/// `2 * LCS / (|a| + |b|)` over characters
fn alignment_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    2.0 * prev[b.len()] as f64 / total as f64
}

fn word_jaccard(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// 1.0 for the same year, 0.75 one year apart, 0.5 two apart, else 0
pub fn year_similarity(a: i32, b: i32) -> f64 {
    match a.abs_diff(b) {
        0 => 1.0,
        1 => 0.75,
        2 => 0.5,
        _ => 0.0,
    }
}

/// Surname overlap between two author lists.
///
/// Each surname of `a` may match one unused surname of `b`: exactly for 1.0,
/// or with Jaro-Winkler above 0.8 for 0.5. The sum is divided by the longer
/// list. `None` when either list has no usable surname.
pub fn author_similarity(a: &[String], b: &[String]) -> Option<f64> {
    let a: Vec<String> = a.iter().filter_map(|name| extract_surname(name)).collect();
    let b: Vec<String> = b.iter().filter_map(|name| extract_surname(name)).collect();
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let mut used = vec![false; b.len()];
    let mut total = 0.0;
    for surname in &a {
        if let Some(i) = (0..b.len()).find(|&i| !used[i] && b[i] == *surname) {
            used[i] = true;
            total += 1.0;
            continue;
        }

        let best = (0..b.len())
            .filter(|&i| !used[i])
            .map(|i| (i, jaro_winkler(surname, &b[i])))
            .filter(|(_, sim)| *sim > FUZZY_SURNAME_THRESHOLD)
            .fold(None, |best: Option<(usize, f64)>, (i, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((i, sim)),
            });
        if let Some((i, _)) = best {
            used[i] = true;
            total += 0.5;
        }
    }

    Some(total / a.len().max(b.len()) as f64)
}

/// Lowercased surname from "Last, First" or "First Last" (also
/// "Last F." as produced by PubMed-style citations). Particles such as
/// "van" stay attached to the surname.
pub fn extract_surname(name: &str) -> Option<String> {
    let name = name.trim();
    let lowered = name.to_lowercase();
    if lowered.is_empty() || lowered.starts_with("et al") || lowered == "others" {
        return None;
    }

    let tokens: Vec<String> = if let Some((last, _)) = name.split_once(',') {
        tokens_of(last)
    } else {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        match tokens.as_slice() {
            [] => return None,
            [only] => tokens_of(only),
            [rest @ .., last] if is_initials(last) => tokens_of(&rest.join(" ")),
            [rest @ .., last] => {
                // keep lowercase particles preceding the final token
                let particles = rest
                    .iter()
                    .rev()
                    .take_while(|t| SURNAME_PARTICLES.contains(&t.to_lowercase().as_str()))
                    .count();
                let start = rest.len() - particles;
                let mut parts: Vec<&str> = rest[start..].to_vec();
                parts.push(last);
                tokens_of(&parts.join(" "))
            }
        }
    };

    let surname = tokens.join(" ");
    if surname.is_empty() {
        None
    } else {
        Some(surname)
    }
}

fn tokens_of(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '\'')
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_initials(token: &str) -> bool {
    let letters: Vec<char> = token.chars().filter(|c| *c != '.' && *c != '-').collect();
    !letters.is_empty() && letters.len() <= 3 && letters.iter().all(|c| c.is_uppercase())
}
