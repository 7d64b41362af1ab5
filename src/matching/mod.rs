//! Record matching.
//!
//! [`SimilarityScorer`] compares a query record with a candidate returned by
//! a source; [`query_variants`] derives the relaxed titles used when a strict
//! search finds nothing.

mod similarity;
mod variants;

pub use similarity::{
    author_similarity, extract_surname, normalize_title, title_similarity, year_similarity,
    ScoreBreakdown, SimilarityScorer, AUTHOR_WEIGHT, TITLE_WEIGHT, YEAR_WEIGHT,
};
pub use variants::query_variants;
