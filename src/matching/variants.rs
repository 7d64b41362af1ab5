//! Relaxed title queries for the fallback tier.

use std::collections::HashSet;

use super::normalize_title;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "into", "is",
    "it", "its", "of", "on", "or", "over", "than", "that", "the", "their", "this", "to", "toward",
    "towards", "under", "using", "via", "what", "when", "which", "with", "within", "without",
];

/// Keywords kept by the longest-keywords variant
const KEYWORD_COUNT: usize = 5;

/// Shortest title (in words) worth halving
const MIN_WORDS_TO_HALVE: usize = 4;

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Derive up to `max` relaxed search queries from a title.
///
/// In order: stopwords removed, punctuation removed, the main title before a
/// colon, the first half of the words, and the longest keywords. Variants that
/// repeat the original title or an earlier variant are skipped.
pub fn query_variants(title: &str, max: usize) -> Vec<String> {
    let normalized = normalize_title(title);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() || max == 0 {
        return Vec::new();
    }

    let content: Vec<&str> = words.iter().copied().filter(|w| !is_stopword(w)).collect();

    let mut candidates = vec![
        content.join(" "),
        strip_punctuation(title),
    ];

    if let Some((main, _)) = title.split_once(':') {
        candidates.push(normalize_title(main));
    }

    if words.len() >= MIN_WORDS_TO_HALVE {
        candidates.push(words[..words.len().div_ceil(2)].join(" "));
    }

    candidates.push(longest_keywords(&content, KEYWORD_COUNT));

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(title.trim().to_lowercase());

    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| c.split_whitespace().count() >= 2)
        .filter(|c| seen.insert(c.to_lowercase()))
        .take(max)
        .collect()
}

/// Remove punctuation but keep case and word boundaries
fn strip_punctuation(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .map(|c| if c == '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The `n` longest words, kept in title order. Ties favor earlier words.
fn longest_keywords(words: &[&str], n: usize) -> String {
    let mut ranked: Vec<(usize, &str)> = words.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.chars().count().cmp(&a.1.chars().count()).then(a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked.sort_by_key(|(i, _)| *i);
    ranked
        .into_iter()
        .map(|(_, w)| w)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_for_long_title() {
        let variants = query_variants(
            "A Survey of Deep Learning Techniques for the Analysis of Medical Images",
            10,
        );
        assert_eq!(
            variants[0],
            "survey deep learning techniques analysis medical images"
        );
        // punctuation-free title is identical to the original, so it is skipped
        assert!(!variants
            .iter()
            .any(|v| v.eq_ignore_ascii_case(
                "A Survey of Deep Learning Techniques for the Analysis of Medical Images"
            )));
        assert!(variants.contains(&"a survey of deep learning techniques".to_string()));
        assert!(variants.contains(&"survey learning techniques analysis medical".to_string()));
    }

    #[test]
    fn test_variants_with_subtitle() {
        let variants = query_variants("BERT: Pre-training of Deep Bidirectional Transformers", 10);
        assert!(variants.contains(&"BERT Pre training of Deep Bidirectional Transformers".to_string()));
        // single-word main title is too short to be a query
        assert!(!variants.contains(&"bert".to_string()));
    }

    #[test]
    fn test_variants_respect_max() {
        let variants = query_variants(
            "Convolutional Neural Networks for Large Scale Image Recognition Tasks",
            2,
        );
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn test_variants_are_unique_and_differ_from_title() {
        let title = "Deep Neural Networks";
        let variants = query_variants(title, 10);
        let unique: HashSet<_> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
        assert!(!variants.iter().any(|v| v == "deep neural networks"));
    }

    #[test]
    fn test_variants_empty_title() {
        assert!(query_variants("", 4).is_empty());
        assert!(query_variants("?!", 4).is_empty());
        assert!(query_variants("Some title here", 0).is_empty());
    }

    #[test]
    fn test_longest_keywords_keeps_order() {
        let words = ["deep", "residual", "learning", "for", "image", "recognition"];
        assert_eq!(
            longest_keywords(&words, 3),
            "residual learning recognition"
        );
    }
}
