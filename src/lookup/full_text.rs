//! Full-text availability heuristic.
//!
//! A match is considered to have full text when it points at a preprint
//! server, an open-access repository or publisher, or directly at a PDF.
//! This never fetches anything.

use crate::models::CitationRecord;

/// Hosts that serve full text without a subscription
const OPEN_ACCESS_HOSTS: &[&str] = &[
    "arxiv.org",
    "biorxiv.org",
    "medrxiv.org",
    "europepmc.org",
    "journals.plos.org",
    "frontiersin.org",
    "mdpi.com",
    "doaj.org",
    "zenodo.org",
    "hal.science",
    "hal.archives-ouvertes.fr",
    "osf.io",
    "ssrn.com",
    "peerj.com",
    "elifesciences.org",
    "openreview.net",
    "aclanthology.org",
    "proceedings.neurips.cc",
    "proceedings.mlr.press",
];

/// DOI prefixes of open-access publishers
const OPEN_ACCESS_DOI_PREFIXES: &[&str] = &[
    "10.1371/", // PLOS
    "10.3389/", // Frontiers
    "10.3390/", // MDPI
    "10.7554/", // eLife
    "10.7717/", // PeerJ
    "10.1101/", // bioRxiv, medRxiv
    "10.48550/", // arXiv
    "10.5281/", // Zenodo
];

/// Whether the record likely links to freely readable full text
pub fn has_full_text(record: &CitationRecord) -> bool {
    if record.arxiv_id.is_some() {
        return true;
    }

    if let Some(doi) = &record.doi {
        if OPEN_ACCESS_DOI_PREFIXES.iter().any(|p| doi.starts_with(p)) {
            return true;
        }
    }

    record.url.as_deref().is_some_and(is_open_url)
}

fn is_open_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };

    if parsed.path().to_ascii_lowercase().ends_with(".pdf") {
        return true;
    }

    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    // PMC serves open-access articles under the NCBI domain
    if host.ends_with("ncbi.nlm.nih.gov") && parsed.path().starts_with("/pmc/") {
        return true;
    }
    if host == "pmc.ncbi.nlm.nih.gov" {
        return true;
    }

    OPEN_ACCESS_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> CitationRecord {
        CitationRecord::builder().title("Some paper").url(url).build()
    }

    #[test]
    fn test_arxiv_id_implies_full_text() {
        let record = CitationRecord::builder()
            .title("Attention Is All You Need")
            .arxiv_id("1706.03762")
            .build();
        assert!(has_full_text(&record));
    }

    #[test]
    fn test_open_hosts() {
        assert!(has_full_text(&with_url("https://www.biorxiv.org/content/10.1101/2020.01.01")));
        assert!(has_full_text(&with_url("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6123456/")));
        assert!(has_full_text(&with_url("https://pmc.ncbi.nlm.nih.gov/articles/PMC6123456/")));
        assert!(has_full_text(&with_url("https://journals.plos.org/plosone/article?id=1")));
        assert!(has_full_text(&with_url("https://example.edu/papers/draft.PDF")));
    }

    #[test]
    fn test_closed_links() {
        assert!(!has_full_text(&with_url("https://www.nature.com/articles/nature14539")));
        assert!(!has_full_text(&with_url("https://pubmed.ncbi.nlm.nih.gov/31452104/")));
        // lookalike host
        assert!(!has_full_text(&with_url("https://notarxiv.org/abs/1")));
        assert!(!has_full_text(&CitationRecord::builder().title("No links").build()));
    }

    #[test]
    fn test_open_access_doi_prefix() {
        let record = CitationRecord::builder()
            .title("A PLOS paper")
            .doi("10.1371/journal.pone.0000001")
            .build();
        assert!(has_full_text(&record));
    }
}
