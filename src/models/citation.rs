//! Canonical bibliographic record shared by every source adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{validate_arxiv_id, validate_doi, validate_pmid};

/// Kinds of identifier that resolve a citation exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Doi,
    Pmid,
    Arxiv,
}

impl IdentifierKind {
    /// Resolution order used by identifier lookups
    pub const ALL: [IdentifierKind; 3] = [Self::Doi, Self::Pmid, Self::Arxiv];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Doi => "doi",
            IdentifierKind::Pmid => "pmid",
            IdentifierKind::Arxiv => "arxiv",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bibliographic reference, either as cited in a paper or as returned by a
/// catalog. Every field is optional because references are usually partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationRecord {
    /// Work title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Author display strings in citation order ("Vaswani, Ashish" or "Ashish Vaswani")
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// Publication year
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Journal, conference or repository name
    #[serde(alias = "journal", skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,

    /// Digital Object Identifier, lowercased without resolver prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// PubMed identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,

    /// arXiv identifier without version suffix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,

    /// Landing page URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Abstract text
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
}

impl CitationRecord {
    /// Start building a record
    pub fn builder() -> CitationRecordBuilder {
        CitationRecordBuilder::default()
    }

    /// Value of the given identifier, if present
    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Doi => self.doi.as_deref(),
            IdentifierKind::Pmid => self.pmid.as_deref(),
            IdentifierKind::Arxiv => self.arxiv_id.as_deref(),
        }
    }

    /// Whether any exact identifier is present
    pub fn has_identifiers(&self) -> bool {
        IdentifierKind::ALL
            .iter()
            .any(|kind| self.identifier(*kind).is_some())
    }

    /// Title, if present and not blank
    pub fn title_text(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.as_str())
    }

    /// True when the record carries nothing that could be looked up
    pub fn is_empty(&self) -> bool {
        self.title_text().is_none() && !self.has_identifiers() && self.authors.is_empty()
    }

    /// Return a copy with identifiers normalized and blank strings removed.
    ///
    /// Identifiers that fail validation are dropped.
    pub fn normalized(&self) -> CitationRecord {
        let mut builder = CitationRecordBuilder::default();
        if let Some(title) = &self.title {
            builder = builder.title(title);
        }
        builder = builder.authors(self.authors.iter().cloned());
        if let Some(year) = self.year {
            builder = builder.year(year);
        }
        if let Some(venue) = &self.venue {
            builder = builder.venue(venue);
        }
        if let Some(volume) = &self.volume {
            builder = builder.volume(volume);
        }
        if let Some(pages) = &self.pages {
            builder = builder.pages(pages);
        }
        if let Some(doi) = &self.doi {
            builder = builder.doi(doi);
        }
        if let Some(pmid) = &self.pmid {
            builder = builder.pmid(pmid);
        }
        if let Some(arxiv_id) = &self.arxiv_id {
            builder = builder.arxiv_id(arxiv_id);
        }
        if let Some(url) = &self.url {
            builder = builder.url(url);
        }
        if let Some(abstract_text) = &self.abstract_text {
            builder = builder.abstract_text(abstract_text);
        }
        builder.build()
    }

    /// Merge two records, preferring the non-empty fields of `self` and
    /// filling gaps from `other`. Neither input is modified.
    pub fn merge(&self, other: &CitationRecord) -> CitationRecord {
        CitationRecord {
            title: self.title.clone().or_else(|| other.title.clone()),
            authors: if self.authors.is_empty() {
                other.authors.clone()
            } else {
                self.authors.clone()
            },
            year: self.year.or(other.year),
            venue: self.venue.clone().or_else(|| other.venue.clone()),
            volume: self.volume.clone().or_else(|| other.volume.clone()),
            pages: self.pages.clone().or_else(|| other.pages.clone()),
            doi: self.doi.clone().or_else(|| other.doi.clone()),
            pmid: self.pmid.clone().or_else(|| other.pmid.clone()),
            arxiv_id: self.arxiv_id.clone().or_else(|| other.arxiv_id.clone()),
            url: self.url.clone().or_else(|| other.url.clone()),
            abstract_text: self
                .abstract_text
                .clone()
                .or_else(|| other.abstract_text.clone()),
        }
    }
}

fn non_blank(value: impl AsRef<str>) -> Option<String> {
    let value = value.as_ref().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Builder for [`CitationRecord`]. Identifier setters normalize their input
/// and silently drop values that are not valid identifiers.
#[derive(Debug, Clone, Default)]
pub struct CitationRecordBuilder {
    record: CitationRecord,
}

impl CitationRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl AsRef<str>) -> Self {
        self.record.title = non_blank(title);
        self
    }

    /// Append one author
    pub fn author(mut self, author: impl AsRef<str>) -> Self {
        if let Some(author) = non_blank(author) {
            self.record.authors.push(author);
        }
        self
    }

    /// Append several authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.record
            .authors
            .extend(authors.into_iter().filter_map(non_blank));
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.record.year = Some(year);
        self
    }

    /// Set the year when the source reported one
    pub fn year_opt(mut self, year: Option<i32>) -> Self {
        self.record.year = year;
        self
    }

    pub fn venue(mut self, venue: impl AsRef<str>) -> Self {
        self.record.venue = non_blank(venue);
        self
    }

    pub fn volume(mut self, volume: impl AsRef<str>) -> Self {
        self.record.volume = non_blank(volume);
        self
    }

    pub fn pages(mut self, pages: impl AsRef<str>) -> Self {
        self.record.pages = non_blank(pages);
        self
    }

    pub fn doi(mut self, doi: impl AsRef<str>) -> Self {
        let raw = doi.as_ref();
        self.record.doi = match validate_doi(raw) {
            Ok(doi) => Some(doi),
            Err(e) => {
                if !raw.trim().is_empty() {
                    tracing::debug!("Dropping DOI {:?}: {}", raw, e);
                }
                None
            }
        };
        self
    }

    pub fn pmid(mut self, pmid: impl AsRef<str>) -> Self {
        let raw = pmid.as_ref();
        self.record.pmid = match validate_pmid(raw) {
            Ok(pmid) => Some(pmid),
            Err(e) => {
                if !raw.trim().is_empty() {
                    tracing::debug!("Dropping PMID {:?}: {}", raw, e);
                }
                None
            }
        };
        self
    }

    pub fn arxiv_id(mut self, arxiv_id: impl AsRef<str>) -> Self {
        let raw = arxiv_id.as_ref();
        self.record.arxiv_id = match validate_arxiv_id(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                if !raw.trim().is_empty() {
                    tracing::debug!("Dropping arXiv ID {:?}: {}", raw, e);
                }
                None
            }
        };
        self
    }

    pub fn url(mut self, url: impl AsRef<str>) -> Self {
        self.record.url = non_blank(url);
        self
    }

    pub fn abstract_text(mut self, abstract_text: impl AsRef<str>) -> Self {
        self.record.abstract_text = non_blank(abstract_text);
        self
    }

    pub fn build(self) -> CitationRecord {
        self.record
    }
}
