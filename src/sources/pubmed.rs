//! PubMed source implementation using the E-utilities API.

use async_trait::async_trait;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::CitationRecord;
use crate::sources::{parse_base_url, titled, SearchQuery, Source, SourceCapabilities, SourceError};
use crate::utils::{ApiRequest, HttpClient};

/// PubMed E-utilities API base URL
const PUBMED_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Formatting elements allowed inside titles and abstracts
const INLINE_TAGS: &[&[u8]] = &[b"i", b"b", b"u", b"sup", b"sub", b"em", b"strong"];

/// PubMed source
///
/// Searches with `esearch` for PMIDs, then resolves them with `efetch` XML.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: PUBMED_EUTILS_BASE.to_string(),
            api_key: None,
        }
    }

    /// NCBI API key, raising the allowed request rate
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, SourceError> {
        self.base_url = parse_base_url(self.id(), base_url)?;
        Ok(self)
    }

    pub fn with_base_url_opt(self, base_url: Option<&str>) -> Result<Self, SourceError> {
        match base_url {
            Some(url) => self.with_base_url(url),
            None => Ok(self),
        }
    }

    fn request(&self, endpoint: &str) -> ApiRequest {
        ApiRequest::get(self.id(), format!("{}/{}", self.base_url, endpoint))
            .param("db", "pubmed")
            .param("retmode", "xml")
            .param_opt("api_key", self.api_key.as_deref())
    }

    /// Run an `esearch` term and return matching PMIDs in relevance order
    async fn search_ids(&self, term: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        let request = self
            .request("esearch.fcgi")
            .param("term", term)
            .param("retmax", max_results)
            .param("sort", "relevance");

        self.client.fetch(&request, parse_search_response).await
    }

    /// Resolve PMIDs to records with `efetch`
    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<CitationRecord>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request("efetch.fcgi")
            .param("id", ids.join(","))
            .param("rettype", "abstract");

        self.client.fetch(&request, parse_fetch_response).await
    }

    async fn search_term(
        &self,
        term: &str,
        max_results: usize,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        let ids = self.search_ids(term, max_results).await?;
        tracing::debug!("PubMed esearch returned {} IDs for {:?}", ids.len(), term);
        let records = self.fetch_records(&ids).await?;
        Ok(titled(records, max_results))
    }
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::PMID_LOOKUP
            | SourceCapabilities::AUTHOR_SEARCH
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        let mut term = query.free_text();
        if let Some((from, until)) = query.year_range() {
            term.push_str(&format!(" AND {}:{}[PDAT]", from, until));
        }
        self.search_term(&term, query.max_results).await
    }

    async fn search_by_author(
        &self,
        author: &str,
        max_results: usize,
        year: Option<i32>,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        let term = match year {
            Some(year) => format!("{}[AUTH] AND {}[PDAT]", author, year),
            None => format!("{}[AUTH]", author),
        };
        self.search_term(&term, max_results).await
    }

    async fn get_by_pmid(&self, pmid: &str) -> Result<CitationRecord, SourceError> {
        self.fetch_records(&[pmid.to_string()])
            .await?
            .into_iter()
            .find(|r| r.title_text().is_some())
            .ok_or_else(|| SourceError::NotFound(format!("PMID {} not found", pmid)))
    }
}

/// Parse E-utilities search response XML
fn parse_search_response(xml: &str) -> Result<Vec<String>, SourceError> {
    let result: ESearchResult = from_str(xml)?;
    Ok(result.IdList.map(|l| l.ids).unwrap_or_default())
}

/// Parse E-utilities fetch response XML
fn parse_fetch_response(xml: &str) -> Result<Vec<CitationRecord>, SourceError> {
    let flat = flatten_inline_markup(xml)?;
    let result: PubmedArticleSet = from_str(&flat)?;
    Ok(result.articles.into_iter().map(parse_article).collect())
}

fn xml_error(e: impl std::fmt::Display) -> SourceError {
    SourceError::Parse(format!("XML: {}", e))
}

fn is_inline(name: QName<'_>) -> bool {
    let name = name.as_ref();
    INLINE_TAGS.contains(&name) || name.starts_with(b"mml:")
}

/// Drop inline markup tags, keeping their text, so mixed-content titles and
/// abstracts deserialize as one text run
fn flatten_inline_markup(xml: &str) -> Result<String, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if is_inline(e.name()) => {}
            Event::End(e) if is_inline(e.name()) => {}
            event => writer.write_event(event).map_err(xml_error)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn parse_article(article: PubmedArticle) -> CitationRecord {
    let citation = article.MedlineCitation;
    let pmid = citation
        .as_ref()
        .and_then(|m| m.PMID.as_ref())
        .map(|p| p.text.clone())
        .unwrap_or_default();

    let details = citation.and_then(|m| m.Article);
    let mut builder = CitationRecord::builder().pmid(&pmid);
    if !pmid.is_empty() {
        builder = builder.url(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid));
    }

    if let Some(details) = details {
        let authors = details
            .AuthorList
            .map(|al| al.authors)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|author| {
                if let Some(collective) = author.CollectiveName {
                    return Some(collective.text);
                }
                let last = author.LastName?.text;
                match author.ForeName.or(author.Initials) {
                    Some(first) => Some(format!("{}, {}", last, first.text)),
                    None => Some(last),
                }
            });

        let issue = details.Journal.as_ref().and_then(|j| j.JournalIssue.as_ref());
        let year = issue
            .and_then(|ji| ji.PubDate.as_ref())
            .and_then(|pd| pd.Year.as_deref().or(pd.MedlineDate.as_deref()))
            .and_then(leading_year);

        builder = builder
            .title(details.ArticleTitle.map(|t| t.text).unwrap_or_default())
            .authors(authors)
            .year_opt(year)
            .venue(
                details
                    .Journal
                    .as_ref()
                    .and_then(|j| j.Title.as_deref())
                    .unwrap_or_default(),
            )
            .volume(issue.and_then(|ji| ji.Volume.as_deref()).unwrap_or_default())
            .pages(
                details
                    .Pagination
                    .as_ref()
                    .and_then(|p| p.MedlinePgn.as_deref())
                    .unwrap_or_default(),
            )
            .abstract_text(
                details
                    .Abstract
                    .map(|ab| {
                        ab.texts
                            .into_iter()
                            .map(|t| t.text)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default(),
            );
    }

    if let Some(doi) = article
        .PubmedData
        .and_then(|pd| pd.ArticleIdList)
        .and_then(|ail| ail.ids.into_iter().find(|id| id.id_type == "doi"))
    {
        builder = builder.doi(doi.text);
    }

    builder.build()
}

/// Year at the start of a PubMed date such as "2019" or "1998 Dec-1999 Jan"
fn leading_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

// ===== PubMed API Types =====

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ESearchResult {
    IdList: Option<IdList>,
}

#[derive(Debug, Deserialize)]
struct IdList {
    #[serde(rename = "Id", default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
    PubmedData: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    PMID: Option<TextNode>,
    Article: Option<Article>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Article {
    Journal: Option<Journal>,
    ArticleTitle: Option<TextNode>,
    Pagination: Option<Pagination>,
    Abstract: Option<Abstract>,
    AuthorList: Option<AuthorList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    JournalIssue: Option<JournalIssue>,
    Title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    Volume: Option<String>,
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    MedlineDate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Pagination {
    MedlinePgn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    texts: Vec<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Author {
    LastName: Option<TextNode>,
    ForeName: Option<TextNode>,
    Initials: Option<TextNode>,
    CollectiveName: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedData {
    ArticleIdList: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType")]
    id_type: String,
    #[serde(rename = "$text")]
    text: String,
}

/// Element whose attributes are ignored and whose text is kept
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}
