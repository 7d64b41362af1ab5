//! OpenAlex source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::CitationRecord;
use crate::sources::{parse_base_url, titled, SearchQuery, Source, SourceCapabilities, SourceError};
use crate::utils::{ApiRequest, HttpClient};

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// OpenAlex source
///
/// Uses the OpenAlex REST API. Works are resolved by `doi:` and `pmid:`
/// external IDs, searched with `search=`, and filtered by raw author name and
/// publication year for author searches.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: Arc<HttpClient>,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            mailto: None,
        }
    }

    /// Contact address (recommended for the polite pool)
    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto;
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
        ApiRequest::get(self.id(), format!("{}{}", self.base_url, endpoint))
            .param_opt("mailto", self.mailto.as_deref())
    }

    async fn get_work(&self, external_id: &str) -> Result<CitationRecord, SourceError> {
        let request = self.request(&format!("/works/{}", external_id));
        let record = self
            .client
            .fetch(&request, |body| {
                let work: OAWork = serde_json::from_str(body)?;
                Ok(parse_work(work))
            })
            .await?;

        if record.title_text().is_none() {
            return Err(SourceError::NotFound(format!(
                "OpenAlex has no title for {}",
                external_id
            )));
        }
        Ok(record)
    }

    async fn list_works(
        &self,
        request: ApiRequest,
        max_results: usize,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        self.client
            .fetch(&request.param("per_page", max_results), |body| {
                let response: OAListResponse = serde_json::from_str(body)?;
                Ok(titled(
                    response.results.into_iter().map(parse_work),
                    max_results,
                ))
            })
            .await
    }
}

/// Parse an OpenAlex work into a record
fn parse_work(work: OAWork) -> CitationRecord {
    let authors = work
        .authorships
        .into_iter()
        .filter_map(|a| a.author.and_then(|author| author.display_name));

    let location = work.primary_location.unwrap_or_default();
    let venue = location
        .source
        .and_then(|s| s.display_name)
        .unwrap_or_default();
    let url = location
        .landing_page_url
        .or(location.pdf_url)
        .unwrap_or_default();

    let biblio = work.biblio.unwrap_or_default();
    let pages = match (biblio.first_page, biblio.last_page) {
        (Some(first), Some(last)) if first != last => format!("{}-{}", first, last),
        (Some(first), _) => first,
        _ => String::new(),
    };

    // PMIDs come back as https://pubmed.ncbi.nlm.nih.gov/<id>
    let pmid = work
        .ids
        .and_then(|ids| ids.pmid)
        .and_then(|p| p.trim_end_matches('/').rsplit('/').next().map(String::from))
        .unwrap_or_default();

    CitationRecord::builder()
        .title(work.title.or(work.display_name).unwrap_or_default())
        .authors(authors)
        .year_opt(work.publication_year)
        .venue(venue)
        .volume(biblio.volume.unwrap_or_default())
        .pages(pages)
        .doi(work.doi.unwrap_or_default())
        .pmid(pmid)
        .url(url)
        .abstract_text(
            work.abstract_inverted_index
                .map(|index| rebuild_abstract(&index))
                .unwrap_or_default(),
        )
        .build()
}

/// Rebuild abstract text from OpenAlex's `{word: [positions]}` index
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut words: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    words.sort_unstable();
    words
        .into_iter()
        .map(|(_, w)| w)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::DOI_LOOKUP
            | SourceCapabilities::PMID_LOOKUP
            | SourceCapabilities::AUTHOR_SEARCH
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        let request = self
            .request("/works")
            .param("search", query.free_text())
            .param_opt(
                "filter",
                query
                    .year_range()
                    .map(|(from, until)| format!("publication_year:{}-{}", from, until)),
            );

        self.list_works(request, query.max_results).await
    }

    async fn search_by_author(
        &self,
        author: &str,
        max_results: usize,
        year: Option<i32>,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        let mut filter = format!("raw_author_name.search:{}", author);
        if let Some(year) = year {
            filter.push_str(&format!(",publication_year:{}", year));
        }
        let request = self.request("/works").param("filter", filter);

        self.list_works(request, max_results).await
    }

    async fn get_by_doi(&self, doi: &str) -> Result<CitationRecord, SourceError> {
        self.get_work(&format!("doi:{}", doi)).await
    }

    async fn get_by_pmid(&self, pmid: &str) -> Result<CitationRecord, SourceError> {
        self.get_work(&format!("pmid:{}", pmid)).await
    }
}

// ===== OpenAlex API Types =====

#[derive(Debug, Deserialize)]
struct OAListResponse {
    #[serde(default)]
    results: Vec<OAWork>,
}

#[derive(Debug, Deserialize)]
struct OAWork {
    title: Option<String>,
    display_name: Option<String>,
    doi: Option<String>,
    publication_year: Option<i32>,
    ids: Option<OAIds>,
    #[serde(default)]
    authorships: Vec<OAAuthorship>,
    primary_location: Option<OALocation>,
    biblio: Option<OABiblio>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
}

#[derive(Debug, Deserialize)]
struct OAIds {
    pmid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAAuthorship {
    author: Option<OAAuthor>,
}

#[derive(Debug, Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OALocation {
    source: Option<OASource>,
    landing_page_url: Option<String>,
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OASource {
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OABiblio {
    volume: Option<String>,
    first_page: Option<String>,
    last_page: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::utils::{ApiCallLog, RateLimiter};
    use mockito::Matcher;

    const WORK_JSON: &str = r#"{
        "id": "https://openalex.org/W2963403868",
        "doi": "https://doi.org/10.5555/attention",
        "title": "Attention Is All You Need",
        "display_name": "Attention Is All You Need",
        "publication_year": 2017,
        "ids": {"openalex": "https://openalex.org/W2963403868", "pmid": "https://pubmed.ncbi.nlm.nih.gov/12345678"},
        "authorships": [
            {"author_position": "first", "author": {"id": "A1", "display_name": "Ashish Vaswani"}},
            {"author_position": "middle", "author": {"id": "A2", "display_name": null}}
        ],
        "primary_location": {
            "landing_page_url": "https://arxiv.org/abs/1706.03762",
            "pdf_url": null,
            "source": {"display_name": "arXiv (Cornell University)"}
        },
        "biblio": {"volume": "30", "issue": null, "first_page": "5998", "last_page": "6008"},
        "abstract_inverted_index": {"models": [2], "The": [0], "dominant": [1]}
    }"#;

    fn source(server: &mockito::Server, mailto: Option<&str>) -> OpenAlexSource {
        let client = HttpClient::from_config(&HttpConfig::default(), RateLimiter::disabled())
            .unwrap()
            .with_api_log(ApiCallLog::new());
        OpenAlexSource::new(Arc::new(client))
            .with_mailto(mailto.map(String::from))
            .with_base_url(&server.url())
            .unwrap()
    }

    #[test]
    fn test_parse_work() {
        let work: OAWork = serde_json::from_str(WORK_JSON).unwrap();
        let record = parse_work(work);

        assert_eq!(record.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(record.authors, vec!["Ashish Vaswani"]);
        assert_eq!(record.doi.as_deref(), Some("10.5555/attention"));
        assert_eq!(record.pmid.as_deref(), Some("12345678"));
        assert_eq!(record.pages.as_deref(), Some("5998-6008"));
        assert_eq!(
            record.venue.as_deref(),
            Some("arXiv (Cornell University)")
        );
        assert_eq!(record.abstract_text.as_deref(), Some("The dominant models"));
    }

    #[test]
    fn test_rebuild_abstract_repeated_words() {
        let index: HashMap<String, Vec<usize>> = [
            ("to".to_string(), vec![1, 3]),
            ("learn".to_string(), vec![0]),
            ("learning".to_string(), vec![2]),
        ]
        .into_iter()
        .collect();
        assert_eq!(rebuild_abstract(&index), "learn to learning to");
    }

    #[tokio::test]
    async fn test_get_by_doi() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works/doi:10.5555/attention")
            .match_query(Matcher::UrlEncoded("mailto".into(), "me@example.org".into()))
            .with_status(200)
            .with_body(WORK_JSON)
            .create_async()
            .await;

        let record = source(&server, Some("me@example.org"))
            .get_by_doi("10.5555/attention")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.year, Some(2017));
    }

    #[tokio::test]
    async fn test_search_uses_free_text_and_year_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "attention is all you need Vaswani".into()),
                Matcher::UrlEncoded("filter".into(), "publication_year:2016-2020".into()),
            ]))
            .with_status(200)
            .with_body(format!(r#"{{"meta": {{"count": 1}}, "results": [{}]}}"#, WORK_JSON))
            .create_async()
            .await;

        let query = SearchQuery::new("attention is all you need")
            .author("Vaswani")
            .year(2018);
        let records = source(&server, None).search(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_search_by_author_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "filter".into(),
                    "raw_author_name.search:Vaswani,publication_year:2017".into(),
                ),
                Matcher::UrlEncoded("per_page".into(), "4".into()),
            ]))
            .with_status(200)
            .with_body(format!(r#"{{"meta": {{"count": 1}}, "results": [{}]}}"#, WORK_JSON))
            .create_async()
            .await;

        let records = source(&server, None)
            .search_by_author("Vaswani", 4, Some(2017))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = source(&server, None)
            .search(&SearchQuery::new("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Server(503)));
        assert!(err.is_transient());
    }
}
