//! CrossRef source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::CitationRecord;
use crate::sources::{
    parse_base_url, strip_tags, titled, SearchQuery, Source, SourceCapabilities, SourceError,
};
use crate::utils::{ApiRequest, HttpClient};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// CrossRef source
///
/// Uses the CrossRef REST API for DOI resolution, bibliographic search and
/// author search. Searches can be narrowed to one DOI registrant prefix.
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: Arc<HttpClient>,
    base_url: String,
    mailto: Option<String>,
}

impl CrossRefSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: CROSSREF_API_BASE.to_string(),
            mailto: None,
        }
    }

    /// Contact address for CrossRef's polite pool
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

    fn works_request(&self, max_results: usize) -> ApiRequest {
        ApiRequest::get(self.id(), format!("{}/works", self.base_url))
            .param("rows", max_results)
            .param_opt("mailto", self.mailto.as_deref())
    }

    async fn fetch_works(
        &self,
        request: ApiRequest,
        max_results: usize,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        self.client
            .fetch(&request, |body| {
                let data: CRListResponse = serde_json::from_str(body)?;
                Ok(titled(
                    data.message.items.into_iter().map(parse_work),
                    max_results,
                ))
            })
            .await
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::DOI_LOOKUP
            | SourceCapabilities::AUTHOR_SEARCH
            | SourceCapabilities::PREFIX_SEARCH
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        // bibliographic matching ranks on title, author and year together,
        // so none of them is a hard filter
        let request = self
            .works_request(query.max_results)
            .param("query.bibliographic", query.combined_text())
            .param_opt(
                "filter",
                query.doi_prefix.as_ref().map(|p| format!("prefix:{}", p)),
            );

        self.fetch_works(request, query.max_results).await
    }

    async fn search_by_author(
        &self,
        author: &str,
        max_results: usize,
        year: Option<i32>,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        let request = self
            .works_request(max_results)
            .param("query.author", author)
            .param_opt("filter", date_filter(year));

        self.fetch_works(request, max_results).await
    }

    async fn get_by_doi(&self, doi: &str) -> Result<CitationRecord, SourceError> {
        let request = ApiRequest::get(
            self.id(),
            format!("{}/works/{}", self.base_url, urlencoding::encode(doi)),
        )
        .param_opt("mailto", self.mailto.as_deref());

        let record = self
            .client
            .fetch(&request, |body| {
                let data: CRWorkResponse = serde_json::from_str(body)?;
                Ok(parse_work(data.message))
            })
            .await?;

        if record.title_text().is_none() {
            return Err(SourceError::NotFound(format!("DOI {} has no title", doi)));
        }
        Ok(record)
    }
}

/// `from-pub-date`/`until-pub-date` filter covering one year, used by the
/// author+year fallback
fn date_filter(year: Option<i32>) -> Option<String> {
    year.map(|y| format!("from-pub-date:{},until-pub-date:{}", y, y))
}

fn parse_work(item: CRItem) -> CitationRecord {
    let authors = item.author.iter().filter_map(|a| {
        match (a.family.as_deref(), a.given.as_deref(), a.name.as_deref()) {
            (Some(family), Some(given), _) => Some(format!("{}, {}", family, given)),
            (Some(family), None, _) => Some(family.to_string()),
            (None, _, Some(name)) => Some(name.to_string()),
            _ => None,
        }
    });

    let year = [&item.published_print, &item.published_online, &item.issued]
        .into_iter()
        .flatten()
        .find_map(CRDate::year);

    CitationRecord::builder()
        .title(item.title.first().map(String::as_str).unwrap_or_default())
        .authors(authors)
        .year_opt(year)
        .venue(
            item.container_title
                .first()
                .map(String::as_str)
                .unwrap_or_default(),
        )
        .volume(item.volume.unwrap_or_default())
        .pages(item.page.unwrap_or_default())
        .doi(item.doi.unwrap_or_default())
        .url(item.url.unwrap_or_default())
        .abstract_text(item.abstract_text.as_deref().map(strip_tags).unwrap_or_default())
        .build()
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRWorkResponse {
    message: CRItem,
}

#[derive(Debug, Deserialize)]
struct CRListResponse {
    message: CRMessage,
}

#[derive(Debug, Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<CRItem>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    volume: Option<String>,
    page: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CRDate>,
    issued: Option<CRDate>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first()?.first().copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::utils::{ApiCallLog, RateLimiter};
    use mockito::Matcher;

    const WORK_JSON: &str = r#"{
        "status": "ok",
        "message": {
            "DOI": "10.5555/Attention.2017",
            "URL": "https://doi.org/10.5555/attention.2017",
            "title": ["Attention Is All You Need"],
            "author": [
                {"given": "Ashish", "family": "Vaswani"},
                {"family": "Shazeer"},
                {"name": "Google Brain"}
            ],
            "container-title": ["Advances in Neural Information Processing Systems"],
            "volume": "30",
            "page": "5998-6008",
            "abstract": "<jats:p>The dominant sequence transduction models</jats:p>",
            "published-print": {"date-parts": [[2017, 12]]}
        }
    }"#;

    fn source(server: &mockito::Server, log: ApiCallLog) -> CrossRefSource {
        let client = HttpClient::from_config(&HttpConfig::default(), RateLimiter::disabled())
            .unwrap()
            .with_api_log(log);
        CrossRefSource::new(Arc::new(client))
            .with_base_url(&server.url())
            .unwrap()
    }

    #[test]
    fn test_parse_work() {
        let data: CRWorkResponse = serde_json::from_str(WORK_JSON).unwrap();
        let record = parse_work(data.message);

        assert_eq!(record.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(
            record.authors,
            vec!["Vaswani, Ashish", "Shazeer", "Google Brain"]
        );
        assert_eq!(record.year, Some(2017));
        assert_eq!(record.doi.as_deref(), Some("10.5555/attention.2017"));
        assert_eq!(record.pages.as_deref(), Some("5998-6008"));
        assert_eq!(
            record.abstract_text.as_deref(),
            Some("The dominant sequence transduction models")
        );
    }

    #[test]
    fn test_year_falls_back_to_issued() {
        let item: CRItem = serde_json::from_str(
            r#"{"title": ["T"], "published-print": {"date-parts": [[null]]}, "issued": {"date-parts": [[2019, 1, 2]]}}"#,
        )
        .unwrap();
        assert_eq!(parse_work(item).year, Some(2019));
    }

    #[tokio::test]
    async fn test_get_by_doi() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/works/10\.5555".into()))
            .with_status(200)
            .with_body(WORK_JSON)
            .create_async()
            .await;

        let log = ApiCallLog::recording();
        let record = source(&server, log.clone())
            .get_by_doi("10.5555/attention.2017")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.year, Some(2017));
        assert_eq!(log.records_for("crossref").len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_doi_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex("^/works/.*".into()))
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;

        let result = source(&server, ApiCallLog::new())
            .get_by_doi("10.5555/missing")
            .await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_with_prefix_and_year() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "query.bibliographic".into(),
                    "attention Vaswani 2017".into(),
                ),
                Matcher::UrlEncoded("rows".into(), "3".into()),
                Matcher::UrlEncoded("filter".into(), "prefix:10.5555".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"message": {"total-results": 2, "items": [
                    {"title": ["Attention Is All You Need"], "DOI": "10.5555/a"},
                    {"DOI": "10.5555/untitled"}
                ]}}"#,
            )
            .create_async()
            .await;

        let query = SearchQuery::new("attention")
            .author("Vaswani")
            .year(2017)
            .doi_prefix("10.5555")
            .max_results(3);
        let records = source(&server, ApiCallLog::new())
            .search(&query)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doi.as_deref(), Some("10.5555/a"));
    }

    #[tokio::test]
    async fn test_search_sends_no_author_or_date_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded(
                "query.bibliographic".into(),
                "bert pre training devlin 2019".into(),
            ))
            .with_status(200)
            .with_body(r#"{"message": {"items": [{"title": ["BERT: Pre-training"]}]}}"#)
            .create_async()
            .await;

        let log = ApiCallLog::recording();
        let query = SearchQuery::new("bert pre training")
            .author("devlin")
            .year(2019);
        let records = source(&server, log.clone()).search(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);

        let calls = log.records();
        let params = &calls[0].params;
        assert!(!params.contains_key("filter"));
        assert!(!params.contains_key("query.author"));
    }

    #[tokio::test]
    async fn test_search_by_author() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query.author".into(), "Vaswani".into()),
                Matcher::UrlEncoded(
                    "filter".into(),
                    "from-pub-date:2017,until-pub-date:2017".into(),
                ),
            ]))
            .with_status(200)
            .with_body(r#"{"message": {"items": [{"title": ["Attention Is All You Need"]}]}}"#)
            .create_async()
            .await;

        let records = source(&server, ApiCallLog::new())
            .search_by_author("Vaswani", 5, Some(2017))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
    }
}
