//! HTTP client utilities.
//!
//! Every adapter call goes through [`HttpClient::fetch`], which applies the
//! per-service rate limit, times the request, classifies the response status
//! and writes exactly one [`ApiCallRecord`]. There is no retry: a failed call
//! is reported once and the caller moves on.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::HttpConfig;
use crate::models::CitationRecord;
use crate::sources::SourceError;

use super::{ApiCallLog, ApiCallRecord, RateLimiter};

const PREVIEW_CHARS: usize = 200;

/// Things that can report how many results a response carried
pub trait ResultCount {
    fn result_count(&self) -> usize;
}

impl<T> ResultCount for Vec<T> {
    fn result_count(&self) -> usize {
        self.len()
    }
}

impl<T> ResultCount for Option<T> {
    fn result_count(&self) -> usize {
        usize::from(self.is_some())
    }
}

impl ResultCount for CitationRecord {
    fn result_count(&self) -> usize {
        1
    }
}

/// A GET request to one service endpoint
#[derive(Debug, Clone)]
pub struct ApiRequest {
    service: String,
    url: String,
    params: Vec<(String, String)>,
    headers: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn get(service: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter when a value is present
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Shared HTTP client with rate limiting and call logging
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    limiter: RateLimiter,
    api_log: ApiCallLog,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, SourceError> {
        Self::from_config(&HttpConfig::default(), RateLimiter::default())
    }

    /// Create a client from configuration
    pub fn from_config(config: &HttpConfig, limiter: RateLimiter) -> Result<Self, SourceError> {
        let user_agent = config.user_agent.clone().unwrap_or_else(|| {
            let mut ua = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            if let Some(mailto) = &config.mailto {
                ua.push_str(&format!(" (mailto:{})", mailto));
            }
            ua
        });

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                SourceError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client: Arc::new(client),
            limiter,
            api_log: ApiCallLog::new(),
        })
    }

    /// Replace the API call sink
    pub fn with_api_log(mut self, api_log: ApiCallLog) -> Self {
        self.api_log = api_log;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn api_log(&self) -> &ApiCallLog {
        &self.api_log
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Perform one rate-limited GET and parse the body.
    ///
    /// Non-success statuses become errors (429 `RateLimited`, 5xx `Server`,
    /// 404 `NotFound`); a body `parse` rejects becomes `Parse`. The outcome is
    /// logged once, with the number of parsed results on success.
    pub async fn fetch<T, F>(&self, request: &ApiRequest, parse: F) -> Result<T, SourceError>
    where
        T: ResultCount,
        F: FnOnce(&str) -> Result<T, SourceError>,
    {
        self.limiter.acquire(&request.service).await;

        let start = Instant::now();
        let mut builder = self.client.get(&request.url).query(&request.params);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let outcome = match builder.send().await {
            Ok(response) => {
                let status = response.status();
                match classify_status(status, &request.service) {
                    Some(err) => (Some(status.as_u16()), Err(err)),
                    None => match response.text().await {
                        Ok(body) => {
                            let parsed = parse(&body);
                            if let Err(e) = &parsed {
                                tracing::warn!(
                                    "Malformed {} response from {}: {} (payload: {:?})",
                                    request.service,
                                    request.url,
                                    e,
                                    preview(&body)
                                );
                            }
                            (Some(status.as_u16()), parsed)
                        }
                        Err(e) => (Some(status.as_u16()), Err(SourceError::from(e))),
                    },
                }
            }
            Err(e) => (e.status().map(|s| s.as_u16()), Err(SourceError::from(e))),
        };
        let elapsed = start.elapsed();

        let (status, result) = outcome;
        self.api_log.record(ApiCallRecord {
            timestamp: Utc::now(),
            service: request.service.clone(),
            method: "GET".to_string(),
            url: request.url.clone(),
            params: request.params.iter().cloned().collect::<BTreeMap<_, _>>(),
            response_status: status,
            response_time_ms: elapsed.as_millis() as u64,
            success: result.is_ok(),
            result_count: result.as_ref().ok().map(|r| r.result_count()),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }
}

fn classify_status(status: StatusCode, service: &str) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited(service.to_string()),
        StatusCode::NOT_FOUND => SourceError::NotFound(format!("{} returned 404", service)),
        s if s.is_server_error() => SourceError::Server(s.as_u16()),
        s => SourceError::Http(s.as_u16()),
    })
}

fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK, "crossref").is_none());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "crossref"),
            Some(SourceError::RateLimited(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "pubmed"),
            Some(SourceError::Server(503))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "arxiv"),
            Some(SourceError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "web"),
            Some(SourceError::Http(403))
        ));
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::get("crossref", "https://api.crossref.org/works")
            .param("rows", 5)
            .param_opt("mailto", None::<String>)
            .param_opt("filter", Some("prefix:10.1038"))
            .header("x-api-key", "k");
        assert_eq!(request.service(), "crossref");
        assert_eq!(
            request.params(),
            &[
                ("rows".to_string(), "5".to_string()),
                ("filter".to_string(), "prefix:10.1038".to_string())
            ]
        );
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(&"x".repeat(500)).len(), PREVIEW_CHARS);
    }

    fn test_client(log: ApiCallLog) -> HttpClient {
        HttpClient::from_config(&HttpConfig::default(), RateLimiter::disabled())
            .unwrap()
            .with_api_log(log)
    }

    #[tokio::test]
    async fn test_fetch_logs_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::UrlEncoded("rows".into(), "2".into()))
            .with_status(200)
            .with_body("a,b")
            .create_async()
            .await;

        let log = ApiCallLog::recording();
        let client = test_client(log.clone());
        let request = ApiRequest::get("crossref", format!("{}/works", server.url())).param("rows", 2);
        let items: Vec<String> = client
            .fetch(&request, |body| Ok(body.split(',').map(String::from).collect()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 2);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].response_status, Some(200));
        assert_eq!(records[0].result_count, Some(2));
        assert_eq!(records[0].params.get("rows").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_fetch_classifies_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/esearch.fcgi")
            .with_status(429)
            .create_async()
            .await;

        let log = ApiCallLog::recording();
        let client = test_client(log.clone());
        let request = ApiRequest::get("pubmed", format!("{}/esearch.fcgi", server.url()));
        let result: Result<Vec<String>, _> = client.fetch(&request, |_| Ok(Vec::new())).await;

        let err = result.unwrap_err();
        assert!(matches!(err, SourceError::RateLimited(_)));
        assert!(err.is_transient());
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].response_status, Some(429));
        assert!(records[0].error.is_some());
    }

    #[tokio::test]
    async fn test_fetch_reports_parse_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let log = ApiCallLog::recording();
        let client = test_client(log.clone());
        let request = ApiRequest::get("crossref", format!("{}/works", server.url()));
        let result: Result<Vec<serde_json::Value>, _> = client
            .fetch(&request, |body| Ok(serde_json::from_str(body)?))
            .await;

        assert!(matches!(result, Err(SourceError::Parse(_))));
        assert_eq!(log.records().len(), 1);
        assert!(!log.records()[0].success);
    }
}
