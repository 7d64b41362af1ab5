//! Web search source, scraping DuckDuckGo's HTML results page.
//!
//! There is no API contract here: the page layout can change at any time and
//! the service throttles aggressive clients. The source is therefore marked
//! SLOW and only used by fallback strategies, with a long per-call delay.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, OnceLock};

use crate::models::CitationRecord;
use crate::sources::{parse_base_url, SearchQuery, Source, SourceCapabilities, SourceError};
use crate::utils::{ApiRequest, HttpClient};

const WEB_SEARCH_URL: &str = "https://html.duckduckgo.com";

/// Browser-like agent; the HTML endpoint rejects obvious bots
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Web search source
#[derive(Debug, Clone)]
pub struct WebSearchSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl WebSearchSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: WEB_SEARCH_URL.to_string(),
        }
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
}

fn doi_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"10\.\d{4,9}/[^\s?#&]+").expect("valid regex"))
}

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19[5-9]\d|20\d{2})\b").expect("valid regex"))
}

/// Parse a results page into records
fn parse_results(html: &str, max_results: usize) -> Vec<CitationRecord> {
    let document = Html::parse_document(html);
    let Some(result_selector) = Selector::parse("div.result").ok() else {
        return Vec::new();
    };

    document
        .select(&result_selector)
        .filter_map(|elem| parse_result(&elem))
        .take(max_results)
        .collect()
}

fn parse_result(elem: &ElementRef) -> Option<CitationRecord> {
    let link_selector = Selector::parse("a.result__a").ok()?;
    let link = elem.select(&link_selector).next()?;

    let title = link.text().collect::<String>().trim().to_string();
    if title.is_empty() {
        return None;
    }
    let url = link.value().attr("href").map(resolve_redirect)?;

    let snippet_selector = Selector::parse(".result__snippet").ok()?;
    let snippet = elem
        .select(&snippet_selector)
        .next()
        .map(|s| s.text().collect::<String>())
        .unwrap_or_default();

    let year = year_pattern()
        .find(&snippet)
        .and_then(|m| m.as_str().parse().ok());

    let doi = doi_pattern()
        .find(&url)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let arxiv_id = url
        .split("arxiv.org/abs/")
        .nth(1)
        .unwrap_or_default()
        .to_string();

    Some(
        CitationRecord::builder()
            .title(title)
            .year_opt(year)
            .doi(doi)
            .arxiv_id(arxiv_id)
            .url(url)
            .abstract_text(snippet)
            .build(),
    )
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<encoded>`
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    url::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

#[async_trait]
impl Source for WebSearchSource {
    fn id(&self) -> &str {
        "web"
    }

    fn name(&self) -> &str {
        "Web Search"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::SLOW
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        let request = ApiRequest::get(self.id(), format!("{}/html/", self.base_url))
            .param("q", web_query(query))
            .header("user-agent", BROWSER_USER_AGENT);

        let max_results = query.max_results;
        self.client
            .fetch(&request, |body| Ok(parse_results(body, max_results)))
            .await
    }
}

/// Quote the title as a phrase and leave author and year as loose terms
fn web_query(query: &SearchQuery) -> String {
    let mut q = format!("\"{}\"", query.text);
    if let Some(author) = &query.author {
        q.push(' ');
        q.push_str(author);
    }
    if let Some(year) = query.year {
        q.push_str(&format!(" {}", year));
    }
    q
}
