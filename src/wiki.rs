use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

use itertools::Itertools;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::locator::PageRef;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("wiki api error {code}: {info}")]
    Api { code: String, info: String },
    #[error("malformed wiki api response")]
    MalformedResponse,
}

/// A fetched wiki page. Replaced wholesale on every successful navigation;
/// the race session never mutates one.
#[derive(Debug, Clone)]
pub struct WikiPage {
    pub id: u64,
    pub title: String,
    pub url: PageRef,
    /// Raw rendered HTML from the parse API.
    pub body: String,
    /// Same-wiki article names linked from the body, in document order.
    pub links: Vec<String>,
    pub fetched_at: Instant,
}

impl WikiPage {
    pub fn new(id: u64, title: String, url: PageRef, body: String) -> Self {
        let links = extract_article_links(&body);
        Self {
            id,
            title,
            url,
            body,
            links,
            fetched_at: Instant::now(),
        }
    }
}

/// Pulls followable article links out of rendered page HTML.
///
/// Only site-relative `/wiki/...` hrefs count: external hosts and bare
/// `#fragment` anchors never match, and namespaced pages (`File:`,
/// `Help:`, ...) are dropped. Order is preserved, duplicates removed.
pub fn extract_article_links(body: &str) -> Vec<String> {
    static ARTICLE_HREF: OnceLock<Regex> = OnceLock::new();
    let href = ARTICLE_HREF
        .get_or_init(|| Regex::new(r##"href="/wiki/([^"#?]+)""##).expect("static regex"));

    href.captures_iter(body)
        .map(|cap| cap[1].to_string())
        .filter(|name| !name.contains(':'))
        .unique()
        .collect()
}

/// Seam between the race runtime and the remote wiki. The production
/// implementation talks HTTP; tests substitute canned pages.
pub trait PageFetcher: Send + Sync + 'static {
    /// Fetches one page by article name from the given wiki host.
    fn fetch_page(&self, page: &str, host: &str) -> Result<WikiPage, FetchError>;

    /// Asks the wiki for one random article title.
    fn random_page(&self, host: &str) -> Result<String, FetchError>;
}

// action=parse response shapes

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParsePayload>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ParsePayload {
    title: String,
    pageid: u64,
    text: TextBlob,
}

#[derive(Debug, Deserialize)]
struct TextBlob {
    #[serde(rename = "*")]
    html: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

// generator=random response shapes

#[derive(Debug, Deserialize)]
struct RandomResponse {
    query: Option<RandomQuery>,
}

#[derive(Debug, Deserialize)]
struct RandomQuery {
    pages: HashMap<String, RandomPage>,
}

#[derive(Debug, Deserialize)]
struct RandomPage {
    title: String,
}

/// Blocking MediaWiki API client. One instance is shared across the fetch
/// worker threads via `Arc`.
pub struct WikipediaClient {
    http: reqwest::blocking::Client,
}

impl WikipediaClient {
    pub fn new() -> Self {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("wikirush/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { http }
    }

    fn api_url(host: &str) -> String {
        format!("https://{}/w/api.php", host)
    }
}

impl Default for WikipediaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher for WikipediaClient {
    fn fetch_page(&self, page: &str, host: &str) -> Result<WikiPage, FetchError> {
        let response: ParseResponse = self
            .http
            .get(Self::api_url(host))
            .query(&[
                ("action", "parse"),
                ("page", page),
                ("origin", "*"),
                ("format", "json"),
            ])
            .send()?
            .error_for_status()?
            .json()?;

        if let Some(error) = response.error {
            return Err(FetchError::Api {
                code: error.code,
                info: error.info,
            });
        }
        let payload = response.parse.ok_or(FetchError::MalformedResponse)?;

        let url = PageRef::from_title(&payload.title, host);
        Ok(WikiPage::new(
            payload.pageid,
            payload.title,
            url,
            payload.text.html,
        ))
    }

    fn random_page(&self, host: &str) -> Result<String, FetchError> {
        let response: RandomResponse = self
            .http
            .get(Self::api_url(host))
            .query(&[
                ("action", "query"),
                ("generator", "random"),
                ("grnnamespace", "0"),
                ("grnlimit", "1"),
                ("prop", "info"),
                ("origin", "*"),
                ("format", "json"),
            ])
            .send()?
            .error_for_status()?
            .json()?;

        response
            .query
            .and_then(|q| q.pages.into_values().next())
            .map(|p| p.title)
            .ok_or(FetchError::MalformedResponse)
    }
}

/// Canned fetcher for tests and offline development.
pub struct StaticFetcher {
    pages: HashMap<String, WikiPage>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    /// Registers a page under its article name, with body links pointing at
    /// `links`.
    pub fn add_page(&mut self, name: &str, id: u64, host: &str, links: &[&str]) {
        let body: String = links
            .iter()
            .map(|l| format!("<p><a href=\"/wiki/{}\">{}</a></p>", l, l))
            .collect();
        let url = PageRef::from_title(name, host);
        let title = url.title();
        self.pages
            .insert(name.to_string(), WikiPage::new(id, title, url, body));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher for StaticFetcher {
    fn fetch_page(&self, page: &str, _host: &str) -> Result<WikiPage, FetchError> {
        self.pages.get(page).cloned().ok_or(FetchError::Api {
            code: "missingtitle".to_string(),
            info: format!("The page you specified doesn't exist: {}", page),
        })
    }

    fn random_page(&self, _host: &str) -> Result<String, FetchError> {
        self.pages
            .values()
            .next()
            .map(|p| p.title.clone())
            .ok_or(FetchError::MalformedResponse)
    }
}
