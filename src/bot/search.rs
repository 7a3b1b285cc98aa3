//! Search by scraping result pages.
//!
//! There is no API here: the bot downloads the same HTML a browser would and
//! picks result blocks out with CSS selectors from the config. When a provider
//! redesigns its page the selectors stop matching and searches come back empty
//! until the config is updated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::outcome::{LookupOutcome, ProviderError};
use crate::config::{SearchConfig, SearchProviderConfig};

/// Browser-like agent; Google serves a consent page or nothing to unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Max chars of a description snippet kept in the reply.
const MAX_DESCRIPTION_LENGTH: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    Habr,
}

impl SearchEngine {
    pub fn name(&self) -> &'static str {
        match self {
            SearchEngine::Google => "google",
            SearchEngine::Habr => "habr",
        }
    }
}

/// One hit, in the provider's ranking order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub link: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn search(&self, engine: SearchEngine, query: &str) -> LookupOutcome<Vec<SearchResult>>;
}

pub struct SearchLookup {
    config: SearchConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl SearchLookup {
    pub fn new(config: SearchConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { config, client, timeout })
    }

    fn provider(&self, engine: SearchEngine) -> &SearchProviderConfig {
        match engine {
            SearchEngine::Google => &self.config.google,
            SearchEngine::Habr => &self.config.habr,
        }
    }
}

#[async_trait]
impl SearchSource for SearchLookup {
    async fn search(&self, engine: SearchEngine, query: &str) -> LookupOutcome<Vec<SearchResult>> {
        info!("🔎 Searching {} for \"{}\"", engine.name(), query);
        let provider = self.provider(engine);

        let url = provider
            .url_template
            .replace("{query}", &urlencoding::encode(query));
        let page_url = match Url::parse(&url) {
            Ok(url) => url,
            Err(e) => return LookupOutcome::ProviderError(ProviderError::Http(format!("bad search url {url}: {e}"))),
        };

        let response = match self.client.get(page_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return LookupOutcome::ProviderError(ProviderError::from_reqwest(e, self.timeout)),
        };

        let status = response.status();
        if !status.is_success() {
            return LookupOutcome::ProviderError(ProviderError::Status(status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return LookupOutcome::ProviderError(ProviderError::from_reqwest(e, self.timeout)),
        };
        debug!("Got {} bytes of HTML from {}", body.len(), engine.name());

        match extract_results(&body, provider, &page_url) {
            Ok(results) if results.is_empty() => LookupOutcome::NotFound(query.to_string()),
            Ok(results) => {
                info!("🔎 {} results from {}", results.len(), engine.name());
                LookupOutcome::Success(results)
            }
            Err(e) => LookupOutcome::ProviderError(e),
        }
    }
}

fn compile(selector: &str) -> Result<Selector, ProviderError> {
    Selector::parse(selector).map_err(|e| ProviderError::Malformed(format!("selector '{selector}': {e}")))
}

/// Pull results out of a result page, in document order.
///
/// A block must yield a usable link, and a title when the provider has a title
/// selector; blocks that don't are skipped. A block nested inside another
/// matching block is part of that result, not a result of its own.
pub fn extract_results(
    html: &str,
    provider: &SearchProviderConfig,
    page_url: &Url,
) -> Result<Vec<SearchResult>, ProviderError> {
    let block_selector = compile(&provider.result_selector)?;
    let link_selector = compile(&provider.link_selector)?;
    let title_selector = provider.title_selector.as_deref().map(compile).transpose()?;
    let description_selector = provider
        .description_selector
        .as_deref()
        .map(compile)
        .transpose()?;

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for block in document.select(&block_selector) {
        if has_matching_ancestor(block, &block_selector) {
            continue;
        }
        let Some(result) = extract_block(
            block,
            &link_selector,
            title_selector.as_ref(),
            description_selector.as_ref(),
            page_url,
        ) else {
            debug!("Skipping result block without a usable link or title");
            continue;
        };
        results.push(result);
    }

    Ok(results)
}

fn has_matching_ancestor(block: ElementRef<'_>, selector: &Selector) -> bool {
    block
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| selector.matches(&ancestor))
}

fn extract_block(
    block: ElementRef<'_>,
    link_selector: &Selector,
    title_selector: Option<&Selector>,
    description_selector: Option<&Selector>,
    page_url: &Url,
) -> Option<SearchResult> {
    let href = block
        .select(link_selector)
        .find_map(|a| a.value().attr("href"))?;
    let link = resolve_link(href, page_url)?;

    let title = match title_selector {
        Some(selector) => Some(element_text(block.select(selector).next()?)).filter(|t| !t.is_empty()),
        None => None,
    };
    if title_selector.is_some() && title.is_none() {
        return None;
    }

    let description = description_selector
        .and_then(|selector| block.select(selector).next())
        .map(element_text)
        .filter(|d| !d.is_empty())
        .map(|d| truncate(&d, MAX_DESCRIPTION_LENGTH));

    Some(SearchResult { link, title, description })
}

/// Make a link absolute, unwrap Google's `/url?q=` redirects, and keep only
/// http(s) targets.
fn resolve_link(href: &str, page_url: &Url) -> Option<String> {
    let url = page_url.join(href).ok()?;
    let url = if url.path() == "/url" {
        let target = url
            .query_pairs()
            .find(|(key, _)| key == "q" || key == "url")
            .map(|(_, value)| value.into_owned())?;
        Url::parse(&target).ok()?
    } else {
        url
    };

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// Visible text of an element with whitespace runs collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    }
}
