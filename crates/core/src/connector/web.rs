//! HTTP connector for web pages.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{Html, Node, Selector};
use tracing::{debug, warn};

use crate::config::ConnectorConfig;
use crate::content::{canonical_url, FetchedItem};
use crate::metrics;
use crate::source::Source;

use super::{Connector, ConnectorError};

/// Elements whose text is never visible on the page.
const INVISIBLE: [&str; 5] = ["head", "script", "style", "noscript", "template"];

/// Fetches every URL of a source's fetch parameters as one item.
pub struct WebConnector {
    client: Client,
    max_concurrent_fetches: usize,
}

impl WebConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConnectorError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<FetchedItem, ConnectorError> {
        let start = Instant::now();
        let result = self.get_body(url).await;

        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["web"])
            .observe(start.elapsed().as_secs_f64());
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["web", if result.is_ok() { "success" } else { "error" }])
            .inc();

        let html = result?;
        Ok(FetchedItem {
            external_id: canonical_url(url),
            url: url.to_string(),
            title: extract_title(&html),
            text: extract_text(&html),
            fetched_at: Utc::now(),
        })
    }

    async fn get_body(&self, url: &str) -> Result<String, ConnectorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ConnectorError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Http(format!("{} returned {}", url, status)));
        }

        response.text().await.map_err(ConnectorError::from_reqwest)
    }
}

#[async_trait]
impl Connector for WebConnector {
    fn name(&self) -> &str {
        "web"
    }

    async fn fetch(&self, source: &Source) -> Result<Vec<FetchedItem>, ConnectorError> {
        let urls: Vec<(usize, String)> = source
            .fetch
            .urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(String::from)
            .enumerate()
            .collect();

        if urls.is_empty() {
            return Err(ConnectorError::MissingConfiguration {
                source_id: source.id.clone(),
                reason: "no URLs configured".to_string(),
            });
        }

        debug!(source_id = %source.id, urls = urls.len(), "Fetching web source");

        let mut results: Vec<(usize, FetchedItem)> = stream::iter(urls)
            .map(|(index, url)| {
                let source_id = source.id.clone();
                async move {
                    match self.fetch_page(&url).await {
                        Ok(item) => Some((index, item)),
                        Err(e) => {
                            warn!(source_id = %source_id, url = %url, error = %e, "Failed to fetch page");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        // Keep configuration order regardless of completion order.
        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, item)| item).collect())
    }
}

/// Text of the first `<title>` element, if non-empty.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()
        .map(|n| collapse_whitespace(&n.text().collect::<String>()))?;

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Visible text of a page: text nodes outside `<head>`, scripts and styles.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let parts: Vec<&str> = document
        .root_element()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some((node, &**text)),
            _ => None,
        })
        .filter(|(node, _)| {
            !node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| INVISIBLE.contains(&e.name()))
            })
        })
        .map(|(_, text)| text)
        .collect();

    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
