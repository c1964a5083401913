// src/sources/news.rs
//! News feed: queries a search endpoint per configured company query and maps
//! hits to raw records. Prompting/backends behind the endpoint are not this
//! engine's concern; the response is treated as an opaque list of hits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::NewsSettings;
use crate::sources::{RawRecord, SourceFeed, SourceKind};

pub struct NewsFeed {
    client: Client,
    endpoint: String,
    queries: Vec<String>,
}

impl NewsFeed {
    pub fn new(client: Client, settings: &NewsSettings) -> Self {
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            queries: settings.queries.clone(),
        }
    }

    async fn fetch_query(&self, query: &str) -> Result<Vec<RawRecord>> {
        let body: serde_json::Value = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .with_context(|| format!("news search GET for `{query}`"))?
            .error_for_status()
            .context("news search non-2xx")?
            .json()
            .await
            .context("news search body")?;
        Ok(parse_hits(query, &body))
    }
}

fn str_field(v: &serde_json::Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|f| v.get(*f).and_then(|x| x.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts `{results: [...]}` or a bare array of hits. Field names vary by
/// provider, so the common aliases are probed in order.
pub(crate) fn parse_hits(query: &str, body: &serde_json::Value) -> Vec<RawRecord> {
    let hits = body
        .get("results")
        .and_then(|v| v.as_array())
        .cloned()
        .or_else(|| body.as_array().cloned())
        .unwrap_or_default();

    hits.iter()
        .map(|hit| RawRecord::News {
            title: str_field(hit, &["title"]),
            url: str_field(hit, &["url", "link"]),
            date: str_field(hit, &["date", "published_at", "page_age"]),
            snippet: str_field(hit, &["snippet", "description"]),
            company_name: Some(query.to_string()),
        })
        .collect()
}

#[async_trait]
impl SourceFeed for NewsFeed {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>> {
        if self.endpoint.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::new();
        let mut failures = 0usize;
        for query in &self.queries {
            match self.fetch_query(query).await {
                Ok(mut records) => all.append(&mut records),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(query = %query, error = ?e, "news query failed");
                }
            }
        }
        // Every query down points at the provider, so surface a fetch failure
        // for backoff instead of an empty batch.
        if failures > 0 && failures == self.queries.len() {
            anyhow::bail!("all {} news queries failed", failures);
        }
        Ok(all)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::NewsItem
    }

    fn name(&self) -> &'static str {
        "news"
    }
}
