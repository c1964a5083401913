// src/sources/recovery.rs
//! Recovery-update feed: one API call per watched lender, grouped by year in
//! the upstream payload. The response shape is walked tolerantly — upstream
//! has served both bare and wrapped variants.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::{LenderRef, RecoverySettings};
use crate::sources::{RawRecord, SourceFeed, SourceKind};

pub struct RecoveryUpdateFeed {
    client: Client,
    api_base: String,
    lenders: Vec<LenderRef>,
    request_delay: Duration,
}

impl RecoveryUpdateFeed {
    pub fn new(client: Client, settings: &RecoverySettings) -> Self {
        Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            lenders: settings.lenders.clone(),
            request_delay: Duration::from_millis(settings.request_delay_ms),
        }
    }

    async fn fetch_lender(&self, lender: &LenderRef) -> Result<Vec<RawRecord>> {
        let url = format!(
            "{}/lender-companies/{}/recovery-updates",
            self.api_base, lender.id
        );
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("recovery updates GET for lender {}", lender.id))?
            .error_for_status()
            .context("recovery updates non-2xx")?
            .json()
            .await
            .context("recovery updates body")?;

        Ok(parse_lender_updates(lender, &body))
    }
}

fn value_to_amount(v: Option<&serde_json::Value>) -> Option<String> {
    match v {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(v: &serde_json::Value, field: &str) -> Option<String> {
    v.get(field)
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Walk `{items: [{year, items: [update...]}]}`, flattening year groups.
pub(crate) fn parse_lender_updates(lender: &LenderRef, body: &serde_json::Value) -> Vec<RawRecord> {
    let mut out = Vec::new();
    let year_groups = body
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    for group in &year_groups {
        let year = group.get("year").and_then(|y| y.as_i64()).map(|y| y as i32);
        let updates = group
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for item in &updates {
            out.push(RawRecord::RecoveryUpdate {
                lender_id: lender.id,
                update_id: item.get("id").and_then(|v| v.as_i64()),
                year,
                status: str_field(item, "status"),
                substatus: str_field(item, "substatus"),
                recovered_amount: value_to_amount(item.get("recoveredAmount")),
                date: str_field(item, "date"),
                description: str_field(item, "description"),
                company_name: lender.name.clone(),
            });
        }
    }
    out
}

#[async_trait]
impl SourceFeed for RecoveryUpdateFeed {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>> {
        let mut all = Vec::new();
        let mut failures = 0usize;
        for (i, lender) in self.lenders.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.request_delay).await;
            }
            match self.fetch_lender(lender).await {
                Ok(mut records) => all.append(&mut records),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(lender_id = lender.id, error = ?e, "lender fetch failed");
                }
            }
        }
        // All lenders down usually means the platform is, so surface a fetch
        // failure for backoff instead of an empty batch.
        if failures > 0 && failures == self.lenders.len() && !self.lenders.is_empty() {
            anyhow::bail!("all {} lender requests failed", failures);
        }
        Ok(all)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::RecoveryUpdate
    }

    fn name(&self) -> &'static str {
        "recovery_updates"
    }
}
