// src/notify/mod.rs
pub mod dashboard;
pub mod telegram;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::categorize::DocumentCategory;
use crate::sources::SourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    New,
    Changed,
}

/// Ephemeral: produced by the change detector after the store commit,
/// consumed by the dispatcher. Never persisted by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub source: SourceKind,
    pub key: String,
    pub kind: EventKind,
    pub category: Option<DocumentCategory>,
    pub metadata: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// Minimal delivery capability a downstream consumer implements.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans events out to every registered sink. One sink's failure is logged and
/// counted, never propagated — it must not suppress the other sinks or block
/// the poller loop. Failures are never rolled back into the store: the store
/// commit is the durability boundary, delivery is best-effort on top of it.
pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in &self.sinks {
            match sink.deliver(event).await {
                Ok(()) => {
                    report.delivered += 1;
                    counter!("dispatch_delivered_total").increment(1);
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("dispatch_failed_total").increment(1);
                    tracing::warn!(
                        sink = sink.name(),
                        source = %event.source,
                        key = %event.key,
                        error = ?e,
                        "sink delivery failed"
                    );
                }
            }
        }
        report
    }

    pub async fn dispatch_all(&self, events: &[NotificationEvent]) -> DispatchReport {
        let mut total = DispatchReport::default();
        for event in events {
            let r = self.dispatch(event).await;
            total.delivered += r.delivered;
            total.failed += r.failed;
        }
        if total.failed > 0 {
            tracing::warn!(failed = total.failed, "degraded delivery in this cycle");
        }
        total
    }
}

fn meta_str<'a>(event: &'a NotificationEvent, field: &str) -> &'a str {
    event
        .metadata
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

/// Plain-text chat message per source kind. Formats follow the upstream
/// feeds' vocabulary.
pub fn render_message(event: &NotificationEvent) -> String {
    let prefix = match event.kind {
        EventKind::New => "New",
        EventKind::Changed => "Updated",
    };
    match event.source {
        SourceKind::RecoveryUpdate => {
            let company = meta_str(event, "company_name");
            let status = meta_str(event, "status");
            let date = meta_str(event, "date");
            let description = meta_str(event, "description");
            let mut msg = format!("{prefix} recovery update");
            if !company.is_empty() {
                msg.push_str(&format!(" for {company}"));
            }
            if !status.is_empty() {
                msg.push_str(&format!("\nStatus: {status}"));
            }
            if !date.is_empty() {
                msg.push_str(&format!("\nDate: {date}"));
            }
            if !description.is_empty() {
                msg.push_str(&format!("\n{description}"));
            }
            msg
        }
        SourceKind::Campaign => {
            let name = meta_str(event, "name");
            let from = meta_str(event, "valid_from");
            let to = meta_str(event, "valid_to");
            let mut msg = format!("{prefix} campaign: {name}");
            if !from.is_empty() || !to.is_empty() {
                msg.push_str(&format!("\nValid: {from} - {to}"));
            }
            msg
        }
        SourceKind::Document => {
            let company = meta_str(event, "company_name");
            let url = meta_str(event, "url");
            let label = event.category.unwrap_or(DocumentCategory::Unknown).label();
            let mut msg = format!("{prefix} {label} from {company}");
            let date = meta_str(event, "date");
            if !date.is_empty() {
                msg.push_str(&format!("\nLast updated: {date}"));
            }
            msg.push_str(&format!("\n{url}"));
            msg
        }
        SourceKind::NewsItem => {
            let title = meta_str(event, "title");
            let url = meta_str(event, "url");
            let company = meta_str(event, "company_name");
            let mut msg = format!("{prefix} news: {title}");
            if !company.is_empty() {
                msg.push_str(&format!("\nCompany: {company}"));
            }
            msg.push_str(&format!("\n{url}"));
            msg
        }
    }
}
