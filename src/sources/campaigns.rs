// src/sources/campaigns.rs
//! Campaign feed. The endpoint has served three shapes over time: a bare
//! array, an object wrapping a `campaigns` array, and a single object.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::CampaignSettings;
use crate::sources::{RawRecord, SourceFeed, SourceKind};

pub struct CampaignFeed {
    client: Client,
    url: String,
}

impl CampaignFeed {
    pub fn new(client: Client, settings: &CampaignSettings) -> Self {
        Self {
            client,
            url: settings.url.clone(),
        }
    }
}

fn str_field(v: &serde_json::Value, field: &str) -> Option<String> {
    v.get(field)
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn amount_field(v: &serde_json::Value, field: &str) -> Option<String> {
    match v.get(field) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_campaigns(body: &serde_json::Value) -> Vec<RawRecord> {
    let items: Vec<serde_json::Value> = if let Some(arr) = body.as_array() {
        arr.clone()
    } else if let Some(arr) = body.get("campaigns").and_then(|v| v.as_array()) {
        arr.clone()
    } else if body.is_object() {
        vec![body.clone()]
    } else {
        Vec::new()
    };

    items
        .iter()
        .map(|c| RawRecord::Campaign {
            id: c.get("id").and_then(|v| v.as_i64()),
            name: str_field(c, "name"),
            valid_from: str_field(c, "validFrom"),
            valid_to: str_field(c, "validTo"),
            bonus_amount: amount_field(c, "bonusAmount"),
            short_description: str_field(c, "shortDescription"),
        })
        .collect()
}

#[async_trait]
impl SourceFeed for CampaignFeed {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>> {
        let body: serde_json::Value = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("campaigns GET")?
            .error_for_status()
            .context("campaigns non-2xx")?
            .json()
            .await
            .context("campaigns body")?;
        Ok(parse_campaigns(&body))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Campaign
    }

    fn name(&self) -> &'static str {
        "campaigns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_and_wrapped_shapes_parse_alike() {
        let campaign = json!({
            "id": 12, "name": "Spring cashback",
            "validFrom": "2025-03-01", "validTo": "2025-04-01",
            "bonusAmount": 1.5,
        });

        let from_array = parse_campaigns(&json!([campaign]));
        let from_wrapped = parse_campaigns(&json!({ "campaigns": [campaign] }));
        assert_eq!(from_array, from_wrapped);
        assert_eq!(from_array.len(), 1);
        match &from_array[0] {
            RawRecord::Campaign { id, bonus_amount, .. } => {
                assert_eq!(*id, Some(12));
                assert_eq!(bonus_amount.as_deref(), Some("1.5"));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn single_object_is_one_campaign() {
        let out = parse_campaigns(&json!({"id": 3, "name": "Solo"}));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn non_object_body_is_empty() {
        assert!(parse_campaigns(&json!("nope")).is_empty());
    }
}
