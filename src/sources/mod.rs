// src/sources/mod.rs
pub mod campaigns;
pub mod documents;
pub mod news;
pub mod recovery;

use anyhow::Result;

/// The fixed set of watched feeds. Extending the engine to a new feed means
/// adding a variant here plus a normalizer arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RecoveryUpdate,
    Campaign,
    Document,
    NewsItem,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecoveryUpdate => "recovery_update",
            Self::Campaign => "campaign",
            Self::Document => "document",
            Self::NewsItem => "news_item",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One freshly fetched record, feed-shaped. Fields are optional where the
/// upstream payloads are unreliable; the normalizer decides what is required.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RawRecord {
    RecoveryUpdate {
        lender_id: i64,
        update_id: Option<i64>,
        year: Option<i32>,
        status: Option<String>,
        substatus: Option<String>,
        recovered_amount: Option<String>,
        date: Option<String>,
        description: Option<String>,
        company_name: Option<String>,
    },
    Campaign {
        id: Option<i64>,
        name: Option<String>,
        valid_from: Option<String>,
        valid_to: Option<String>,
        bonus_amount: Option<String>,
        short_description: Option<String>,
    },
    Document {
        company_name: Option<String>,
        url: Option<String>,
        link_text: String,
        /// Text surrounding the link on the page; fingerprint fallback when
        /// the document bytes cannot be fetched.
        snippet: String,
        /// Fetched document bytes, when the download succeeded.
        content: Option<Vec<u8>>,
        date: Option<String>,
    },
    News {
        title: Option<String>,
        url: Option<String>,
        date: Option<String>,
        snippet: Option<String>,
        company_name: Option<String>,
    },
}

impl RawRecord {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::RecoveryUpdate { .. } => SourceKind::RecoveryUpdate,
            Self::Campaign { .. } => SourceKind::Campaign,
            Self::Document { .. } => SourceKind::Document,
            Self::News { .. } => SourceKind::NewsItem,
        }
    }
}

/// A watched feed. Fetch is opaque and possibly failing; the poller owns
/// cadence and backoff, the feed owns request construction and parsing.
#[async_trait::async_trait]
pub trait SourceFeed: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>>;
    fn kind(&self) -> SourceKind;
    fn name(&self) -> &'static str;
}
