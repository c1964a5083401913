// src/normalize.rs
//! Per-source normalization: turn a feed-shaped `RawRecord` into a stable
//! identity key plus a content fingerprint. A record missing a required
//! identity field is dropped with a diagnostic, never classified.

use once_cell::sync::OnceCell;
use serde_json::json;

use crate::categorize::{self, DocumentCategory};
use crate::sources::{RawRecord, SourceKind};
use crate::store::Fingerprint;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("{kind} record missing required field `{field}`")]
    MissingField {
        kind: SourceKind,
        field: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub source: SourceKind,
    pub key: String,
    pub fingerprint: Fingerprint,
    pub category: Option<DocumentCategory>,
    pub metadata: serde_json::Value,
}

/// Normalize text scraped from HTML: entity decode, strip tags, collapse
/// whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

// Query parameters that only bust caches; stripping them keeps "same URL,
// replaced file" mapped to one identity key.
const CACHE_BUSTER_PARAMS: &[&str] = &[
    "v", "ver", "version", "t", "ts", "timestamp", "cache", "cb", "_",
];

/// Canonicalize a URL for identity: lowercase scheme and host, drop the
/// fragment, strip cache-busting query parameters.
pub fn canonical_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);

    let (head, query) = match url.split_once('?') {
        Some((h, q)) => (h, Some(q)),
        None => (url, None),
    };

    let head = match head.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.split_once('/') {
                Some((host, path)) => (host, format!("/{path}")),
                None => (rest, String::new()),
            };
            format!("{}://{}{}", scheme.to_lowercase(), host.to_lowercase(), path)
        }
        None => head.to_string(),
    };

    let kept: Vec<&str> = query
        .map(|q| {
            q.split('&')
                .filter(|pair| {
                    let name = pair.split('=').next().unwrap_or(pair);
                    !CACHE_BUSTER_PARAMS.contains(&name.to_lowercase().as_str())
                })
                .collect()
        })
        .unwrap_or_default();

    if kept.is_empty() {
        head
    } else {
        format!("{}?{}", head, kept.join("&"))
    }
}

/// Lowercased identifier-safe company slug for key construction.
pub fn company_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Derive (key, fingerprint, metadata) for one raw record.
pub fn normalize(record: &RawRecord) -> Result<NormalizedRecord, NormalizeError> {
    match record {
        RawRecord::RecoveryUpdate {
            lender_id,
            update_id,
            year,
            status,
            substatus,
            recovered_amount,
            date,
            description,
            company_name,
        } => {
            let update_id = update_id.ok_or(NormalizeError::MissingField {
                kind: SourceKind::RecoveryUpdate,
                field: "update_id",
            })?;
            let fingerprint = Fingerprint::of_parts(&[
                status.as_deref().unwrap_or_default(),
                substatus.as_deref().unwrap_or_default(),
                recovered_amount.as_deref().unwrap_or_default(),
                date.as_deref().unwrap_or_default(),
            ]);
            Ok(NormalizedRecord {
                source: SourceKind::RecoveryUpdate,
                key: format!("ru:{lender_id}:{update_id}"),
                fingerprint,
                category: None,
                metadata: json!({
                    "lender_id": lender_id,
                    "year": year,
                    "status": status,
                    "substatus": substatus,
                    "recovered_amount": recovered_amount,
                    "date": date,
                    "description": description.as_deref().map(normalize_text),
                    "company_name": company_name,
                }),
            })
        }

        RawRecord::Campaign {
            id,
            name,
            valid_from,
            valid_to,
            bonus_amount,
            short_description,
        } => {
            let id = id.ok_or(NormalizeError::MissingField {
                kind: SourceKind::Campaign,
                field: "id",
            })?;
            let fingerprint = Fingerprint::of_parts(&[
                name.as_deref().unwrap_or_default(),
                valid_from.as_deref().unwrap_or_default(),
                valid_to.as_deref().unwrap_or_default(),
                bonus_amount.as_deref().unwrap_or_default(),
            ]);
            Ok(NormalizedRecord {
                source: SourceKind::Campaign,
                key: format!("camp:{id}"),
                fingerprint,
                category: None,
                metadata: json!({
                    "id": id,
                    "name": name,
                    "valid_from": valid_from,
                    "valid_to": valid_to,
                    "bonus_amount": bonus_amount,
                    "short_description": short_description.as_deref().map(normalize_text),
                }),
            })
        }

        RawRecord::Document {
            company_name,
            url,
            link_text,
            snippet,
            content,
            date,
        } => {
            let company = company_name.as_deref().ok_or(NormalizeError::MissingField {
                kind: SourceKind::Document,
                field: "company_name",
            })?;
            let url = url.as_deref().ok_or(NormalizeError::MissingField {
                kind: SourceKind::Document,
                field: "url",
            })?;
            let canonical = canonical_url(url);

            // Byte-content hash detects "same URL, replaced file"; when the
            // download failed we degrade to hashing the visible snippet and
            // record the degradation in metadata.
            let (fingerprint, degraded) = match content {
                Some(bytes) => (Fingerprint::of_bytes(bytes), false),
                None => (Fingerprint::of_text(&normalize_text(snippet)), true),
            };
            if degraded {
                tracing::debug!(url = %canonical, "document bytes unavailable, fingerprinting snippet text");
            }

            Ok(NormalizedRecord {
                source: SourceKind::Document,
                key: format!("doc:{}:{}", company_slug(company), canonical),
                fingerprint,
                category: Some(categorize::categorize(link_text, &canonical)),
                metadata: json!({
                    "company_name": company,
                    "url": canonical,
                    "title": normalize_text(link_text),
                    "date": date,
                    "fingerprint_degraded": degraded,
                }),
            })
        }

        RawRecord::News {
            title,
            url,
            date,
            snippet,
            company_name,
        } => {
            let url = url.as_deref().ok_or(NormalizeError::MissingField {
                kind: SourceKind::NewsItem,
                field: "url",
            })?;
            let title = title.as_deref().ok_or(NormalizeError::MissingField {
                kind: SourceKind::NewsItem,
                field: "title",
            })?;
            let canonical = canonical_url(url);
            // Providers re-serve the same URL with fresh snippets; only a
            // title or date change is worth renotifying.
            let fingerprint = Fingerprint::of_text(&format!(
                "{}|{}",
                normalize_text(title),
                date.as_deref().unwrap_or_default()
            ));
            Ok(NormalizedRecord {
                source: SourceKind::NewsItem,
                key: format!("news:{canonical}"),
                fingerprint,
                category: None,
                metadata: json!({
                    "title": normalize_text(title),
                    "url": canonical,
                    "date": date,
                    "snippet": snippet.as_deref().map(normalize_text),
                    "company_name": company_name,
                }),
            })
        }
    }
}
