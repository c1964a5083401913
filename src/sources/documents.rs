// src/sources/documents.rs
//! Document feed: scrapes each configured company page for PDF links,
//! captures the text around the link (date extraction + fingerprint
//! fallback), and downloads the document bytes for content hashing within a
//! per-cycle budget.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;

use crate::config::{CompanyPage, DocumentSettings};
use crate::normalize::normalize_text;
use crate::sources::{RawRecord, SourceFeed, SourceKind};

pub struct DocumentFeed {
    client: Client,
    pages: Vec<CompanyPage>,
    max_downloads_per_cycle: usize,
}

impl DocumentFeed {
    pub fn new(client: Client, settings: &DocumentSettings) -> Self {
        Self {
            client,
            pages: settings.pages.clone(),
            max_downloads_per_cycle: settings.max_downloads_per_cycle,
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .await
            .with_context(|| format!("company page GET {url}"))?
            .error_for_status()
            .context("company page non-2xx")?
            .text()
            .await
            .context("company page body")
    }

    async fn fetch_document_bytes(&self, url: &str) -> Option<Vec<u8>> {
        match self.client.get(url).send().await {
            Ok(rsp) if rsp.status().is_success() => match rsp.bytes().await {
                Ok(b) => Some(b.to_vec()),
                Err(e) => {
                    tracing::debug!(url, error = ?e, "document body read failed");
                    None
                }
            },
            Ok(rsp) => {
                tracing::debug!(url, status = %rsp.status(), "document fetch refused");
                None
            }
            Err(e) => {
                tracing::debug!(url, error = ?e, "document fetch failed");
                None
            }
        }
    }
}

/// One extracted link with its page context.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageLink {
    pub url: String,
    pub link_text: String,
    pub snippet: String,
    pub date: Option<String>,
}

fn anchor_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
    })
}

fn is_pdf_href(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.to_lowercase().ends_with(".pdf")
}

/// Resolve a relative href against the page it was found on: root-relative
/// hrefs against the origin, directory-relative hrefs against the page's
/// directory.
pub(crate) fn absolutize(page_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let (origin, page_path) = match page_url.split_once("://") {
        Some((scheme, rest)) => match rest.split_once('/') {
            Some((host, path)) => (format!("{scheme}://{host}"), format!("/{path}")),
            None => (format!("{scheme}://{rest}"), String::new()),
        },
        None => (page_url.trim_end_matches('/').to_string(), String::new()),
    };
    if let Some(stripped) = href.strip_prefix('/') {
        format!("{origin}/{stripped}")
    } else {
        let dir = match page_path.rfind('/') {
            Some(i) => &page_path[..i],
            None => "",
        };
        format!("{origin}{dir}/{href}")
    }
}

// "Last Updated" labels first, bare date patterns as a fallback — mirrors how
// the company pages annotate their document tables.
const DATE_PATTERNS: &[&str] = &[
    r"(?i)Last\s+Updated:?\s*(\d{1,2}[./]\d{1,2}[./]\d{2,4})",
    r"(?i)Last\s+Updated:?\s*(\d{4}-\d{1,2}-\d{1,2})",
    r"(?i)Updated:?\s*(\d{1,2}[./]\d{1,2}[./]\d{2,4})",
    r"(?i)Date:?\s*(\d{1,2}[./]\d{1,2}[./]\d{2,4})",
    r"(\d{1,2}\.\d{1,2}\.\d{4})",
    r"(\d{4}-\d{2}-\d{2})",
];

fn date_res() -> &'static Vec<Regex> {
    static RES: OnceCell<Vec<Regex>> = OnceCell::new();
    RES.get_or_init(|| DATE_PATTERNS.iter().map(|p| Regex::new(p).unwrap()).collect())
}

/// Normalize the date formats seen on company pages to `YYYY-MM-DD`.
/// Unrecognized input passes through unchanged.
pub(crate) fn normalize_date(raw: &str) -> String {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d.%m.%Y",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%d.%m.%y",
        "%m/%d/%y",
        "%d/%m/%y",
    ];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

pub(crate) fn extract_date(text: &str) -> Option<String> {
    for re in date_res() {
        if let Some(caps) = re.captures(text) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                return Some(normalize_date(m.as_str()));
            }
        }
    }
    None
}

/// Extract PDF links from a company page with surrounding context.
pub(crate) fn extract_links(page_url: &str, html: &str) -> Vec<PageLink> {
    let mut out = Vec::new();
    for caps in anchor_re().captures_iter(html) {
        let href = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !is_pdf_href(href) {
            continue;
        }
        let whole = caps.get(0).unwrap();
        let link_text = normalize_text(caps.get(2).map(|m| m.as_str()).unwrap_or_default());

        // ±300 bytes around the anchor, aligned to char boundaries, is enough
        // context for the date label and the degraded fingerprint.
        let mut start = whole.start().saturating_sub(300);
        while !html.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (whole.end() + 300).min(html.len());
        while !html.is_char_boundary(end) {
            end += 1;
        }
        let snippet = normalize_text(&html[start..end]);

        out.push(PageLink {
            url: absolutize(page_url, href),
            link_text,
            date: extract_date(&snippet),
            snippet,
        });
    }
    out
}

#[async_trait]
impl SourceFeed for DocumentFeed {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        let mut downloads = 0usize;
        let mut failures = 0usize;

        for page in &self.pages {
            let html = match self.fetch_page(&page.url).await {
                Ok(html) => html,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(company = %page.company, error = ?e, "company page fetch failed");
                    continue;
                }
            };

            for link in extract_links(&page.url, &html) {
                let content = if downloads < self.max_downloads_per_cycle {
                    let bytes = self.fetch_document_bytes(&link.url).await;
                    if bytes.is_some() {
                        downloads += 1;
                    }
                    bytes
                } else {
                    None
                };

                records.push(RawRecord::Document {
                    company_name: Some(page.company.clone()),
                    url: Some(link.url),
                    link_text: link.link_text,
                    snippet: link.snippet,
                    content,
                    date: link.date,
                });
            }
        }

        if failures > 0 && failures == self.pages.len() && !self.pages.is_empty() {
            anyhow::bail!("all {} company pages failed", failures);
        }
        Ok(records)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Document
    }

    fn name(&self) -> &'static str {
        "documents"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table>
          <tr><td data-label="Last Updated">Last Updated: 01.02.2025</td>
              <td><a href="/assets/acme-presentation.pdf?v=7">Presentation</a></td></tr>
          <tr><td><a href="https://cdn.x.test/acme/financials.pdf">Financial statements</a></td></tr>
        </table>
        <a href="/about">About us</a>
        <a href="/files/terms.PDF">Terms</a>
        </body></html>
    "#;

    #[test]
    fn only_pdf_links_are_extracted_and_absolutized() {
        let links = extract_links("https://www.x.test/lending-companies/acme", PAGE);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.x.test/assets/acme-presentation.pdf?v=7",
                "https://cdn.x.test/acme/financials.pdf",
                "https://www.x.test/files/terms.PDF",
            ]
        );
    }

    #[test]
    fn link_text_and_nearby_date_are_captured() {
        let links = extract_links("https://www.x.test/acme", PAGE);
        assert_eq!(links[0].link_text, "Presentation");
        assert_eq!(links[0].date.as_deref(), Some("2025-02-01"));
    }

    #[test]
    fn date_formats_normalize_to_iso() {
        assert_eq!(normalize_date("01.02.2025"), "2025-02-01");
        assert_eq!(normalize_date("2025-02-01"), "2025-02-01");
        assert_eq!(normalize_date("02/01/2025"), "2025-02-01");
        assert_eq!(normalize_date("notadate"), "notadate");
    }

    #[test]
    fn extract_date_prefers_labelled_values() {
        let text = "Published 2020-01-01. Last Updated: 15.06.2024";
        assert_eq!(extract_date(text).as_deref(), Some("2024-06-15"));
    }

    #[test]
    fn absolutize_handles_relative_and_absolute() {
        assert_eq!(
            absolutize("https://www.x.test/a/b", "/c.pdf"),
            "https://www.x.test/c.pdf"
        );
        assert_eq!(
            absolutize("https://www.x.test/a", "https://cdn.y.test/c.pdf"),
            "https://cdn.y.test/c.pdf"
        );
    }

    #[test]
    fn directory_relative_href_resolves_against_the_page_directory() {
        assert_eq!(
            absolutize("https://www.x.test/a/b", "c.pdf"),
            "https://www.x.test/a/c.pdf"
        );
        assert_eq!(
            absolutize("https://www.x.test/lenders/acme/", "docs/report.pdf"),
            "https://www.x.test/lenders/acme/docs/report.pdf"
        );
        assert_eq!(absolutize("https://www.x.test", "c.pdf"), "https://www.x.test/c.pdf");
    }
}
