// src/categorize.rs
//! Keyword-rule categorization of discovered document links.
//!
//! Pure and deterministic: the category is computed once when a document is
//! first seen and persisted with it, so rule changes never re-notify
//! unchanged items.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Presentation,
    Financials,
    LoanAgreement,
    Unknown,
}

impl DocumentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::Financials => "financials",
            Self::LoanAgreement => "loan_agreement",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable label for notification formatting.
    pub fn label(self) -> &'static str {
        match self {
            Self::Presentation => "Presentation",
            Self::Financials => "Financials",
            Self::LoanAgreement => "Loan Agreement",
            Self::Unknown => "Document",
        }
    }
}

impl std::fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Ordered: first match wins. Anchor text is checked before the URL because
// it is the more reliable signal on company pages.
const RULES: &[(DocumentCategory, &[&str])] = &[
    (
        DocumentCategory::Presentation,
        &["presentation", "prezentacija", "prezentace", "investor deck"],
    ),
    (
        DocumentCategory::Financials,
        &[
            "financials",
            "financial statement",
            "financial report",
            "annual report",
            "interim report",
            "audited accounts",
        ],
    ),
    (
        DocumentCategory::LoanAgreement,
        &[
            "loan agreement",
            "assignment agreement",
            "cooperation agreement",
        ],
    ),
];

/// Classify a document link from its anchor text and URL.
pub fn categorize(link_text: &str, url: &str) -> DocumentCategory {
    let text = link_text.to_lowercase();
    let url = url.to_lowercase();
    for (category, keywords) in RULES {
        if keywords.iter().any(|k| text.contains(k)) {
            return *category;
        }
    }
    // URL fallback: filenames like `loan_agreement_2024.pdf`.
    for (category, keywords) in RULES {
        if keywords.iter().any(|k| {
            url.contains(k) || url.contains(&k.replace(' ', "_")) || url.contains(&k.replace(' ', "-"))
        }) {
            return *category;
        }
    }
    DocumentCategory::Unknown
}
