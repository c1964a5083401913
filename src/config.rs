// src/config.rs
//! Settings for the engine, loaded from a TOML file with serde defaults for
//! every field. Path resolution: $LENDWATCH_CONFIG, then
//! `config/lendwatch.toml`, then built-in defaults. Chat credentials come
//! from the environment only, never from the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const ENV_PATH: &str = "LENDWATCH_CONFIG";
const DEFAULT_PATH: &str = "config/lendwatch.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub lock_path: PathBuf,
    pub store_path: PathBuf,
    pub shutdown_grace_secs: u64,
    pub http: HttpSettings,
    pub backoff: BackoffSettings,
    pub recovery_updates: RecoverySettings,
    pub campaigns: CampaignSettings,
    pub documents: DocumentSettings,
    pub news: NewsSettings,
    pub sinks: SinkSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            lock_path: PathBuf::from("data/lendwatch.lock"),
            store_path: PathBuf::from("data/fingerprints.json"),
            shutdown_grace_secs: 10,
            http: HttpSettings::default(),
            backoff: BackoffSettings::default(),
            recovery_updates: RecoverySettings::default(),
            campaigns: CampaignSettings::default(),
            documents: DocumentSettings::default(),
            news: NewsSettings::default(),
            sinks: SinkSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_secs: u64,
    pub cap_secs: u64,
    pub max_consecutive_failures: u32,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_secs: 30,
            cap_secs: 900,
            max_consecutive_failures: 5,
        }
    }
}

/// A watched lending company: platform ID plus the display name used in
/// notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct LenderRef {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub api_base: String,
    pub lenders: Vec<LenderRef>,
    /// Polite delay between per-lender requests.
    pub request_delay_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 900,
            api_base: "https://www.mintos.com/webapp/api/marketplace-api/v1".to_string(),
            lenders: Vec::new(),
            request_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub url: String,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 900,
            url: "https://www.mintos.com/webapp/api/marketplace-api/v1/campaigns".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyPage {
    pub company: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub pages: Vec<CompanyPage>,
    /// Cap on document downloads per cycle; hashing falls back to snippet
    /// text past it.
    pub max_downloads_per_cycle: usize,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            pages: Vec::new(),
            max_downloads_per_cycle: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub endpoint: String,
    pub queries: Vec<String>,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 3600,
            endpoint: String::new(),
            queries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub telegram: bool,
    pub dashboard: bool,
    pub dashboard_spool: PathBuf,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            telegram: true,
            dashboard: true,
            dashboard_spool: PathBuf::from("data/dashboard_events.jsonl"),
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing settings {}", path.display()))
    }

    /// Env-var path first, then the conventional location, then defaults.
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            return Self::from_path(&pb);
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::from_path(&default);
        }
        tracing::info!("no settings file found, using built-in defaults");
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_in_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [recovery_updates]
            lenders = [{ id = 7, name = "Acme Credit" }, { id = 12 }]
            interval_secs = 300

            [documents]
            pages = [{ company = "Acme Credit", url = "https://x.test/acme" }]
            "#,
        )
        .unwrap();
        assert_eq!(s.recovery_updates.lenders.len(), 2);
        assert_eq!(s.recovery_updates.lenders[0].name.as_deref(), Some("Acme Credit"));
        assert_eq!(s.recovery_updates.interval_secs, 300);
        assert_eq!(s.documents.pages.len(), 1);
        assert_eq!(s.backoff.base_secs, 30);
        assert!(s.sinks.dashboard);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let s: Settings = toml::from_str("").unwrap();
        assert_eq!(s.store_path, PathBuf::from("data/fingerprints.json"));
        assert_eq!(s.backoff.max_consecutive_failures, 5);
        assert!(!s.news.enabled);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("settings.toml");
        std::fs::write(&p, "shutdown_grace_secs = 3\n").unwrap();

        std::env::set_var(ENV_PATH, p.display().to_string());
        let s = Settings::load().unwrap();
        std::env::remove_var(ENV_PATH);

        assert_eq!(s.shutdown_grace_secs, 3);
    }
}
