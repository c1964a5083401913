// src/store.rs
//! Durable fingerprint store: the single source of truth for "have we seen
//! this item." One record per (source, key); every mutating upsert is written
//! to disk before the call returns, so a crash right after a commit never
//! forgets an item a notification already promised.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::categorize::DocumentCategory;
use crate::sources::SourceKind;

/// Opaque comparable content summary. Either a SHA-256 hex digest (documents,
/// news) or a joined tuple of the fields that define "changed" for a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Tuple fingerprint: equality of the joined fields means "not worth
    /// renotifying."
    pub fn of_parts(parts: &[&str]) -> Self {
        Self(parts.join("|"))
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_digest(&hasher.finalize()))
    }

    pub fn of_text(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredItem {
    pub fingerprint: Fingerprint,
    /// Set once at creation for documents, never recomputed.
    pub category: Option<DocumentCategory>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Source-specific payload needed to render a (re)notification. Opaque
    /// to the detector.
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: bool,
    pub changed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store (de)serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable mapping `(source, key) -> StoredItem`, persisted as one JSON
/// snapshot with a `.bak` sibling. All mutation goes through a single mutex;
/// poll cadences are measured in minutes, so a global write lock is not a
/// throughput concern.
pub struct FingerprintStore {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, StoredItem>>,
}

fn record_key(source: SourceKind, key: &str) -> String {
    format!("{}/{}", source.as_str(), key)
}

impl FingerprintStore {
    /// Load the snapshot at `path`, falling back to the `.bak` sibling when
    /// the main file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let items = if path.exists() {
            match Self::load_snapshot(&path) {
                Ok(items) => items,
                Err(e) => {
                    let bak = backup_path(&path);
                    if bak.exists() {
                        tracing::warn!(
                            error = %e,
                            path = %path.display(),
                            "store snapshot unreadable, restoring from backup"
                        );
                        Self::load_snapshot(&bak)?
                    } else {
                        return Err(e);
                    }
                }
            }
        } else {
            let bak = backup_path(&path);
            if bak.exists() {
                tracing::warn!(path = %path.display(), "store snapshot missing, restoring from backup");
                Self::load_snapshot(&bak)?
            } else {
                BTreeMap::new()
            }
        };

        tracing::info!(items = items.len(), path = %path.display(), "fingerprint store opened");
        Ok(Self {
            path,
            inner: Mutex::new(items),
        })
    }

    fn load_snapshot(path: &Path) -> Result<BTreeMap<String, StoredItem>, StoreError> {
        let raw = fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn get(&self, source: SourceKind, key: &str) -> Option<StoredItem> {
        let map = self.inner.lock().expect("store mutex poisoned");
        map.get(&record_key(source, key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic per-key upsert. Exactly one of N racing callers for an unseen
    /// key observes `created = true`. A record's category is written at
    /// creation and preserved on every later update; `first_seen` and the key
    /// are immutable.
    ///
    /// `created` or `changed` outcomes are durably written before returning.
    /// An equal-fingerprint observation only advances `last_seen` in memory;
    /// it is flushed with the next mutating write.
    pub fn upsert(
        &self,
        source: SourceKind,
        key: &str,
        fingerprint: Fingerprint,
        category: Option<DocumentCategory>,
        metadata: serde_json::Value,
    ) -> Result<UpsertOutcome, StoreError> {
        use std::collections::btree_map::Entry;

        let now = Utc::now();
        let mut map = self.inner.lock().expect("store mutex poisoned");

        let outcome = match map.entry(record_key(source, key)) {
            Entry::Vacant(slot) => {
                slot.insert(StoredItem {
                    fingerprint,
                    category,
                    first_seen: now,
                    last_seen: now,
                    metadata,
                });
                UpsertOutcome {
                    created: true,
                    changed: false,
                }
            }
            Entry::Occupied(mut slot) => {
                let item = slot.get_mut();
                if item.fingerprint == fingerprint {
                    item.last_seen = now;
                    UpsertOutcome {
                        created: false,
                        changed: false,
                    }
                } else {
                    item.fingerprint = fingerprint;
                    item.last_seen = now;
                    item.metadata = metadata;
                    UpsertOutcome {
                        created: false,
                        changed: true,
                    }
                }
            }
        };

        if outcome.created || outcome.changed {
            self.persist(&map)?;
        }
        Ok(outcome)
    }

    /// Write the snapshot atomically: temp file in the same directory,
    /// fsync, rename over the main file, then refresh the backup.
    fn persist(&self, map: &BTreeMap<String, StoredItem>) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");

        {
            let mut f = File::create(&tmp).map_err(|e| StoreError::Io {
                path: tmp.clone(),
                source: e,
            })?;
            f.write_all(&body).map_err(|e| StoreError::Io {
                path: tmp.clone(),
                source: e,
            })?;
            f.sync_all().map_err(|e| StoreError::Io {
                path: tmp.clone(),
                source: e,
            })?;
        }

        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        // Best-effort backup refresh; the main snapshot is already durable.
        if let Err(e) = fs::copy(&self.path, backup_path(&self.path)) {
            tracing::warn!(error = %e, "store backup refresh failed");
        }
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> FingerprintStore {
        FingerprintStore::open(dir.path().join("fingerprints.json")).unwrap()
    }

    #[test]
    fn first_upsert_creates_then_identical_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let fp = Fingerprint::of_parts(&["pending", "", "2025-01-01"]);
        let out = store
            .upsert(
                SourceKind::RecoveryUpdate,
                "ru:7:42",
                fp.clone(),
                None,
                serde_json::json!({}),
            )
            .unwrap();
        assert!(out.created && !out.changed);

        let out2 = store
            .upsert(SourceKind::RecoveryUpdate, "ru:7:42", fp, None, serde_json::json!({}))
            .unwrap();
        assert!(!out2.created && !out2.changed);
    }

    #[test]
    fn differing_fingerprint_reports_changed_and_keeps_first_seen() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .upsert(
                SourceKind::RecoveryUpdate,
                "ru:7:42",
                Fingerprint::of_parts(&["pending"]),
                None,
                serde_json::json!({}),
            )
            .unwrap();
        let before = store.get(SourceKind::RecoveryUpdate, "ru:7:42").unwrap();

        let out = store
            .upsert(
                SourceKind::RecoveryUpdate,
                "ru:7:42",
                Fingerprint::of_parts(&["resolved"]),
                None,
                serde_json::json!({}),
            )
            .unwrap();
        assert!(!out.created && out.changed);

        let after = store.get(SourceKind::RecoveryUpdate, "ru:7:42").unwrap();
        assert_eq!(after.first_seen, before.first_seen);
        assert!(after.last_seen >= before.last_seen);
        assert_eq!(after.fingerprint, Fingerprint::of_parts(&["resolved"]));
    }

    #[test]
    fn category_is_preserved_across_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let key = "doc:acme:https://x.test/a.pdf";

        store
            .upsert(
                SourceKind::Document,
                key,
                Fingerprint::of_bytes(b"h1"),
                Some(DocumentCategory::Financials),
                serde_json::json!({}),
            )
            .unwrap();

        // A changed document arrives re-categorized; the stored category wins.
        store
            .upsert(
                SourceKind::Document,
                key,
                Fingerprint::of_bytes(b"h2"),
                Some(DocumentCategory::Unknown),
                serde_json::json!({}),
            )
            .unwrap();

        let item = store.get(SourceKind::Document, key).unwrap();
        assert_eq!(item.category, Some(DocumentCategory::Financials));
    }

    #[test]
    fn racing_upserts_yield_exactly_one_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store
                    .upsert(
                        SourceKind::Campaign,
                        "camp:99",
                        Fingerprint::of_parts(&["Spring", "2025-03-01", "2025-04-01"]),
                        None,
                        serde_json::json!({}),
                    )
                    .unwrap()
            }));
        }

        let created: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn keys_are_scoped_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fp = Fingerprint::of_text("x");
        store
            .upsert(SourceKind::Campaign, "1", fp.clone(), None, serde_json::json!({}))
            .unwrap();
        let out = store
            .upsert(SourceKind::NewsItem, "1", fp, None, serde_json::json!({}))
            .unwrap();
        assert!(out.created);
        assert_eq!(store.len(), 2);
    }
}
