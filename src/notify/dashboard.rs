// src/notify/dashboard.rs
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use super::{NotificationEvent, Sink};

/// Dashboard storage sink: appends each event as one JSON line to a spool
/// file the (external) dashboard reads for display. Appends are serialized
/// so interleaved pollers never shear a line.
pub struct DashboardSink {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl DashboardSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl Sink for DashboardSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize dashboard event")?;

        let _guard = self.write_guard.lock().expect("dashboard mutex poisoned");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create spool dir for {}", self.path.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open dashboard spool {}", self.path.display()))?;
        writeln!(file, "{line}").context("append dashboard event")?;
        file.flush().context("flush dashboard spool")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dashboard"
    }
}
