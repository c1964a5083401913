// src/detect.rs
//! Change detection over one fetched batch. The detector is the only writer
//! of the fingerprint store; everything downstream consumes derived events.

use chrono::Utc;
use metrics::counter;

use crate::normalize;
use crate::notify::{EventKind, NotificationEvent};
use crate::sources::RawRecord;
use crate::store::FingerprintStore;

#[derive(Debug, Default)]
pub struct DetectReport {
    /// New/changed events in fetch-batch order.
    pub events: Vec<NotificationEvent>,
    /// Records dropped because a required identity field was missing.
    pub dropped: usize,
    /// Records whose store commit failed; the batch continues past them so
    /// the caller can decide whether to back off.
    pub store_errors: usize,
}

/// Classify each record of a batch as new, changed, or unchanged, committing
/// the store update per record. One malformed record never aborts the rest.
pub fn detect(store: &FingerprintStore, batch: &[RawRecord]) -> DetectReport {
    let mut report = DetectReport::default();
    counter!("detect_records_total").increment(batch.len() as u64);

    for record in batch {
        let normalized = match normalize::normalize(record) {
            Ok(n) => n,
            Err(e) => {
                report.dropped += 1;
                counter!("detect_dropped_total").increment(1);
                tracing::warn!(source = %record.kind(), error = %e, "dropping malformed record");
                continue;
            }
        };

        let outcome = match store.upsert(
            normalized.source,
            &normalized.key,
            normalized.fingerprint,
            normalized.category,
            normalized.metadata.clone(),
        ) {
            Ok(o) => o,
            Err(e) => {
                report.store_errors += 1;
                counter!("detect_store_errors_total").increment(1);
                tracing::error!(
                    source = %normalized.source,
                    key = %normalized.key,
                    error = %e,
                    "store commit failed for record"
                );
                continue;
            }
        };

        let kind = if outcome.created {
            counter!("detect_new_total").increment(1);
            EventKind::New
        } else if outcome.changed {
            counter!("detect_changed_total").increment(1);
            EventKind::Changed
        } else {
            continue;
        };

        // The category carried on the event is the stored one, so a changed
        // document keeps the category computed at creation.
        let category = store
            .get(normalized.source, &normalized.key)
            .and_then(|item| item.category);

        report.events.push(NotificationEvent {
            source: normalized.source,
            key: normalized.key,
            kind,
            category,
            metadata: normalized.metadata,
            ts: Utc::now(),
        });
    }

    report
}
