// tests/detect_scenarios.rs
//! End-to-end detection scenarios over a real on-disk store.

use lendwatch::{detect, DocumentCategory, EventKind, FingerprintStore, RawRecord, SourceKind};

fn document(content: &[u8]) -> RawRecord {
    RawRecord::Document {
        company_name: Some("Acme Credit".into()),
        url: Some("https://x.test/docs/financial-statements.pdf".into()),
        link_text: "Financial statements".into(),
        snippet: "Last Updated: 01.02.2025".into(),
        content: Some(content.to_vec()),
        date: Some("2025-02-01".into()),
    }
}

fn recovery(status: &str) -> RawRecord {
    RawRecord::RecoveryUpdate {
        lender_id: 7,
        update_id: Some(42),
        year: Some(2025),
        status: Some(status.into()),
        substatus: None,
        recovered_amount: None,
        date: Some("2025-02-01".into()),
        description: Some("Court hearing held".into()),
        company_name: Some("Acme Credit".into()),
    }
}

#[test]
fn document_lifecycle_new_silent_changed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FingerprintStore::open(dir.path().join("fp.json")).unwrap();

    // First sighting: NEW, categorized financials.
    let report = detect(&store, &[document(b"h1-bytes")]);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::New);
    assert_eq!(report.events[0].category, Some(DocumentCategory::Financials));

    // Byte-identical refetch: silent.
    let report = detect(&store, &[document(b"h1-bytes")]);
    assert!(report.events.is_empty());

    // Replaced file at the same URL: CHANGED, category kept from creation.
    let report = detect(&store, &[document(b"h2-bytes")]);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Changed);
    assert_eq!(report.events[0].category, Some(DocumentCategory::Financials));
}

#[test]
fn recovery_status_transition_emits_one_changed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FingerprintStore::open(dir.path().join("fp.json")).unwrap();

    let first = detect(&store, &[recovery("pending")]);
    assert_eq!(first.events.len(), 1);
    assert_eq!(first.events[0].kind, EventKind::New);
    let created = store
        .get(SourceKind::RecoveryUpdate, &first.events[0].key)
        .unwrap();

    let second = detect(&store, &[recovery("resolved")]);
    assert_eq!(second.events.len(), 1);
    assert_eq!(second.events[0].kind, EventKind::Changed);

    let updated = store
        .get(SourceKind::RecoveryUpdate, &second.events[0].key)
        .unwrap();
    assert_eq!(updated.first_seen, created.first_seen);
    assert!(updated.last_seen >= created.last_seen);
}

#[test]
fn rerun_against_persisted_store_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fp.json");
    let batch = vec![recovery("pending"), document(b"bytes")];

    {
        let store = FingerprintStore::open(&path).unwrap();
        assert_eq!(detect(&store, &batch).events.len(), 2);
    }

    // Fresh process, same source state: zero notifications.
    let store = FingerprintStore::open(&path).unwrap();
    let report = detect(&store, &batch);
    assert!(report.events.is_empty());
    assert_eq!(report.dropped, 0);
}

#[test]
fn malformed_record_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = FingerprintStore::open(dir.path().join("fp.json")).unwrap();

    let malformed = RawRecord::Document {
        company_name: Some("Acme".into()),
        url: None, // no identity
        link_text: "Presentation".into(),
        snippet: String::new(),
        content: None,
        date: None,
    };
    let batch = vec![recovery("pending"), malformed, document(b"bytes")];

    let report = detect(&store, &batch);
    assert_eq!(report.events.len(), 2);
    assert_eq!(report.dropped, 1);
    // Order of the surviving records is preserved.
    assert_eq!(report.events[0].source, SourceKind::RecoveryUpdate);
    assert_eq!(report.events[1].source, SourceKind::Document);
}

#[test]
fn degraded_snippet_fingerprint_still_detects_change() {
    let dir = tempfile::tempdir().unwrap();
    let store = FingerprintStore::open(dir.path().join("fp.json")).unwrap();

    let mk = |snippet: &str| RawRecord::Document {
        company_name: Some("Acme".into()),
        url: Some("https://x.test/blocked.pdf".into()),
        link_text: "Loan agreement".into(),
        snippet: snippet.into(),
        content: None,
        date: None,
    };

    assert_eq!(detect(&store, &[mk("Last Updated: 01.02.2025")]).events.len(), 1);
    assert!(detect(&store, &[mk("Last Updated: 01.02.2025")]).events.is_empty());
    let changed = detect(&store, &[mk("Last Updated: 15.06.2025")]);
    assert_eq!(changed.events.len(), 1);
    assert_eq!(changed.events[0].kind, EventKind::Changed);
}
