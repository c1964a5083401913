// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod categorize;
pub mod config;
pub mod detect;
pub mod engine;
pub mod lock;
pub mod normalize;
pub mod notify;
pub mod poller;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::categorize::DocumentCategory;
pub use crate::detect::{detect, DetectReport};
pub use crate::engine::Engine;
pub use crate::lock::{InstanceLock, LockError};
pub use crate::notify::{Dispatcher, EventKind, NotificationEvent, Sink};
pub use crate::sources::{RawRecord, SourceFeed, SourceKind};
pub use crate::store::{Fingerprint, FingerprintStore, StoreError, UpsertOutcome};
