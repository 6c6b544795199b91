//! Ban list synchronization
//!
//! ```text
//!            trigger_sync(Scheduled | Manual)
//!                        │
//!   Idle ──► Downloading ──► Installing ──► Idle
//!               │                │
//!               └──────┬─────────┘
//!                      ▼
//!   Failed { last_error, next_retry_at } ──(retry delay elapsed)──► Downloading
//! ```
//!
//! The syncer owns the only handle to the current [`BanSnapshot`]. Readers
//! clone the `Arc` under a short read lock, so installing a new snapshot never
//! waits for an in-flight enforcement decision and readers never observe a
//! partially built one.
//!
//! [`BanSnapshot`]: crate::snapshot::BanSnapshot

mod state;
mod syncer;

pub use state::{SyncOutcome, SyncReport, SyncState, SyncTrigger};
pub use syncer::SnapshotSyncer;
