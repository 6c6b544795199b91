use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::{BanPartition, BanSnapshot};

/// What the syncer is doing right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Downloading,
    Installing,
    Failed {
        last_error: String,
        next_retry_at: DateTime<Utc>,
    },
}

impl SyncState {
    /// A sync is currently running
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncState::Downloading | SyncState::Installing)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Downloading => write!(f, "downloading"),
            SyncState::Installing => write!(f, "installing"),
            SyncState::Failed {
                last_error,
                next_retry_at,
            } => write!(
                f,
                "failed ({}), next retry at {}",
                last_error,
                next_retry_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Fired by the background loop
    Scheduled,
    /// Requested by an operator
    Manual,
}

/// Summary of an installed snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub digest: String,
    pub installed_at: DateTime<Utc>,
    pub verified_records: usize,
    pub unverified_records: usize,
}

impl SyncReport {
    pub fn for_snapshot(snapshot: &BanSnapshot, installed_at: DateTime<Utc>) -> Self {
        Self {
            digest: snapshot.digest().to_string(),
            installed_at,
            verified_records: snapshot.record_count(BanPartition::Verified),
            unverified_records: snapshot.record_count(BanPartition::Unverified),
        }
    }
}

/// Result of a single [`trigger_sync`](super::SnapshotSyncer::trigger_sync) call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new snapshot was installed
    Installed(SyncReport),
    /// Manual trigger while another sync is running; that sync serves it
    AlreadyInProgress,
    /// Scheduled trigger that found nothing to do this tick
    Skipped,
    /// No API token configured
    NotConfigured,
    /// The attempt failed; the previous snapshot stays installed
    Failed(String),
}

impl SyncOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, SyncOutcome::Installed(_))
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Installed(report) => write!(
                f,
                "ban database updated: {} verified, {} unverified records",
                report.verified_records, report.unverified_records
            ),
            SyncOutcome::AlreadyInProgress => write!(f, "a ban database update is already running"),
            SyncOutcome::Skipped => write!(f, "ban database update skipped"),
            SyncOutcome::NotConfigured => {
                write!(f, "no API token configured, ban database not updated")
            }
            SyncOutcome::Failed(reason) => write!(f, "ban database update failed: {}", reason),
        }
    }
}
