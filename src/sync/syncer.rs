use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use super::state::{SyncOutcome, SyncReport, SyncState, SyncTrigger};
use crate::config::GuardConfig;
use crate::error::SyncError;
use crate::remote::BanService;
use crate::snapshot::BanSnapshot;

/// Downloads, validates and installs ban snapshots
pub struct SnapshotSyncer {
    service: Arc<dyn BanService>,
    token: String,
    data_dir: PathBuf,
    database_path: PathBuf,
    interval: Duration,
    retry_delay: Duration,
    current: RwLock<Option<Arc<BanSnapshot>>>,
    state: Mutex<SyncState>,
    last_report: Mutex<Option<SyncReport>>,
}

/// Resets the state to `Idle` if a sync future is dropped mid-flight
struct InFlightGuard<'a> {
    state: &'a Mutex<SyncState>,
    finished: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SyncState::Idle;
        }
    }
}

impl SnapshotSyncer {
    pub fn new(config: &GuardConfig, service: Arc<dyn BanService>) -> Self {
        Self {
            service,
            token: config.remote.token.clone(),
            data_dir: config.sync.data_dir.clone(),
            database_path: config.database_path(),
            interval: config.sync_interval(),
            retry_delay: config.retry_delay(),
            current: RwLock::new(None),
            state: Mutex::new(SyncState::Idle),
            last_report: Mutex::new(None),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SyncState) {
        *self.lock_state() = state;
    }

    pub fn state(&self) -> SyncState {
        self.lock_state().clone()
    }

    /// Summary of the most recently installed snapshot
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Currently installed snapshot, if any
    ///
    /// The returned handle stays valid after a newer snapshot is installed.
    pub async fn current_snapshot(&self) -> Option<Arc<BanSnapshot>> {
        self.current.read().await.clone()
    }

    /// Replace the current snapshot
    pub async fn install(&self, snapshot: Arc<BanSnapshot>) -> SyncReport {
        let report = SyncReport::for_snapshot(&snapshot, Utc::now());
        *self.current.write().await = Some(snapshot);
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());

        info!(
            digest = %report.digest,
            verified = report.verified_records,
            unverified = report.unverified_records,
            "Ban snapshot installed"
        );
        report
    }

    /// Install the database persisted by a previous run, if it is still valid
    pub async fn load_persisted(&self) -> Option<SyncReport> {
        let path = self.database_path.clone();
        if !path.exists() {
            debug!(path = %path.display(), "No persisted ban database");
            return None;
        }

        let open_path = path.clone();
        match tokio::task::spawn_blocking(move || BanSnapshot::open(&open_path)).await {
            Ok(Ok(snapshot)) => {
                info!(path = %path.display(), "Loaded persisted ban database");
                Some(self.install(Arc::new(snapshot)).await)
            }
            Ok(Err(e)) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable persisted ban database"
                );
                None
            }
            Err(e) => {
                error!(error = %e, "Persisted ban database load task failed");
                None
            }
        }
    }

    /// Run one sync attempt unless another one is already running
    pub async fn trigger_sync(&self, trigger: SyncTrigger) -> SyncOutcome {
        if self.token.is_empty() {
            warn!(?trigger, "API token not configured, skipping ban database update");
            return SyncOutcome::NotConfigured;
        }

        {
            let mut state = self.lock_state();
            match &*state {
                s if s.is_in_flight() => {
                    debug!(?trigger, "Sync already in flight");
                    return match trigger {
                        SyncTrigger::Manual => SyncOutcome::AlreadyInProgress,
                        SyncTrigger::Scheduled => SyncOutcome::Skipped,
                    };
                }
                SyncState::Failed { next_retry_at, .. }
                    if trigger == SyncTrigger::Scheduled && Utc::now() < *next_retry_at =>
                {
                    debug!(%next_retry_at, "Retry delay not yet elapsed");
                    return SyncOutcome::Skipped;
                }
                _ => {}
            }
            *state = SyncState::Downloading;
        }

        let mut guard = InFlightGuard {
            state: &self.state,
            finished: false,
        };

        info!(?trigger, "Updating ban database");
        let outcome = match self.sync_once().await {
            Ok(report) => {
                self.set_state(SyncState::Idle);
                SyncOutcome::Installed(report)
            }
            Err(e) => {
                let retry_delay = chrono::Duration::from_std(self.retry_delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60));
                let next_retry_at = Utc::now() + retry_delay;
                if e.is_recoverable() {
                    warn!(error = %e, %next_retry_at, "Ban database update failed");
                } else {
                    error!(error = %e, %next_retry_at, "Ban database update failed");
                }
                self.set_state(SyncState::Failed {
                    last_error: e.to_string(),
                    next_retry_at,
                });
                SyncOutcome::Failed(e.to_string())
            }
        };

        guard.finished = true;
        outcome
    }

    async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        let url = self.service.issue_download_url(&self.token).await?;
        let bytes = self.service.fetch_database(&url).await?;

        self.set_state(SyncState::Installing);

        let data_dir = self.data_dir.clone();
        let target = self.database_path.clone();
        let snapshot =
            tokio::task::spawn_blocking(move || stage_database(&data_dir, &target, &bytes))
                .await
                .map_err(|e| SyncError::Internal(format!("install task failed: {}", e)))??;

        let report = self.install(Arc::new(snapshot)).await;

        if let Err(e) = self.service.acknowledge_download(&self.token).await {
            warn!(error = %e, "Download acknowledgement failed");
        }

        Ok(report)
    }

    /// Run scheduled syncs until the shutdown signal is received
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Ban sync loop started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                outcome = self.trigger_sync(SyncTrigger::Scheduled) => {
                    debug!(%outcome, "Scheduled sync finished");
                }
                _ = shutdown_rx.changed() => {
                    info!("Ban sync loop shutting down (during sync)");
                    break;
                }
            }

            let delay = match self.state() {
                SyncState::Failed { .. } => self.retry_delay,
                _ => self.interval,
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    info!("Ban sync loop shutting down (during sleep)");
                    break;
                }
            }
        }

        info!("Ban sync loop stopped");
    }
}

/// Write the download next to its final location, validate it, then move it
/// into place. A database that fails validation never replaces the persisted one.
fn stage_database(data_dir: &Path, target: &Path, bytes: &[u8]) -> Result<BanSnapshot, SyncError> {
    fs::create_dir_all(data_dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix("ban_database.")
        .suffix(".download")
        .tempfile_in(data_dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;

    let snapshot = BanSnapshot::open(staged.path())?;

    staged.persist(target).map_err(|e| SyncError::Persist(e.error))?;
    Ok(snapshot)
}
