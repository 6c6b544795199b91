//! Follows the live server log and reports player joins

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::evidence::{LogLine, parse_line};

/// Tails a log file from a cursor and extracts joined player names
#[derive(Debug)]
pub struct JoinWatcher {
    path: PathBuf,
    cursor: u64,
    partial: String,
}

impl JoinWatcher {
    /// Start at the current end of the file; earlier joins are ignored
    pub async fn from_end(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursor = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        Self {
            path,
            cursor,
            partial: String::new(),
        }
    }

    /// Start at the beginning of the file
    pub fn from_start(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: 0,
            partial: String::new(),
        }
    }

    /// Read whatever was appended since the last poll
    ///
    /// A file shorter than the cursor was truncated or rotated, reading
    /// restarts from its beginning.
    pub async fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        if len < self.cursor {
            info!(path = %self.path.display(), "Log file truncated or rotated, rewinding");
            self.cursor = 0;
            self.partial.clear();
        }
        if len == self.cursor {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.cursor)).await?;
        let mut buf = Vec::with_capacity((len - self.cursor) as usize);
        let read = file.read_to_end(&mut buf).await?;
        self.cursor += read as u64;

        self.partial.push_str(&String::from_utf8_lossy(&buf));

        let mut joined = Vec::new();
        let complete = match self.partial.rfind('\n') {
            Some(end) => end + 1,
            None => return Ok(joined),
        };

        for line in self.partial[..complete].lines() {
            if let LogLine::Joined { name } = parse_line(line) {
                joined.push(name.to_string());
            }
        }
        self.partial.drain(..complete);

        Ok(joined)
    }

    /// Poll every `interval` and forward joins until shutdown or until the
    /// receiver goes away
    pub async fn run(
        mut self,
        interval: Duration,
        joins: mpsc::Sender<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(path = %self.path.display(), "Watching server log for joins");
        let mut unavailable = false;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.poll().await {
                Ok(names) => {
                    if unavailable {
                        info!(path = %self.path.display(), "Server log available again");
                        unavailable = false;
                    }
                    for name in names {
                        debug!(player = %name, "Join detected");
                        if joins.send(name).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    if !unavailable {
                        warn!(path = %self.path.display(), error = %e, "Server log unavailable");
                        unavailable = true;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        info!("Join watcher stopped");
    }
}
