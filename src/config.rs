use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::snapshot::BanPartition;

/// Configuration for the ban guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Remote ban service configuration
    pub remote: RemoteConfig,
    /// Game server configuration
    pub server: ServerConfig,
    /// Snapshot synchronization configuration
    pub sync: SyncConfig,
    /// Log evidence configuration
    pub evidence: EvidenceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Ban service base URL
    pub api_url: String,
    /// Access token issued by the ban service (empty = sync disabled)
    pub token: String,
    /// Timeout for download URL issuance and review submission
    pub request_timeout_secs: u64,
    /// Timeout for the bulk database download
    pub download_timeout_secs: u64,
    /// Timeout for the download acknowledgement
    pub ack_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// true = verified (online) server, false = offline server
    pub online_mode: bool,
    /// Path of the live server log
    pub log_path: PathBuf,
    /// Reason shown to a kicked player
    pub kick_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding the persisted ban database
    pub data_dir: PathBuf,
    /// Seconds between scheduled syncs
    pub interval_secs: u64,
    /// Seconds to wait after a failed sync before retrying
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Maximum age of a log line considered for a join
    pub freshness_window_secs: u64,
    /// Maximum number of bytes read from the end of the log per scan
    pub max_tail_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig {
                api_url: "https://api.ndpreforged.com".to_string(),
                token: String::new(), // must be configured to enable sync
                request_timeout_secs: 30,
                download_timeout_secs: 60,
                ack_timeout_secs: 10,
            },
            server: ServerConfig {
                online_mode: true,
                log_path: PathBuf::from("server/logs/latest.log"),
                kick_message: "§c您已被NDPR封禁系统封禁".to_string(),
            },
            sync: SyncConfig {
                data_dir: PathBuf::from("config/ndpr/data"),
                interval_secs: 900,
                retry_delay_secs: 60,
            },
            evidence: EvidenceConfig {
                freshness_window_secs: 120,
                max_tail_bytes: 1024 * 1024, // 1MB
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl GuardConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, applying defaults for
    /// every key the lookup does not provide
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Remote service
        if let Some(api_url) = lookup("NDPR_API_URL") {
            config.remote.api_url = api_url.trim_end_matches('/').to_string();
        }

        if let Some(token) = lookup("NDPR_TOKEN") {
            config.remote.token = token.trim().to_string();
        }

        if let Some(timeout) = lookup("NDPR_REQUEST_TIMEOUT_SECS") {
            config.remote.request_timeout_secs = timeout
                .parse()
                .context("Invalid NDPR_REQUEST_TIMEOUT_SECS value")?;
        }

        if let Some(timeout) = lookup("NDPR_DOWNLOAD_TIMEOUT_SECS") {
            config.remote.download_timeout_secs = timeout
                .parse()
                .context("Invalid NDPR_DOWNLOAD_TIMEOUT_SECS value")?;
        }

        if let Some(timeout) = lookup("NDPR_ACK_TIMEOUT_SECS") {
            config.remote.ack_timeout_secs = timeout
                .parse()
                .context("Invalid NDPR_ACK_TIMEOUT_SECS value")?;
        }

        // Server mode has no default in the field: an unset value is an error
        let online_mode = lookup("NDPR_ONLINE_MODE").context(
            "NDPR_ONLINE_MODE environment variable is required (true = online server, false = offline server)",
        )?;
        config.server.online_mode = online_mode
            .trim()
            .to_lowercase()
            .parse()
            .context("NDPR_ONLINE_MODE must be true or false")?;

        if let Some(log_path) = lookup("NDPR_LOG_PATH") {
            config.server.log_path = PathBuf::from(log_path);
        }

        if let Some(message) = lookup("NDPR_KICK_MESSAGE") {
            config.server.kick_message = message;
        }

        // Sync
        if let Some(data_dir) = lookup("NDPR_DATA_DIR") {
            config.sync.data_dir = PathBuf::from(data_dir);
        }

        if let Some(interval) = lookup("NDPR_DOWNLOAD_INTERVAL") {
            config.sync.interval_secs = interval
                .parse()
                .context("Invalid NDPR_DOWNLOAD_INTERVAL value")?;
        }

        if let Some(delay) = lookup("NDPR_RETRY_DELAY_SECS") {
            config.sync.retry_delay_secs = delay
                .parse()
                .context("Invalid NDPR_RETRY_DELAY_SECS value")?;
        }

        // Evidence
        if let Some(window) = lookup("NDPR_FRESHNESS_WINDOW_SECS") {
            config.evidence.freshness_window_secs = window
                .parse()
                .context("Invalid NDPR_FRESHNESS_WINDOW_SECS value")?;
        }

        if let Some(bytes) = lookup("NDPR_MAX_TAIL_BYTES") {
            config.evidence.max_tail_bytes = bytes
                .parse()
                .context("Invalid NDPR_MAX_TAIL_BYTES value")?;
        }

        // Logging
        if let Some(level) = lookup("NDPR_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        let api_url = Url::parse(&self.remote.api_url)
            .with_context(|| format!("Invalid API URL: {}", self.remote.api_url))?;
        if api_url.scheme() != "http" && api_url.scheme() != "https" {
            return Err(anyhow::anyhow!(
                "API URL must use http or https: {}",
                self.remote.api_url
            ));
        }

        if self.server.log_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Log path cannot be empty"));
        }

        if self.server.kick_message.trim().is_empty() {
            return Err(anyhow::anyhow!("Kick message cannot be empty"));
        }

        if self.sync.interval_secs == 0 {
            return Err(anyhow::anyhow!("Download interval must be non-zero"));
        }

        if self.sync.retry_delay_secs == 0 {
            return Err(anyhow::anyhow!("Retry delay must be non-zero"));
        }

        if self.remote.request_timeout_secs == 0
            || self.remote.download_timeout_secs == 0
            || self.remote.ack_timeout_secs == 0
        {
            return Err(anyhow::anyhow!("Network timeouts must be non-zero"));
        }

        if self.evidence.freshness_window_secs == 0 {
            return Err(anyhow::anyhow!("Freshness window must be non-zero"));
        }

        Ok(())
    }

    /// Ban partition selected by the server mode
    pub fn partition(&self) -> BanPartition {
        BanPartition::from_online_mode(self.server.online_mode)
    }

    /// Whether a token is present for the remote service
    pub fn has_token(&self) -> bool {
        !self.remote.token.is_empty()
    }

    /// Location of the persisted ban database
    pub fn database_path(&self) -> PathBuf {
        self.sync.data_dir.join("ban_database.db")
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.sync.retry_delay_secs)
    }
}

/// Mask a secret for logging, keeping a short prefix and suffix
pub fn sanitize_for_logging(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}***{}", head, tail)
    } else if chars.len() > 4 {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}***{}", head, tail)
    } else {
        "***".to_string()
    }
}
