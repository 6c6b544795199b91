use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use super::types::{
    DownloadTicket, ReviewOutcome, ReviewRequest, ReviewResponse, ReviewSubmission, TokenRequest,
};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

const DOWNLOAD_ENDPOINT: &str = "/bans/download";
const DOWNLOAD_DONE_ENDPOINT: &str = "/bans/download/done";
const REVIEW_ENDPOINT: &str = "/check/uploader";
/// Issued download URLs are signed; never log them
const FETCH_ENDPOINT: &str = "database download";

/// Maximum accepted database size
const MAX_DATABASE_BYTES: usize = 256 * 1024 * 1024;
/// Maximum error body kept for diagnostics
const MAX_ERROR_BODY: usize = 512;

/// Operations the syncer needs from the remote ban service
#[async_trait]
pub trait BanService: Send + Sync {
    /// Request a time-limited download location for the ban database
    async fn issue_download_url(&self, token: &str) -> Result<String, RemoteError>;

    /// Fetch the raw database from an issued location
    async fn fetch_database(&self, url: &str) -> Result<Vec<u8>, RemoteError>;

    /// Tell the service the issued download was consumed
    async fn acknowledge_download(&self, token: &str) -> Result<(), RemoteError>;

    /// Submit a candidate ban for manual review
    async fn submit_for_review(
        &self,
        token: &str,
        submission: &ReviewSubmission,
    ) -> Result<ReviewOutcome, RemoteError>;
}

/// HTTP client for the ban service
#[derive(Debug, Clone)]
pub struct RemoteBanClient {
    client: Client,
    api_url: String,
    request_timeout: Duration,
    download_timeout: Duration,
    ack_timeout: Duration,
    max_database_bytes: usize,
}

impl RemoteBanClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ndpr-guard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        info!("Ban service client configured for {}", config.api_url);

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            ack_timeout: Duration::from_secs(config.ack_timeout_secs),
            max_database_bytes: MAX_DATABASE_BYTES,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

/// Turn a non-success response into a status error with a truncated body
async fn status_error(endpoint: &str, response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    RemoteError::Status {
        endpoint: endpoint.to_string(),
        status,
        body,
    }
}

fn database_too_large(size: u64, max: usize) -> RemoteError {
    RemoteError::MalformedResponse {
        endpoint: FETCH_ENDPOINT.to_string(),
        reason: format!("database too large: {} bytes (max: {})", size, max),
    }
}

#[async_trait]
impl BanService for RemoteBanClient {
    async fn issue_download_url(&self, token: &str) -> Result<String, RemoteError> {
        let response = self
            .client
            .post(self.endpoint(DOWNLOAD_ENDPOINT))
            .timeout(self.request_timeout)
            .json(&TokenRequest { token })
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(DOWNLOAD_ENDPOINT, e))?;

        if !response.status().is_success() {
            return Err(status_error(DOWNLOAD_ENDPOINT, response).await);
        }

        let ticket: DownloadTicket = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse {
                endpoint: DOWNLOAD_ENDPOINT.to_string(),
                reason: e.to_string(),
            })?;

        match ticket.url {
            Some(url) if !url.trim().is_empty() => {
                debug!("Download location issued");
                Ok(url)
            }
            _ => Err(RemoteError::MalformedResponse {
                endpoint: DOWNLOAD_ENDPOINT.to_string(),
                reason: "response carries no download url".to_string(),
            }),
        }
    }

    async fn fetch_database(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(FETCH_ENDPOINT, e))?;

        if !response.status().is_success() {
            return Err(status_error(FETCH_ENDPOINT, response).await);
        }

        let declared = response.content_length();
        if let Some(length) = declared
            && length > self.max_database_bytes as u64
        {
            return Err(database_too_large(length, self.max_database_bytes));
        }

        // Content-Length may be absent, the limit is checked while reading
        let mut bytes = Vec::with_capacity(declared.unwrap_or(0) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RemoteError::from_reqwest(FETCH_ENDPOINT, e))?
        {
            let size = bytes.len() + chunk.len();
            if size > self.max_database_bytes {
                return Err(database_too_large(size as u64, self.max_database_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(RemoteError::MalformedResponse {
                endpoint: FETCH_ENDPOINT.to_string(),
                reason: "empty database body".to_string(),
            });
        }

        debug!("Fetched ban database: {} bytes", bytes.len());
        Ok(bytes)
    }

    async fn acknowledge_download(&self, token: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.endpoint(DOWNLOAD_DONE_ENDPOINT))
            .timeout(self.ack_timeout)
            .json(&TokenRequest { token })
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(DOWNLOAD_DONE_ENDPOINT, e))?;

        if !response.status().is_success() {
            return Err(status_error(DOWNLOAD_DONE_ENDPOINT, response).await);
        }

        Ok(())
    }

    async fn submit_for_review(
        &self,
        token: &str,
        submission: &ReviewSubmission,
    ) -> Result<ReviewOutcome, RemoteError> {
        let response = self
            .client
            .post(self.endpoint(REVIEW_ENDPOINT))
            .timeout(self.request_timeout)
            .json(&ReviewRequest { token, submission })
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(REVIEW_ENDPOINT, e))?;

        match response.status() {
            StatusCode::OK => {
                let body: ReviewResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| RemoteError::MalformedResponse {
                            endpoint: REVIEW_ENDPOINT.to_string(),
                            reason: e.to_string(),
                        })?;
                Ok(body.into_outcome())
            }
            StatusCode::FORBIDDEN => Ok(ReviewOutcome::Forbidden),
            _ => Err(status_error(REVIEW_ENDPOINT, response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config(api_url: &str) -> RemoteConfig {
        RemoteConfig {
            api_url: api_url.to_string(),
            token: String::new(),
            request_timeout_secs: 30,
            download_timeout_secs: 60,
            ack_timeout_secs: 10,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = RemoteBanClient::new(&remote_config("https://api.example.com/")).unwrap();
        assert_eq!(client.api_url(), "https://api.example.com");
        assert_eq!(
            client.endpoint(DOWNLOAD_DONE_ENDPOINT),
            "https://api.example.com/bans/download/done"
        );
    }

    /// Serve one chunked response without Content-Length and return its URL
    async fn serve_chunked(chunks: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let mut response =
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
                    .to_vec();
            for chunk in chunks {
                response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                response.extend_from_slice(&chunk);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/ban_database.db", addr)
    }

    #[tokio::test]
    async fn test_chunked_download_within_limit() {
        let mut client = RemoteBanClient::new(&remote_config("http://127.0.0.1:9")).unwrap();
        client.max_database_bytes = 16;

        let url = serve_chunked(vec![b"SQLite ".to_vec(), b"format 3".to_vec()]).await;
        let bytes = client.fetch_database(&url).await.unwrap();
        assert_eq!(bytes, b"SQLite format 3");
    }

    #[tokio::test]
    async fn test_chunked_download_over_limit_is_rejected() {
        let mut client = RemoteBanClient::new(&remote_config("http://127.0.0.1:9")).unwrap();
        client.max_database_bytes = 16;

        let url = serve_chunked(vec![vec![b'x'; 10], vec![b'y'; 10], vec![b'z'; 10]]).await;
        let err = client.fetch_database(&url).await.unwrap_err();
        match err {
            RemoteError::MalformedResponse { reason, .. } => {
                assert!(reason.contains("too large"), "{}", reason)
            }
            other => panic!("expected size rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = RemoteBanClient::new(&remote_config("http://127.0.0.1:9")).unwrap();
        let err = client.issue_download_url("tok").await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Transport { .. } | RemoteError::Timeout { .. }
        ));
    }
}
