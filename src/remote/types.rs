use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceRecord;

/// Body of the token-only endpoints
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub token: &'a str,
}

/// Time-limited, single-use download location
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadTicket {
    pub url: Option<String>,
}

/// Candidate ban submitted for manual review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSubmission {
    pub player_id: String,
    pub ip: Option<String>,
    pub ipv6: Option<String>,
    pub uuid: Option<String>,
    pub onlinemode: bool,
}

impl ReviewSubmission {
    pub fn new(player: &str, evidence: &EvidenceRecord, online_mode: bool) -> Self {
        Self {
            player_id: player.to_string(),
            ip: evidence.ip.clone(),
            ipv6: evidence.ipv6.clone(),
            uuid: evidence.persistent_id.clone(),
            onlinemode: online_mode,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReviewRequest<'a> {
    pub token: &'a str,
    #[serde(flatten)]
    pub submission: &'a ReviewSubmission,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReviewResponse {
    pub result: Option<String>,
    pub check_id: Option<serde_json::Value>,
    pub message: Option<String>,
}

/// Outcome of a review submission the service answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Queued for review under the given check id
    Accepted { check_id: String },
    /// The service refused the submission
    Rejected { message: String },
    /// The token has no submission privilege (HTTP 403)
    Forbidden,
}

impl ReviewResponse {
    pub(crate) fn into_outcome(self) -> ReviewOutcome {
        if self.result.as_deref() == Some("success") {
            let check_id = match self.check_id {
                Some(serde_json::Value::String(id)) => id,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            ReviewOutcome::Accepted { check_id }
        } else {
            ReviewOutcome::Rejected {
                message: self.message.unwrap_or_else(|| "unknown error".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_request_shape() {
        let evidence = EvidenceRecord {
            ip: Some("203.0.113.7".to_string()),
            ipv6: None,
            persistent_id: Some("11111111-1111-1111-1111-111111111111".to_string()),
        };
        let submission = ReviewSubmission::new("Alice", &evidence, true);
        let body = serde_json::to_value(ReviewRequest {
            token: "tok",
            submission: &submission,
        })
        .unwrap();

        assert_eq!(body["token"], "tok");
        assert_eq!(body["player_id"], "Alice");
        assert_eq!(body["ip"], "203.0.113.7");
        assert!(body["ipv6"].is_null());
        assert_eq!(body["uuid"], "11111111-1111-1111-1111-111111111111");
        assert_eq!(body["onlinemode"], true);
    }

    #[test]
    fn test_review_outcomes() {
        let accepted: ReviewResponse =
            serde_json::from_str(r#"{"result":"success","check_id":1042}"#).unwrap();
        assert_eq!(
            accepted.into_outcome(),
            ReviewOutcome::Accepted {
                check_id: "1042".to_string()
            }
        );

        let rejected: ReviewResponse =
            serde_json::from_str(r#"{"result":"fail","message":"duplicate"}"#).unwrap();
        assert_eq!(
            rejected.into_outcome(),
            ReviewOutcome::Rejected {
                message: "duplicate".to_string()
            }
        );

        let bare: ReviewResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(
            bare.into_outcome(),
            ReviewOutcome::Rejected {
                message: "unknown error".to_string()
            }
        );
    }
}
