use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use super::control::ServerControl;
use crate::config::GuardConfig;
use crate::evidence::{EvidenceRecord, LogEvidenceScanner};
use crate::snapshot::{BanPartition, BanRecord, BanSnapshot};
use crate::sync::SnapshotSyncer;

/// Which piece of evidence matched a ban record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    Identity,
    Name,
    Ip,
    Ipv6,
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            MatchKey::Identity => "identity",
            MatchKey::Name => "name",
            MatchKey::Ip => "ip",
            MatchKey::Ipv6 => "ipv6",
        };
        f.write_str(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// Checked against a snapshot, nothing matched
    Clear,
    /// No snapshot has ever been installed
    NoSnapshot,
}

/// Enforcement verdict for one join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(AllowReason),
    Kick {
        reason: String,
        matched_by: MatchKey,
        record: BanRecord,
    },
}

impl Decision {
    pub fn is_kick(&self) -> bool {
        matches!(self, Decision::Kick { .. })
    }

    fn kick(matched_by: MatchKey, record: &BanRecord) -> Self {
        Decision::Kick {
            reason: record.reason.clone(),
            matched_by,
            record: record.clone(),
        }
    }
}

/// Decide whether `player` may stay, first match wins
pub fn evaluate(
    player: &str,
    partition: BanPartition,
    snapshot: Option<&BanSnapshot>,
    evidence: &EvidenceRecord,
) -> Decision {
    let Some(snapshot) = snapshot else {
        return Decision::Allow(AllowReason::NoSnapshot);
    };

    if partition == BanPartition::Verified
        && let Some(id) = evidence.persistent_id.as_deref()
        && let Some(record) = snapshot.lookup_by_identity(partition, id)
    {
        return Decision::kick(MatchKey::Identity, record);
    }

    if let Some(record) = snapshot.lookup_by_name(partition, player) {
        return Decision::kick(MatchKey::Name, record);
    }

    if let Some(ip) = evidence.ip.as_deref()
        && let Some(record) = snapshot.lookup_by_address(partition, ip)
    {
        return Decision::kick(MatchKey::Ip, record);
    }

    if let Some(ipv6) = evidence.ipv6.as_deref()
        && let Some(record) = snapshot.lookup_by_address(partition, ipv6)
    {
        return Decision::kick(MatchKey::Ipv6, record);
    }

    Decision::Allow(AllowReason::Clear)
}

/// Gathers evidence for a joining player and applies the verdict
#[derive(Debug, Clone)]
pub struct EnforcementGate {
    scanner: LogEvidenceScanner,
    log_path: PathBuf,
    kick_message: String,
}

impl EnforcementGate {
    pub fn new(
        scanner: LogEvidenceScanner,
        log_path: impl Into<PathBuf>,
        kick_message: impl Into<String>,
    ) -> Self {
        Self {
            scanner,
            log_path: log_path.into(),
            kick_message: kick_message.into(),
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            LogEvidenceScanner::from_config(&config.evidence),
            config.server.log_path.clone(),
            config.server.kick_message.clone(),
        )
    }

    /// Scan the log for `player` off the async runtime
    pub async fn collect_evidence(&self, player: &str) -> EvidenceRecord {
        let scanner = self.scanner.clone();
        let log_path = self.log_path.clone();
        let name = player.to_string();

        match tokio::task::spawn_blocking(move || scanner.scan(&name, &log_path)).await {
            Ok(evidence) => evidence,
            Err(e) => {
                error!(player = %player, error = %e, "Evidence scan task failed");
                EvidenceRecord::default()
            }
        }
    }

    /// Evaluate a join and kick the player on a match
    pub async fn on_player_join(
        &self,
        player: &str,
        partition: BanPartition,
        syncer: &SnapshotSyncer,
        control: &dyn ServerControl,
    ) -> Decision {
        let evidence = self.collect_evidence(player).await;
        if evidence.is_empty() {
            debug!(player = %player, "No recent log evidence for player");
        }

        let snapshot = syncer.current_snapshot().await;
        let decision = evaluate(player, partition, snapshot.as_deref(), &evidence);
        drop(snapshot);

        match &decision {
            Decision::Kick {
                reason, matched_by, ..
            } => {
                info!(
                    player = %player,
                    %partition,
                    matched_by = %matched_by,
                    reason = %reason,
                    "Banned player joined, kicking"
                );
                if let Err(e) = control.kick(player, &self.kick_message) {
                    error!(player = %player, error = %e, "Failed to kick banned player");
                }
            }
            Decision::Allow(AllowReason::NoSnapshot) => {
                warn!(player = %player, "No ban data installed yet, allowing join");
            }
            Decision::Allow(AllowReason::Clear) => {
                debug!(player = %player, %partition, "Player not banned");
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_ID: &str = "11111111-1111-1111-1111-111111111111";

    fn snapshot() -> BanSnapshot {
        BanSnapshot::from_records(
            vec![
                BanRecord::new("Alice", "cheating")
                    .with_ip("203.0.113.7")
                    .with_persistent_id(ALICE_ID),
                BanRecord::new("Dave", "griefing").with_ipv6("2001:db8::5"),
            ],
            vec![BanRecord::new("Carol", "spam").with_ip("198.51.100.3")],
        )
    }

    fn evidence(ip: Option<&str>, ipv6: Option<&str>, id: Option<&str>) -> EvidenceRecord {
        EvidenceRecord {
            ip: ip.map(str::to_string),
            ipv6: ipv6.map(str::to_string),
            persistent_id: id.map(str::to_string),
        }
    }

    fn matched_by(decision: &Decision) -> Option<MatchKey> {
        match decision {
            Decision::Kick { matched_by, .. } => Some(*matched_by),
            Decision::Allow(_) => None,
        }
    }

    #[test]
    fn test_identity_match_first() {
        let snapshot = snapshot();
        let decision = evaluate(
            "Alice",
            BanPartition::Verified,
            Some(&snapshot),
            &evidence(Some("203.0.113.7"), None, Some(ALICE_ID)),
        );
        assert_eq!(matched_by(&decision), Some(MatchKey::Identity));
        let Decision::Kick { reason, .. } = decision else {
            unreachable!()
        };
        assert_eq!(reason, "cheating");
    }

    #[test]
    fn test_renamed_player_caught_by_identity() {
        let snapshot = snapshot();
        let decision = evaluate(
            "NotAlice",
            BanPartition::Verified,
            Some(&snapshot),
            &evidence(None, None, Some(ALICE_ID)),
        );
        assert_eq!(matched_by(&decision), Some(MatchKey::Identity));
    }

    #[test]
    fn test_identity_ignored_on_unverified_servers() {
        let snapshot = snapshot();
        let decision = evaluate(
            "Mallory",
            BanPartition::Unverified,
            Some(&snapshot),
            &evidence(None, None, Some(ALICE_ID)),
        );
        assert_eq!(decision, Decision::Allow(AllowReason::Clear));
    }

    #[test]
    fn test_name_before_address() {
        let snapshot = snapshot();
        let decision = evaluate(
            "Alice",
            BanPartition::Verified,
            Some(&snapshot),
            &evidence(Some("203.0.113.7"), None, None),
        );
        assert_eq!(matched_by(&decision), Some(MatchKey::Name));
    }

    #[test]
    fn test_address_matches() {
        let snapshot = snapshot();
        let by_ip = evaluate(
            "Eve",
            BanPartition::Verified,
            Some(&snapshot),
            &evidence(Some("203.0.113.7"), None, None),
        );
        assert_eq!(matched_by(&by_ip), Some(MatchKey::Ip));

        let by_ipv6 = evaluate(
            "Eve",
            BanPartition::Verified,
            Some(&snapshot),
            &evidence(Some("192.0.2.1"), Some("2001:db8::5"), None),
        );
        assert_eq!(matched_by(&by_ipv6), Some(MatchKey::Ipv6));
    }

    #[test]
    fn test_partition_exclusivity() {
        let snapshot = snapshot();
        // Carol is only banned on unverified servers
        let verified = evaluate(
            "Carol",
            BanPartition::Verified,
            Some(&snapshot),
            &evidence(Some("198.51.100.3"), None, None),
        );
        assert_eq!(verified, Decision::Allow(AllowReason::Clear));

        let unverified = evaluate(
            "Carol",
            BanPartition::Unverified,
            Some(&snapshot),
            &EvidenceRecord::default(),
        );
        assert_eq!(matched_by(&unverified), Some(MatchKey::Name));
    }

    #[test]
    fn test_no_snapshot_allows() {
        let decision = evaluate(
            "Alice",
            BanPartition::Verified,
            None,
            &evidence(Some("203.0.113.7"), None, Some(ALICE_ID)),
        );
        assert_eq!(decision, Decision::Allow(AllowReason::NoSnapshot));
    }

    #[test]
    fn test_empty_evidence_for_unknown_player() {
        let snapshot = snapshot();
        let decision = evaluate(
            "Bob",
            BanPartition::Verified,
            Some(&snapshot),
            &EvidenceRecord::default(),
        );
        assert_eq!(decision, Decision::Allow(AllowReason::Clear));
        assert!(!decision.is_kick());
    }
}
