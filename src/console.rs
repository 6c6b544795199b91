//! Operator commands
//!
//! ```text
//! !!ndpr help
//! !!ndpr d | download     update the ban database now
//! !!ndpr ban <player>     submit a player for review
//! !!ndpr check <target>   look up a name, IP, IPv6 or UUID
//! !!ndpr status           show sync state
//! ```
//!
//! The `!!ndpr` prefix is optional and matched case-insensitively.

use std::sync::Arc;

use crate::config::GuardConfig;
use crate::enforcement::{CheckResult, CheckTarget, EnforcementGate, check_target};
use crate::remote::{BanService, ReviewOutcome, ReviewSubmission};
use crate::sync::{SnapshotSyncer, SyncState, SyncTrigger};

const PREFIX: &str = "!!ndpr";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Help,
    Download,
    Ban(String),
    Check(String),
    Status,
}

impl OperatorCommand {
    /// Parse one input line; `None` for blank lines
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let mut line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(head) = line.get(..PREFIX.len())
            && head.eq_ignore_ascii_case(PREFIX)
            && line[PREFIX.len()..]
                .chars()
                .next()
                .is_none_or(char::is_whitespace)
        {
            line = line[PREFIX.len()..].trim_start();
        }
        if line.is_empty() {
            return Some(Ok(OperatorCommand::Help));
        }

        let mut parts = line.split_whitespace();
        let verb = parts.next()?.to_ascii_lowercase();
        let arg = parts.next();
        let extra = parts.next();

        let command = match (verb.as_str(), arg, extra) {
            ("help", None, _) => Ok(OperatorCommand::Help),
            ("d" | "download", None, _) => Ok(OperatorCommand::Download),
            ("status", None, _) => Ok(OperatorCommand::Status),
            ("ban", Some(player), None) => Ok(OperatorCommand::Ban(player.to_string())),
            ("check", Some(target), None) => Ok(OperatorCommand::Check(target.to_string())),
            ("ban", _, _) => Err("usage: ban <player>".to_string()),
            ("check", _, _) => Err("usage: check <name|ip|ipv6|uuid>".to_string()),
            _ => Err(format!("unknown command `{}`, try `help`", verb)),
        };
        Some(command)
    }
}

/// Everything operator commands act on
pub struct OperatorContext {
    pub config: Arc<GuardConfig>,
    pub syncer: Arc<SnapshotSyncer>,
    pub gate: Arc<EnforcementGate>,
    pub service: Arc<dyn BanService>,
}

impl OperatorContext {
    /// Run a command and return the reply lines
    pub async fn execute(&self, command: OperatorCommand) -> Vec<String> {
        match command {
            OperatorCommand::Help => vec![
                "help - show this message".to_string(),
                "d | download - update the ban database".to_string(),
                "ban <player> - submit a player for review".to_string(),
                "check <name|ip|ipv6|uuid> - look up a ban".to_string(),
                "status - show sync state".to_string(),
            ],
            OperatorCommand::Download => {
                vec![self.syncer.trigger_sync(SyncTrigger::Manual).await.to_string()]
            }
            OperatorCommand::Status => self.status(),
            OperatorCommand::Check(target) => self.check(&target).await,
            OperatorCommand::Ban(player) => self.submit(&player).await,
        }
    }

    fn status(&self) -> Vec<String> {
        let mut reply = vec![format!("sync: {}", self.syncer.state())];
        match self.syncer.last_report() {
            Some(report) => reply.push(format!(
                "snapshot {} installed {}: {} verified, {} unverified",
                &report.digest[..report.digest.len().min(12)],
                report.installed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                report.verified_records,
                report.unverified_records
            )),
            None => reply.push("no ban data installed".to_string()),
        }
        if let SyncState::Failed { .. } = self.syncer.state() {
            reply.push("run `download` to retry now".to_string());
        }
        reply
    }

    async fn check(&self, target: &str) -> Vec<String> {
        let snapshot = self.syncer.current_snapshot().await;
        let result = check_target(snapshot.as_deref(), self.config.partition(), target);

        let line = match result {
            CheckResult::NoData => "ban database not downloaded yet".to_string(),
            CheckResult::NotBanned { kind } => {
                format!("{} {} is not banned", describe(kind), target)
            }
            CheckResult::Banned {
                kind,
                partition,
                record,
            } => format!(
                "{} {} is banned ({}): player {}, reason: {}, since {}",
                describe(kind),
                target,
                partition,
                record.subject_name,
                record.reason,
                record.banned_at
            ),
        };
        vec![line]
    }

    async fn submit(&self, player: &str) -> Vec<String> {
        if !self.config.has_token() {
            return vec!["API token not configured".to_string()];
        }

        let evidence = self.gate.collect_evidence(player).await;
        let mut reply = Vec::new();

        let known: Vec<String> = [
            ("IP", &evidence.ip),
            ("IPv6", &evidence.ipv6),
            ("UUID", &evidence.persistent_id),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();
        if !known.is_empty() {
            reply.push(format!("collected {}", known.join(", ")));
        }

        let submission = ReviewSubmission::new(player, &evidence, self.config.server.online_mode);
        let line = match self
            .service
            .submit_for_review(&self.config.remote.token, &submission)
            .await
        {
            Ok(ReviewOutcome::Accepted { check_id }) => {
                format!("submitted for review, check id {}", check_id)
            }
            Ok(ReviewOutcome::Rejected { message }) => format!("submission rejected: {}", message),
            Ok(ReviewOutcome::Forbidden) => "this token has no submission privilege".to_string(),
            Err(e) => format!("submission failed: {}", e),
        };
        reply.push(line);
        reply
    }
}

fn describe(kind: CheckTarget) -> &'static str {
    match kind {
        CheckTarget::Ipv4 => "IP",
        CheckTarget::Ipv6 => "IPv6",
        CheckTarget::Identity => "UUID",
        CheckTarget::Name => "player",
    }
}
