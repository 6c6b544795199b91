//! Operator lookups against the installed snapshot

use serde::Serialize;
use uuid::Uuid;

use crate::snapshot::{BanPartition, BanRecord, BanSnapshot};

/// What an operator-supplied target looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckTarget {
    Ipv4,
    Ipv6,
    Identity,
    Name,
}

pub fn classify_target(target: &str) -> CheckTarget {
    let dots = target.matches('.').count();
    let colons = target.matches(':').count();

    if (dots >= 3 && colons == 1) || is_dotted_quad(target) {
        CheckTarget::Ipv4
    } else if colons > 1 {
        CheckTarget::Ipv6
    } else if target.len() == 36 && Uuid::parse_str(target).is_ok() {
        CheckTarget::Identity
    } else {
        CheckTarget::Name
    }
}

fn is_dotted_quad(target: &str) -> bool {
    let octets: Vec<&str> = target.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.len() <= 3 && o.parse::<u8>().is_ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// No snapshot installed, nothing can be said
    NoData,
    NotBanned {
        kind: CheckTarget,
    },
    Banned {
        kind: CheckTarget,
        partition: BanPartition,
        record: BanRecord,
    },
}

/// Look `target` up in the snapshot
///
/// Addresses and identity tokens are searched in both partitions, verified
/// first. Names only exist in the partition the server runs in.
pub fn check_target(
    snapshot: Option<&BanSnapshot>,
    partition: BanPartition,
    target: &str,
) -> CheckResult {
    let Some(snapshot) = snapshot else {
        return CheckResult::NoData;
    };

    let target = target.trim();
    let kind = classify_target(target);

    let hit = match kind {
        CheckTarget::Ipv4 => {
            // host:port as pasted from a log line
            let address = target.split(':').next().unwrap_or(target);
            find_in_all(|p| snapshot.lookup_by_address(p, address))
        }
        CheckTarget::Ipv6 => find_in_all(|p| snapshot.lookup_by_address(p, target)),
        CheckTarget::Identity => find_in_all(|p| snapshot.lookup_by_identity(p, target)),
        CheckTarget::Name => snapshot
            .lookup_by_name(partition, target)
            .map(|record| (partition, record)),
    };

    match hit {
        Some((partition, record)) => CheckResult::Banned {
            kind,
            partition,
            record: record.clone(),
        },
        None => CheckResult::NotBanned { kind },
    }
}

fn find_in_all<'a, F>(lookup: F) -> Option<(BanPartition, &'a BanRecord)>
where
    F: Fn(BanPartition) -> Option<&'a BanRecord>,
{
    BanPartition::ALL
        .into_iter()
        .find_map(|partition| lookup(partition).map(|record| (partition, record)))
}
