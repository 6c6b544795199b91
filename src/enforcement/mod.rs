//! Join-time ban enforcement
//!
//! ```text
//!  join(player) ──► LogEvidenceScanner ──► EvidenceRecord
//!                                               │
//!  SnapshotSyncer::current_snapshot() ──► evaluate(player, partition, snapshot, evidence)
//!                                               │
//!                              Allow ◄──────────┴──────────► Kick ──► ServerControl
//! ```
//!
//! Lookups are tried in a fixed order and the first hit decides:
//! identity (verified servers only), exact name, IPv4, IPv6.

mod check;
mod control;
mod gate;

pub use check::{CheckResult, CheckTarget, check_target, classify_target};
pub use control::{ConsoleServerControl, ServerControl};
pub use gate::{AllowReason, Decision, EnforcementGate, MatchKey, evaluate};
