//! NDPR Ban Guard
//!
//! Keeps a locally cached copy of the shared NDPR ban list in sync with the
//! ban service and enforces it when players join a game server, correlating
//! the player name with recent connection evidence from the server log.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Sidecar entrypoint
//! ├── config.rs       - Configuration management
//! ├── error.rs        - Typed errors (remote, snapshot, sync)
//! ├── console.rs      - Operator commands (download, ban, check, status)
//! ├── watch.rs        - Live log follower reporting joins
//! ├── evidence/       - Log evidence
//! │   ├── grammar.rs  - Join-event line grammar
//! │   └── scanner.rs  - Time-windowed reverse scan
//! ├── snapshot/       - Ban snapshot
//! │   ├── record.rs   - Records, partitions, address kinds
//! │   └── store.rs    - Immutable indexed snapshot from SQLite
//! ├── sync/           - Snapshot synchronization
//! │   ├── state.rs    - Sync state machine types
//! │   └── syncer.rs   - Download, validate, install, schedule
//! ├── enforcement/    - Join-time enforcement
//! │   ├── gate.rs     - Ordered lookup and kick decision
//! │   ├── check.rs    - Operator lookups
//! │   └── control.rs  - Server console side effects
//! └── remote/         - Ban service client
//!     ├── client.rs   - HTTP client
//!     └── types.rs    - Wire types
//! ```

pub mod config;
pub mod console;
pub mod enforcement;
pub mod error;
pub mod evidence;
pub mod remote;
pub mod snapshot;
pub mod sync;
pub mod watch;

// Re-export main types for convenience
pub use config::GuardConfig;
pub use error::{RemoteError, SnapshotError, SyncError};

pub use evidence::{EvidenceRecord, LogEvidenceScanner};
pub use snapshot::{BanPartition, BanRecord, BanSnapshot};

// Re-export sync types
pub use sync::{SnapshotSyncer, SyncOutcome, SyncReport, SyncState, SyncTrigger};

// Re-export enforcement types
pub use enforcement::{
    AllowReason, CheckResult, CheckTarget, ConsoleServerControl, Decision, EnforcementGate,
    MatchKey, ServerControl,
};

pub use remote::{BanService, RemoteBanClient, ReviewOutcome, ReviewSubmission};
pub use watch::JoinWatcher;
