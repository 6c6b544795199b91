//! Log Evidence
//!
//! Reconstructs a joining player's network and identity attributes from the
//! tail of the live server log.
//!
//! - `grammar` - classification of a single log line
//! - `scanner` - reverse, time-windowed scan producing an `EvidenceRecord`

mod grammar;
mod scanner;

pub use grammar::{LogLine, parse_line, parse_timestamp};
pub use scanner::LogEvidenceScanner;

use serde::{Deserialize, Serialize};

/// Identity hints for one join event
///
/// An empty record means "insufficient signal", never "not banned".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub ip: Option<String>,
    pub ipv6: Option<String>,
    pub persistent_id: Option<String>,
}

impl EvidenceRecord {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.ipv6.is_none() && self.persistent_id.is_none()
    }

    /// All fields have been resolved, nothing older can contribute
    pub fn is_complete(&self) -> bool {
        self.ip.is_some() && self.ipv6.is_some() && self.persistent_id.is_some()
    }
}
