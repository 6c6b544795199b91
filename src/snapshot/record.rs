use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two independent ban namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanPartition {
    /// Servers verifying account identity (online mode)
    Verified,
    /// Servers without identity verification (offline mode)
    Unverified,
}

impl BanPartition {
    /// Lookup order used when a query spans both partitions
    pub const ALL: [BanPartition; 2] = [BanPartition::Verified, BanPartition::Unverified];

    pub fn from_online_mode(online_mode: bool) -> Self {
        if online_mode {
            BanPartition::Verified
        } else {
            BanPartition::Unverified
        }
    }

    /// Table holding this partition in the ban database
    pub fn table_name(self) -> &'static str {
        match self {
            BanPartition::Verified => "online",
            BanPartition::Unverified => "offline",
        }
    }
}

impl fmt::Display for BanPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// One row of evidence about a banned identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub subject_name: String,
    pub ip: Option<String>,
    pub ipv6: Option<String>,
    /// Canonical identity token, only meaningful in the verified partition
    pub persistent_id: Option<String>,
    pub reason: String,
    /// Opaque timestamp as stored by the ban service
    pub banned_at: String,
}

impl BanRecord {
    pub fn new(subject_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject_name: subject_name.into(),
            ip: None,
            ipv6: None,
            persistent_id: None,
            reason: reason.into(),
            banned_at: String::new(),
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_ipv6(mut self, ipv6: impl Into<String>) -> Self {
        self.ipv6 = Some(ipv6.into());
        self
    }

    pub fn with_persistent_id(mut self, persistent_id: impl Into<String>) -> Self {
        self.persistent_id = Some(persistent_id.into());
        self
    }

    pub fn with_banned_at(mut self, banned_at: impl Into<String>) -> Self {
        self.banned_at = banned_at.into();
        self
    }
}

/// Address family as inferred from the literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    V4,
    V6,
}

impl AddressKind {
    /// More than one colon means IPv6; anything else is treated as IPv4
    pub fn classify(address: &str) -> Self {
        if address.matches(':').count() > 1 {
            AddressKind::V6
        } else {
            AddressKind::V4
        }
    }
}
