use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::record::{AddressKind, BanPartition, BanRecord};
use crate::error::SnapshotError;

/// Columns every partition table must carry
pub const REQUIRED_COLUMNS: &[&str] = &["player", "ip", "ipv6", "ban_reason", "ban_time"];

/// Identity column, required in the verified partition only
const IDENTITY_COLUMN: &str = "mcuuid";

/// Indexed records of a single partition
#[derive(Debug, Default)]
struct PartitionIndex {
    records: Vec<BanRecord>,
    by_name: HashMap<String, usize>,
    by_identity: HashMap<String, usize>,
    by_ip: HashMap<String, usize>,
    by_ipv6: HashMap<String, usize>,
}

impl PartitionIndex {
    fn from_records(records: Vec<BanRecord>) -> Self {
        let mut index = Self::default();

        for (position, record) in records.iter().enumerate() {
            // First row wins for every key
            if !record.subject_name.is_empty() {
                index
                    .by_name
                    .entry(record.subject_name.clone())
                    .or_insert(position);
            }
            if let Some(ref id) = record.persistent_id {
                index.by_identity.entry(id.clone()).or_insert(position);
            }
            if let Some(ref ip) = record.ip {
                index.by_ip.entry(ip.clone()).or_insert(position);
            }
            if let Some(ref ipv6) = record.ipv6 {
                index.by_ipv6.entry(ipv6.clone()).or_insert(position);
            }
        }

        index.records = records;
        index
    }

    fn get(&self, position: Option<&usize>) -> Option<&BanRecord> {
        position.and_then(|&p| self.records.get(p))
    }
}

/// Immutable view over both ban partitions at one point in time
#[derive(Debug)]
pub struct BanSnapshot {
    verified: PartitionIndex,
    unverified: PartitionIndex,
    /// SHA-256 of the source database (or of the records for in-memory snapshots)
    digest: String,
}

impl BanSnapshot {
    /// Build a snapshot from a fully written ban database file
    ///
    /// Blocking: call from `spawn_blocking` inside async code.
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = std::fs::read(path)?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        drop(bytes);

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(SnapshotError::Open)?;

        let tables = list_tables(&conn)?;

        let verified = load_partition(&conn, &tables, BanPartition::Verified)?;
        let unverified = load_partition(&conn, &tables, BanPartition::Unverified)?;

        debug!(
            verified = verified.len(),
            unverified = unverified.len(),
            digest = %digest,
            "Parsed ban database"
        );

        Ok(Self {
            verified: PartitionIndex::from_records(verified),
            unverified: PartitionIndex::from_records(unverified),
            digest,
        })
    }

    /// Build a snapshot directly from records
    pub fn from_records(verified: Vec<BanRecord>, unverified: Vec<BanRecord>) -> Self {
        let mut hasher = Sha256::new();
        for (partition, records) in [
            (BanPartition::Verified, &verified),
            (BanPartition::Unverified, &unverified),
        ] {
            hasher.update(partition.table_name().as_bytes());
            for record in records {
                hasher.update(record.subject_name.as_bytes());
                hasher.update([0u8]);
                hasher.update(record.ip.as_deref().unwrap_or("").as_bytes());
                hasher.update([0u8]);
                hasher.update(record.ipv6.as_deref().unwrap_or("").as_bytes());
                hasher.update([0u8]);
                hasher.update(record.persistent_id.as_deref().unwrap_or("").as_bytes());
                hasher.update([0u8]);
                hasher.update(record.reason.as_bytes());
                hasher.update([0u8]);
                hasher.update(record.banned_at.as_bytes());
                hasher.update([1u8]);
            }
        }

        Self {
            verified: PartitionIndex::from_records(verified),
            unverified: PartitionIndex::from_records(unverified),
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    fn partition(&self, partition: BanPartition) -> &PartitionIndex {
        match partition {
            BanPartition::Verified => &self.verified,
            BanPartition::Unverified => &self.unverified,
        }
    }

    pub fn lookup_by_identity(
        &self,
        partition: BanPartition,
        persistent_id: &str,
    ) -> Option<&BanRecord> {
        let index = self.partition(partition);
        index.get(index.by_identity.get(persistent_id))
    }

    pub fn lookup_by_name(&self, partition: BanPartition, name: &str) -> Option<&BanRecord> {
        let index = self.partition(partition);
        index.get(index.by_name.get(name))
    }

    /// Look up an IPv4 or IPv6 literal; the family is inferred from the text
    pub fn lookup_by_address(&self, partition: BanPartition, address: &str) -> Option<&BanRecord> {
        let index = self.partition(partition);
        match AddressKind::classify(address) {
            AddressKind::V4 => index.get(index.by_ip.get(address)),
            AddressKind::V6 => index.get(index.by_ipv6.get(address)),
        }
    }

    pub fn record_count(&self, partition: BanPartition) -> usize {
        self.partition(partition).records.len()
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn list_tables(conn: &Connection) -> Result<Vec<String>, SnapshotError> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(SnapshotError::Open)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(SnapshotError::Open)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(SnapshotError::Open)?;
    Ok(names)
}

fn table_columns(conn: &Connection, table: &'static str) -> Result<Vec<String>, SnapshotError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info('{}')", table))
        .map_err(|source| SnapshotError::Query { table, source })?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|source| SnapshotError::Query { table, source })?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|source| SnapshotError::Query { table, source })?;
    Ok(columns)
}

fn load_partition(
    conn: &Connection,
    tables: &[String],
    partition: BanPartition,
) -> Result<Vec<BanRecord>, SnapshotError> {
    let table = partition.table_name();
    if !tables.iter().any(|t| t == table) {
        return Err(SnapshotError::MissingPartition(table));
    }

    let columns = table_columns(conn, table)?;
    for &column in REQUIRED_COLUMNS {
        if !columns.iter().any(|c| c == column) {
            return Err(SnapshotError::MissingColumn { table, column });
        }
    }

    let has_identity = columns.iter().any(|c| c == IDENTITY_COLUMN);
    if partition == BanPartition::Verified && !has_identity {
        return Err(SnapshotError::MissingColumn {
            table,
            column: IDENTITY_COLUMN,
        });
    }

    let identity_expr = if has_identity { IDENTITY_COLUMN } else { "NULL" };
    let sql = format!(
        "SELECT player, ip, ipv6, {}, ban_reason, ban_time FROM {}",
        identity_expr, table
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|source| SnapshotError::Query { table, source })?;
    let records = stmt
        .query_map([], |row| {
            Ok(BanRecord {
                subject_name: column_text(row.get(0)?).unwrap_or_default(),
                ip: column_text(row.get(1)?),
                ipv6: column_text(row.get(2)?),
                persistent_id: column_text(row.get(3)?),
                reason: column_text(row.get(4)?).unwrap_or_default(),
                banned_at: column_text(row.get(5)?).unwrap_or_default(),
            })
        })
        .map_err(|source| SnapshotError::Query { table, source })?
        .collect::<Result<Vec<BanRecord>, _>>()
        .map_err(|source| SnapshotError::Query { table, source })?;

    Ok(records)
}

/// Render any SQLite value as text; NULL and blank values are absent
fn column_text(value: Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}
