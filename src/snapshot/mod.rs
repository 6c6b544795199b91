//! Ban Snapshot
//!
//! Immutable, queryable index over the two ban partitions of a downloaded
//! ban database.
//!
//! ```text
//! ban_database.db ──► BanSnapshot::open ──► ┌──────────────────────┐
//!  (online/offline)                          │ Verified   (online)  │
//!                                            │ Unverified (offline) │
//!                                            └──────────────────────┘
//!                                              by name / identity /
//!                                              ip / ipv6
//! ```
//!
//! A snapshot is never mutated after construction. Readers hold an
//! `Arc<BanSnapshot>` for the duration of one lookup.

mod record;
mod store;

pub use record::{AddressKind, BanPartition, BanRecord};
pub use store::{BanSnapshot, REQUIRED_COLUMNS};
