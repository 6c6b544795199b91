//! Remote Ban Service
//!
//! Thin HTTP collaborator used by the syncer to obtain and acknowledge
//! database downloads, plus the review-submission call.
//!
//! ```text
//! POST {api}/bans/download       {token}            -> {url}
//! GET  {url}                                        -> ban_database.db bytes
//! POST {api}/bans/download/done  {token}            -> ack (best effort)
//! POST {api}/check/uploader      {token, evidence}  -> {result, check_id | message}
//! ```

mod client;
mod types;

pub use client::{BanService, RemoteBanClient};
pub use types::{DownloadTicket, ReviewOutcome, ReviewSubmission};
