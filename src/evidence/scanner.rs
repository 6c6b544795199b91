use chrono::{Local, NaiveDateTime};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::EvidenceRecord;
use super::grammar::{LogLine, parse_line, parse_timestamp};
use crate::config::EvidenceConfig;
use crate::snapshot::AddressKind;

/// Reads the recent tail of a server log and extracts identity hints
#[derive(Debug, Clone)]
pub struct LogEvidenceScanner {
    freshness_window: Duration,
    max_tail_bytes: u64,
}

impl LogEvidenceScanner {
    pub fn new(freshness_window: Duration, max_tail_bytes: u64) -> Self {
        Self {
            freshness_window,
            max_tail_bytes,
        }
    }

    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self::new(
            Duration::from_secs(config.freshness_window_secs),
            config.max_tail_bytes,
        )
    }

    /// Scan the log at `log_path` for evidence about `player`, relative to now
    ///
    /// Blocking file I/O.
    pub fn scan(&self, player: &str, log_path: &Path) -> EvidenceRecord {
        self.scan_at(player, log_path, Local::now().naive_local())
    }

    /// Same as [`scan`](Self::scan) with an explicit local wall-clock time
    pub fn scan_at(&self, player: &str, log_path: &Path, now: NaiveDateTime) -> EvidenceRecord {
        match read_tail(log_path, self.max_tail_bytes) {
            Ok(text) => self.scan_text(player, &text, now),
            Err(e) => {
                debug!(
                    path = %log_path.display(),
                    error = %e,
                    "Log source unavailable, no evidence collected"
                );
                EvidenceRecord::default()
            }
        }
    }

    /// Scan already loaded log text, newest line last
    pub fn scan_text(&self, player: &str, text: &str, now: NaiveDateTime) -> EvidenceRecord {
        let cutoff = chrono::Duration::from_std(self.freshness_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(NaiveDateTime::MIN);
        // Log timestamps carry no date; they are taken as today
        let today = now.date();

        let mut evidence = EvidenceRecord::default();

        for line in text.lines().rev() {
            let Some(time) = parse_timestamp(line) else {
                continue;
            };

            if today.and_time(time) < cutoff {
                break;
            }

            if !line.contains(player) {
                continue;
            }

            match parse_line(line) {
                LogLine::IdentityAssigned {
                    name,
                    persistent_id,
                } if name == player => {
                    evidence
                        .persistent_id
                        .get_or_insert_with(|| persistent_id.to_string());
                }
                LogLine::Connected { name, address } if name == player => {
                    let slot = match AddressKind::classify(address) {
                        AddressKind::V4 => &mut evidence.ip,
                        AddressKind::V6 => &mut evidence.ipv6,
                    };
                    slot.get_or_insert_with(|| address.to_string());
                }
                _ => {}
            }

            if evidence.is_complete() {
                break;
            }
        }

        evidence
    }
}

/// Read at most `max_bytes` from the end of the file, dropping a leading
/// partial line when the read starts mid-file
fn read_tail(path: &Path, max_bytes: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;

    let text = String::from_utf8_lossy(&buf);
    if start > 0 {
        match text.find('\n') {
            Some(newline) => Ok(text[newline + 1..].to_string()),
            None => Ok(String::new()),
        }
    } else {
        Ok(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ALICE_ID: &str = "11111111-1111-1111-1111-111111111111";

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn scanner() -> LogEvidenceScanner {
        LogEvidenceScanner::new(Duration::from_secs(120), 1024 * 1024)
    }

    #[test]
    fn test_full_join_sequence() {
        let log = format!(
            "[10:04:57] [Server thread/INFO]: Starting minecraft server\n\
             [10:04:58] [User Authenticator #1/INFO]: UUID of player Alice is {}\n\
             [10:04:58] [Server thread/INFO]: Alice[/203.0.113.7:51234] logged in with entity id 42 at (0.5, 64.0, 0.5)\n\
             [10:04:58] [Server thread/INFO]: Alice joined the game\n",
            ALICE_ID
        );

        let evidence = scanner().scan_text("Alice", &log, at(10, 5, 0));
        assert_eq!(evidence.persistent_id.as_deref(), Some(ALICE_ID));
        assert_eq!(evidence.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(evidence.ipv6, None);
    }

    #[test]
    fn test_freshness_boundary() {
        // window 120s, now 10:05:00: 10:03:00 is in, 10:02:59 is out
        let included = "[10:03:00] [Server thread/INFO]: Alice[/203.0.113.7:1] logged in\n";
        let excluded = "[10:02:59] [Server thread/INFO]: Alice[/203.0.113.7:1] logged in\n";

        let evidence = scanner().scan_text("Alice", included, at(10, 5, 0));
        assert_eq!(evidence.ip.as_deref(), Some("203.0.113.7"));

        let evidence = scanner().scan_text("Alice", excluded, at(10, 5, 0));
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_chat_echo_of_join_lines_ignored() {
        let log = "[10:04:50] [Server thread/INFO]: <Bob> lol ]: Carol[/203.0.113.7:1] logged in\n\
                   [10:04:51] [Server thread/INFO]: <Bob> ]: UUID of player Carol is 11111111-1111-1111-1111-111111111111\n\
                   [10:04:52] [Server thread/INFO]: <Bob> ]: Carol joined the game\n";

        let evidence = scanner().scan_text("Carol", log, at(10, 5, 0));
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_stale_line_stops_scan() {
        let log = "[09:00:00] [Server thread/INFO]: Alice[/198.51.100.1:1] logged in\n\
                   [10:00:00] [Server thread/INFO]: Server reloaded\n\
                   [10:04:59] [Server thread/INFO]: Bob[/203.0.113.9:1] logged in\n";

        let evidence = scanner().scan_text("Alice", log, at(10, 5, 0));
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_untimestamped_lines_do_not_stop_scan() {
        let log = "[10:04:50] [Server thread/INFO]: Alice[/203.0.113.7:1] logged in\n\
                   \tat net.minecraft.server.Main.main(Main.java:1)\n\
                   java.lang.IllegalStateException: something Alice\n";

        let evidence = scanner().scan_text("Alice", log, at(10, 5, 0));
        assert_eq!(evidence.ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_most_recent_match_wins() {
        let log = "[10:04:00] [Server thread/INFO]: Alice[/198.51.100.1:1] logged in\n\
                   [10:04:30] [Server thread/INFO]: Alice[/203.0.113.7:1] logged in\n";

        let evidence = scanner().scan_text("Alice", log, at(10, 5, 0));
        assert_eq!(evidence.ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_ipv6_goes_to_its_own_field() {
        let log = "[10:04:00] [Server thread/INFO]: Alice[/2001:db8:0:0:0:0:0:1:1] logged in\n";

        let evidence = scanner().scan_text("Alice", log, at(10, 5, 0));
        assert_eq!(evidence.ip, None);
        assert_eq!(evidence.ipv6.as_deref(), Some("2001:db8:0:0:0:0:0:1"));
    }

    #[test]
    fn test_partial_name_collision() {
        let log = format!(
            "[10:04:58] [User Authenticator #1/INFO]: UUID of player Alice2 is {}\n\
             [10:04:58] [Server thread/INFO]: xAlice[/203.0.113.7:1] logged in\n",
            ALICE_ID
        );

        let evidence = scanner().scan_text("Alice", &log, at(10, 5, 0));
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_missing_log_file() {
        let evidence = scanner().scan_at(
            "Alice",
            Path::new("/nonexistent/ndpr/latest.log"),
            at(10, 5, 0),
        );
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_scan_file_tail() {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..500 {
            writeln!(file, "[10:04:00] [Server thread/INFO]: filler line {}", i).unwrap();
        }
        writeln!(
            file,
            "[10:04:58] [Server thread/INFO]: Alice[/203.0.113.7:51234] logged in with entity id 42"
        )
        .unwrap();
        file.flush().unwrap();

        // Tail window smaller than the file: only the last lines are read
        let scanner = LogEvidenceScanner::new(Duration::from_secs(120), 512);
        let evidence = scanner.scan_at("Alice", file.path(), at(10, 5, 0));
        assert_eq!(evidence.ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_read_tail_drops_partial_line() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "first line\nsecond line\nthird").unwrap();
        file.flush().unwrap();

        let tail = read_tail(file.path(), 15).unwrap();
        assert_eq!(tail, "third");

        let all = read_tail(file.path(), 1024).unwrap();
        assert_eq!(all, "first line\nsecond line\nthird");
    }
}
