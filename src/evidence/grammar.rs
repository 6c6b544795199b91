//! Join-event log grammar
//!
//! ```text
//! [10:04:58] [User Authenticator #1/INFO]: UUID of player Alice is 11111111-1111-1111-1111-111111111111
//! [10:04:58] [Server thread/INFO]: Alice[/203.0.113.7:51234] logged in with entity id 42 at (0.5, 64.0, 0.5)
//! [10:04:58] [Server thread/INFO]: Alice joined the game
//! ```
//!
//! Patterns only run on the message after the logger prefix at the start
//! of the line, and must match from the first message character. Chat lines
//! such as `<Bob> lol ]: Alice joined the game` never produce events.

use chrono::NaiveTime;
use regex::Regex;
use std::sync::LazyLock;

/// `[HH:MM:SS]` (vanilla) or `[HH:MM:SS LEVEL]` (Paper/Spigot)
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{2}):(\d{2}):(\d{2})[\] ]").unwrap());

/// `[10:04:58] [Server thread/INFO]: ` or `[10:04:58 INFO]: `
static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]*\](?: \[[^\]]*\])*: ").unwrap());

static IDENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^UUID of player ([^\s\[\]]+) is ([0-9a-fA-F-]{36})\s*$").unwrap()
});

/// `name[/1.2.3.4:port]`, `name[/0:0:0:0:0:0:0:1:port]` or `name[/[::1]:port]`
static CONNECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([^\s\[\]]+)\[/(?:\[([0-9A-Fa-f:.]+)\]|([0-9A-Fa-f.:]+)):(\d+)\] (?:logged in|joined the game)\b",
    )
    .unwrap()
});

/// Renamed accounts are announced as `Alice (formerly known as Al) joined the game`
static JOINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\s\[\]]+) (?:\(formerly known as [^\s()]+\) )?joined the game\s*$").unwrap()
});

/// Classification of a single log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLine<'a> {
    /// Identity token assigned to a player by the authenticator
    IdentityAssigned {
        name: &'a str,
        persistent_id: &'a str,
    },
    /// Connection with the remote address the player came from
    Connected { name: &'a str, address: &'a str },
    /// Join announcement without address information
    Joined { name: &'a str },
    /// Anything else, including lines matching several patterns
    Other,
}

/// Wall-clock time embedded in a line, if any
pub fn parse_timestamp(line: &str) -> Option<NaiveTime> {
    let caps = TIMESTAMP_RE.captures(line)?;
    let hour = caps[1].parse().ok()?;
    let minute = caps[2].parse().ok()?;
    let second = caps[3].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Message part of a line, after the logger prefix
fn message(line: &str) -> Option<&str> {
    PREFIX_RE.find(line).map(|prefix| &line[prefix.end()..])
}

pub fn parse_line(line: &str) -> LogLine<'_> {
    let Some(message) = message(line) else {
        return LogLine::Other;
    };

    let identity = IDENTITY_RE.captures(message).and_then(|caps| {
        Some(LogLine::IdentityAssigned {
            name: caps.get(1)?.as_str(),
            persistent_id: caps.get(2)?.as_str(),
        })
    });

    let connected = CONNECTED_RE.captures(message).and_then(|caps| {
        let address = caps.get(2).or_else(|| caps.get(3))?;
        Some(LogLine::Connected {
            name: caps.get(1)?.as_str(),
            address: address.as_str(),
        })
    });

    match (identity, connected) {
        (Some(identity), None) => identity,
        (None, Some(connected)) => connected,
        (Some(_), Some(_)) => LogLine::Other,
        (None, None) => match JOINED_RE.captures(message).and_then(|caps| caps.get(1)) {
            Some(name) => LogLine::Joined {
                name: name.as_str(),
            },
            None => LogLine::Other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(
            parse_timestamp("[10:03:00] [Server thread/INFO]: Done"),
            NaiveTime::from_hms_opt(10, 3, 0)
        );
        assert_eq!(
            parse_timestamp("[23:59:59 INFO]: Done"),
            NaiveTime::from_hms_opt(23, 59, 59)
        );
        assert_eq!(parse_timestamp("no timestamp here"), None);
        assert_eq!(parse_timestamp("[25:00:00] bad hour"), None);
    }

    #[test]
    fn test_identity_line() {
        let line = "[10:04:58] [User Authenticator #1/INFO]: UUID of player Alice is 11111111-1111-1111-1111-111111111111";
        assert_eq!(
            parse_line(line),
            LogLine::IdentityAssigned {
                name: "Alice",
                persistent_id: "11111111-1111-1111-1111-111111111111"
            }
        );
    }

    #[test]
    fn test_ipv4_connection_line() {
        let line = "[10:04:58] [Server thread/INFO]: Alice[/203.0.113.7:51234] logged in with entity id 42 at (0.5, 64.0, 0.5)";
        assert_eq!(
            parse_line(line),
            LogLine::Connected {
                name: "Alice",
                address: "203.0.113.7"
            }
        );
    }

    #[test]
    fn test_ipv6_connection_lines() {
        let plain = "[10:04:58] [Server thread/INFO]: Alice[/2001:db8:0:0:0:0:0:1:51234] logged in with entity id 42";
        assert_eq!(
            parse_line(plain),
            LogLine::Connected {
                name: "Alice",
                address: "2001:db8:0:0:0:0:0:1"
            }
        );

        let bracketed = "[10:04:58 INFO]: Alice[/[2001:db8::1]:51234] logged in with entity id 42";
        assert_eq!(
            parse_line(bracketed),
            LogLine::Connected {
                name: "Alice",
                address: "2001:db8::1"
            }
        );
    }

    #[test]
    fn test_joined_line() {
        assert_eq!(
            parse_line("[10:04:58] [Server thread/INFO]: Alice joined the game"),
            LogLine::Joined { name: "Alice" }
        );
    }

    #[test]
    fn test_chat_cannot_forge_evidence() {
        let forged = [
            "[10:04:58] [Server thread/INFO]: <Bob> UUID of player Alice is 11111111-1111-1111-1111-111111111111",
            "[10:04:58] [Server thread/INFO]: <Bob> Alice[/203.0.113.7:51234] logged in",
            "[10:04:58] [Server thread/INFO]: <Bob> Alice joined the game",
        ];
        for line in forged {
            assert_eq!(parse_line(line), LogLine::Other, "{}", line);
        }
    }

    #[test]
    fn test_chat_with_inner_prefix_cannot_forge_evidence() {
        let forged = [
            "[10:04:50] [Server thread/INFO]: <Bob> lol ]: Carol[/203.0.113.7:1] logged in",
            "[10:04:50] [Server thread/INFO]: <Bob> ]: Carol joined the game",
            "[10:04:50] [Server thread/INFO]: <Bob> x]: UUID of player Carol is 11111111-1111-1111-1111-111111111111",
            "[10:04:50 INFO]: <Bob> [10:04:50] [Server thread/INFO]: Carol joined the game",
            "[10:04:50] [Server thread/INFO]: [Server] Carol joined the game",
            "[10:04:50] [Server thread/INFO]: * Bob joined the game",
        ];
        for line in forged {
            assert_eq!(parse_line(line), LogLine::Other, "{}", line);
        }
    }

    #[test]
    fn test_renamed_player_join_line() {
        assert_eq!(
            parse_line("[10:04:58] [Server thread/INFO]: Alice (formerly known as Al) joined the game"),
            LogLine::Joined { name: "Alice" }
        );
        assert_eq!(
            parse_line("[10:04:58] [Server thread/INFO]: <Bob> Alice (formerly known as Al) joined the game"),
            LogLine::Other
        );
    }

    #[test]
    fn test_prefix_is_required() {
        assert_eq!(parse_line("Alice joined the game"), LogLine::Other);
        assert_eq!(
            parse_line("Alice[/203.0.113.7:1] logged in with entity id 1"),
            LogLine::Other
        );
    }

    #[test]
    fn test_connection_requires_marker() {
        let line = "[10:04:58] [Server thread/INFO]: Alice[/203.0.113.7:51234] lost connection";
        assert_eq!(parse_line(line), LogLine::Other);
    }

    #[test]
    fn test_malformed_lines_are_neutral() {
        for line in [
            "",
            "]: ",
            "[10:00:00] UUID of player is",
            "[10:00:00] [Server thread/INFO]: UUID of player Alice is not-a-token",
            "\u{fffd}\u{fffd}[/:]",
        ] {
            assert_eq!(parse_line(line), LogLine::Other, "{:?}", line);
        }
    }
}
