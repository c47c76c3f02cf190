//! Liveness data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A callsign together with the last time it was heard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsignTime {
    pub callsign: String,
    pub last_seen: DateTime<Utc>,
}

impl CallsignTime {
    pub fn new(callsign: impl Into<String>, last_seen: DateTime<Utc>) -> Self {
        Self {
            callsign: callsign.into(),
            last_seen,
        }
    }
}

/// A notification target: where to send mail when a callsign goes quiet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsignEmail {
    pub callsign: String,
    pub email: String,
}

impl CallsignEmail {
    pub fn new(callsign: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            email: email.into(),
        }
    }
}

/// Which of the two timestamp partitions a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Live,
    Dead,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Live => "live",
            Partition::Dead => "dead",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// APRS symbol: table identifier plus symbol code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub table: char,
    pub code: char,
}

impl Symbol {
    pub fn new(table: char, code: char) -> Self {
        Self { table, code }
    }

    /// Glyph shown next to a callsign in diagnostics. Empty when the symbol has no glyph.
    pub fn glyph(&self) -> &'static str {
        // Overlay tables ('0'-'9', 'A'-'Z') share the alternate table glyphs.
        let primary = self.table == '/';
        match (primary, self.code) {
            (true, '!') => "🚓",
            (true, '#') | (false, '#') => "⭐",
            (true, '$') => "☎",
            (true, '\'') => "✈",
            (true, '-') => "🏠",
            (true, '/') => "🔴",
            (true, ';') => "⛺",
            (true, '<') => "🏍",
            (true, '>') => "🚗",
            (true, 'O') => "🎈",
            (true, 'R') => "🚙",
            (true, 'X') => "🚁",
            (true, 'Y') => "⛵",
            (true, '[') => "🚶",
            (true, '^') => "✈",
            (true, '_') => "🌦",
            (true, 'a') => "🚑",
            (true, 'b') => "🚲",
            (true, 'f') => "🚒",
            (true, 'j') => "🚙",
            (true, 'k') => "🚚",
            (true, 'r') => "📡",
            (true, 's') => "🚤",
            (true, 'u') => "🚛",
            (true, 'v') => "🚐",
            (true, 'y') => "📻",
            (false, '&') => "💎",
            (false, '-') => "🏠",
            (false, '>') => "🚘",
            (false, '_') => "🌦",
            (false, 'n') => "🔺",
            _ => "",
        }
    }
}

/// A decoded position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub symbol: Symbol,
}

/// One decoded report from the network feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    /// Source callsign (possibly with SSID), empty when the frame carried none.
    pub source: String,

    /// Whether the frame itself was well formed.
    pub frame_valid: bool,

    /// Decoded position, absent for non-positional traffic.
    pub position: Option<Position>,

    /// Original line as received.
    pub raw: String,
}

impl Observation {
    /// A well formed frame carrying a position.
    pub fn with_position(source: impl Into<String>, position: Position) -> Self {
        Self {
            source: source.into(),
            frame_valid: true,
            position: Some(position),
            raw: String::new(),
        }
    }

    /// A well formed frame without a decodable position.
    pub fn without_position(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            frame_valid: true,
            position: None,
            raw: String::new(),
        }
    }

    /// A frame that could not be parsed.
    pub fn invalid(raw: impl Into<String>) -> Self {
        Self {
            source: String::new(),
            frame_valid: false,
            position: None,
            raw: raw.into(),
        }
    }
}
