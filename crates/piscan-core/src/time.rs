//! Backend timestamp normalization.
//!
//! Backend timestamps are UTC, but not every producer appends a `Z`. Parsing
//! accepts RFC 3339 (the offset is honoured) and naive date-times, which are
//! read as UTC. Conversion to the display zone goes through a timezone
//! database, never a fixed numeric offset, so daylight-saving transitions
//! come out right.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Rendered by [`TimeNormalizer::display`] for unparseable input.
pub const INVALID_DATE: &str = "Invalid Date";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Zone that timestamps are converted into for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayZone {
    /// The running device's zone, from the system timezone database.
    #[default]
    Local,
    /// A fixed IANA zone.
    Named(Tz),
}

impl FromStr for DisplayZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        trimmed
            .parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| format!("unknown timezone '{trimmed}'"))
    }
}

impl fmt::Display for DisplayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Display-ready time facts for one validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTime {
    /// e.g. `Jan 15, 2024, 2:30 PM`
    pub display: String,
    /// e.g. `5m ago`
    pub relative: String,
}

/// Converts backend timestamps into display strings and relative labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeNormalizer {
    zone: DisplayZone,
}

impl TimeNormalizer {
    /// Creates a normalizer rendering into `zone`.
    #[must_use]
    pub const fn new(zone: DisplayZone) -> Self {
        Self { zone }
    }

    /// The zone this normalizer renders into.
    #[must_use]
    pub const fn zone(&self) -> DisplayZone {
        self.zone
    }

    /// Parses a backend timestamp into a UTC instant.
    ///
    /// Returns `None` when the input matches none of the accepted forms.
    #[must_use]
    pub fn parse_utc(timestamp: &str) -> Option<DateTime<Utc>> {
        let raw = timestamp.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .map(|naive| naive.and_utc())
    }

    /// Converts a UTC instant into the display zone.
    #[must_use]
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self.zone {
            DisplayZone::Local => instant.with_timezone(&Local).fixed_offset(),
            DisplayZone::Named(tz) => instant.with_timezone(&tz).fixed_offset(),
        }
    }

    /// Interprets `timestamp` as UTC and converts it into the display zone.
    ///
    /// Malformed input yields `None` rather than an error.
    #[must_use]
    pub fn to_local(&self, timestamp: &str) -> Option<DateTime<FixedOffset>> {
        Self::parse_utc(timestamp).map(|instant| self.localize(instant))
    }

    /// Relative label for `timestamp` measured against the current time.
    #[must_use]
    pub fn relative(&self, timestamp: &str) -> String {
        self.relative_at(timestamp, Utc::now())
    }

    /// Relative label for `timestamp` measured against `now`.
    ///
    /// Malformed input is echoed back unchanged.
    #[must_use]
    pub fn relative_at(&self, timestamp: &str, now: DateTime<Utc>) -> String {
        match Self::parse_utc(timestamp) {
            Some(instant) => relative_label(now.signed_duration_since(instant).num_minutes()),
            None => timestamp.to_string(),
        }
    }

    /// Renders `timestamp` as month abbreviation, day, year and 12-hour time.
    #[must_use]
    pub fn display(&self, timestamp: &str) -> String {
        self.to_local(timestamp).map_or_else(
            || INVALID_DATE.to_string(),
            |local| local.format("%b %-d, %Y, %-I:%M %p").to_string(),
        )
    }

    /// Both display forms for one instant.
    #[must_use]
    pub fn result_time(&self, timestamp: &str, now: DateTime<Utc>) -> ResultTime {
        ResultTime {
            display: self.display(timestamp),
            relative: self.relative_at(timestamp, now),
        }
    }
}

/// Buckets elapsed whole minutes into a short label.
fn relative_label(minutes: i64) -> String {
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if minutes < 60 * 24 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / (60 * 24))
    }
}
