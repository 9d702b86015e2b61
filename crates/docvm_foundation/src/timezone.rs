//! Timezone database handle.
//!
//! Zones are fixed UTC offsets. Besides registered names the database
//! understands `UTC`, `GMT`, `Z` and numeric offsets such as `+05:30`,
//! `-0800` or `+03`.

use std::collections::HashMap;

use chrono::FixedOffset;

/// A database of named timezones.
#[derive(Debug, Clone, Default)]
pub struct TimeZoneDb {
    zones: HashMap<String, FixedOffset>,
}

impl TimeZoneDb {
    /// Creates a database with only the built-in UTC aliases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named zone with a fixed offset in seconds east of UTC.
    ///
    /// Offsets outside +/- 24 hours are ignored.
    #[must_use]
    pub fn with_zone(mut self, name: impl Into<String>, offset_seconds: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(offset_seconds) {
            self.zones.insert(name.into(), offset);
        }
        self
    }

    /// Resolves a zone name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<FixedOffset> {
        if let Some(offset) = self.zones.get(name) {
            return Some(*offset);
        }
        match name {
            "UTC" | "GMT" | "Z" | "Etc/UTC" | "Etc/GMT" => FixedOffset::east_opt(0),
            _ => parse_offset(name),
        }
    }

    /// Returns true if `name` resolves to a zone.
    #[must_use]
    pub fn is_valid(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
