//! Feed definitions loaded from the YAML config file.

use crate::error::FeedError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One configured external data source: a query, a schedule, and the value
/// mappings extracted from its responses.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub query: FeedQuery,
    #[serde(default)]
    pub schedule: FeedSchedule,
    #[serde(default)]
    pub store: Vec<StoreMapping>,
}

/// Declarative HTTP request spec for one feed.
///
/// Header and param values may be literal strings or `env:NAME` indirections,
/// resolved against the process environment at request time.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedQuery {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_status")]
    pub status: u16,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

/// When the feed should refresh. A feed without `every` is never
/// automatically due; it can still be updated through the manual triggers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedSchedule {
    #[serde(default)]
    pub every: Option<String>,
}

impl FeedSchedule {
    /// Parses the `every` interval, if one is configured.
    pub fn every_interval(&self) -> Result<Option<Duration>, FeedError> {
        match &self.every {
            Some(raw) => parse_duration(raw).map(Some),
            None => Ok(None),
        }
    }
}

/// A named JSON path within the feed response.
///
/// `window_size` caps how many elements a list-shaped value retains; whether a
/// value is written as a list is decided by the response shape, not by
/// `is_list` (see the extraction engine).
#[derive(Debug, Clone, Deserialize)]
pub struct StoreMapping {
    pub name: String,
    pub path: String,
    #[serde(default, rename = "isList")]
    pub is_list: bool,
    #[serde(default, rename = "windowSize")]
    pub window_size: Option<usize>,
}

/// Parses Go-style duration strings like "90s", "15m" or "1h30m".
pub fn parse_duration(raw: &str) -> Result<Duration, FeedError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(FeedError::ConfigError("empty duration".to_string()));
    }

    let bytes = s.as_bytes();
    let mut total = Duration::ZERO;
    let mut i = 0;

    while i < s.len() {
        let num_start = i;
        while i < s.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        let number: f64 = s[num_start..i]
            .parse()
            .map_err(|_| FeedError::ConfigError(format!("invalid duration '{raw}'")))?;

        let unit_start = i;
        while i < s.len() && !bytes[i].is_ascii_digit() {
            i += 1;
        }
        let seconds = match &s[unit_start..i] {
            "ms" => number / 1_000.0,
            "s" => number,
            "m" => number * 60.0,
            "h" => number * 3_600.0,
            unit => {
                return Err(FeedError::ConfigError(format!(
                    "unknown duration unit '{unit}' in '{raw}'"
                )))
            }
        };
        let step = Duration::try_from_secs_f64(seconds)
            .map_err(|_| FeedError::ConfigError(format!("duration '{raw}' out of range")))?;
        total = total
            .checked_add(step)
            .ok_or_else(|| FeedError::ConfigError(format!("duration '{raw}' out of range")))?;
    }

    Ok(total)
}
