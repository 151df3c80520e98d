//! Persists extracted feed values and per-feed next-run records.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::config::{Config, StoreMapping};
use crate::error::FeedError;
use crate::extract::Extracted;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Feed name -> mapping name -> stored scalar or list.
/// Mappings that never received a successful write are absent.
pub type ValueMap = HashMap<String, HashMap<String, Value>>;

/// Fixed textual timestamp representation shared by every writer and reader
/// of next-run records (ANSIC, e.g. "Mon Jan  2 15:04:05 2006", UTC).
pub const TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

pub fn value_key(feed: &str, mapping: &str) -> String {
    format!("value:{feed}:{mapping}")
}

pub fn schedule_key(feed: &str) -> String {
    format!("next-update:{feed}")
}

/// The stored representation of one JSON scalar: strings are stored bare,
/// everything else as its JSON text ("21.5", "true", "null").
pub fn scalar_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The value store: the only shared mutable resource in the pipeline.
///
/// Implementations are constructed explicitly and passed to every component,
/// so tests can run against an isolated instance.
#[async_trait]
pub trait Store: Send + Sync {
    /// Earliest moment the feed may run again; `None` when no record exists.
    async fn get_next_run(&self, feed: &str) -> Result<Option<DateTime<Utc>>, FeedError>;

    /// Writes the next-run record. Only invoked after `apply_results`
    /// succeeds, so a failed cycle leaves the feed due on the next check.
    async fn set_next_run(&self, feed: &str, when: DateTime<Utc>) -> Result<(), FeedError>;

    /// Writes one cycle's extracted values as a single batched operation.
    ///
    /// List values are appended element by element and trimmed to the last
    /// `window_size` elements of their mapping (or to the appended batch
    /// length when no window is configured); scalars are overwritten
    /// unconditionally. The batch carries no cross-key atomicity guarantee.
    async fn apply_results(
        &self,
        feed: &str,
        mappings: &[StoreMapping],
        results: &[(String, Extracted)],
    ) -> Result<(), FeedError>;

    /// Current value of every configured mapping, for presentation.
    ///
    /// The read shape follows the declared mapping (`is_list`/`window_size`),
    /// while writes follow the actual response shape. On Redis, a mapping
    /// declared scalar that received a list write therefore fails the read
    /// with a type error until its declaration is corrected; the in-memory
    /// store reads back whatever variant is stored.
    async fn read_all(&self, config: &Config) -> Result<ValueMap, FeedError>;

    /// Publishes a payload on a named broadcast channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), FeedError>;

    /// Subscribes to a named channel. The receiver ends (returns `None`)
    /// when the underlying subscription read fails; listeners treat that as
    /// terminal.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, FeedError>;
}

/// Trim width for one list write: the mapping's window if configured,
/// otherwise the size of the appended batch (keep-what-you-wrote fallback).
pub(crate) fn trim_window(mappings: &[StoreMapping], name: &str, appended: usize) -> usize {
    mappings
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.window_size)
        .unwrap_or(appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_follow_the_fixed_convention() {
        assert_eq!(value_key("weather", "temp"), "value:weather:temp");
        assert_eq!(schedule_key("weather"), "next-update:weather");
    }

    #[test]
    fn timestamps_round_trip_through_the_ansic_format() {
        let when = Utc.with_ymd_and_hms(2024, 3, 2, 15, 4, 5).unwrap();
        let text = when.format(TIME_FORMAT).to_string();
        assert_eq!(text, "Sat Mar  2 15:04:05 2024");

        let parsed = chrono::NaiveDateTime::parse_from_str(&text, TIME_FORMAT)
            .unwrap()
            .and_utc();
        assert_eq!(parsed, when);
    }

    #[test]
    fn scalars_are_stored_as_text() {
        assert_eq!(scalar_repr(&serde_json::json!(21.5)), "21.5");
        assert_eq!(scalar_repr(&serde_json::json!("ok")), "ok");
        assert_eq!(scalar_repr(&serde_json::json!(true)), "true");
        assert_eq!(scalar_repr(&serde_json::Value::Null), "null");
    }
}
