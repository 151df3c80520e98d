//! In-process store implementation for tests and local development. Mirrors
//! the Redis key/value semantics, including the textual scalar representation
//! and broadcast pub/sub delivery.

use crate::config::{Config, StoreMapping};
use crate::error::FeedError;
use crate::extract::Extracted;
use crate::store::{scalar_repr, trim_window, value_key, Store, ValueMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc, Mutex};

#[derive(Debug, Clone)]
enum Stored {
    Scalar(String),
    List(Vec<String>),
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Stored>>,
    next_runs: Mutex<HashMap<String, DateTime<Utc>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail, to exercise store-error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), FeedError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FeedError::StoreError("write failure injected".to_string()));
        }
        Ok(())
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_next_run(&self, feed: &str) -> Result<Option<DateTime<Utc>>, FeedError> {
        Ok(self.next_runs.lock().await.get(feed).copied())
    }

    async fn set_next_run(&self, feed: &str, when: DateTime<Utc>) -> Result<(), FeedError> {
        self.check_writable()?;
        self.next_runs.lock().await.insert(feed.to_string(), when);
        Ok(())
    }

    async fn apply_results(
        &self,
        feed: &str,
        mappings: &[StoreMapping],
        results: &[(String, Extracted)],
    ) -> Result<(), FeedError> {
        self.check_writable()?;
        let mut values = self.values.lock().await;

        for (name, extracted) in results {
            let key = value_key(feed, name);
            match extracted {
                Extracted::List(items) => {
                    // An empty batch appends nothing and must not disturb
                    // (or materialize) the stored list.
                    if items.is_empty() {
                        continue;
                    }
                    let slot = values
                        .entry(key)
                        .or_insert_with(|| Stored::List(Vec::new()));
                    // A scalar key re-written as a list starts over.
                    if !matches!(slot, Stored::List(_)) {
                        *slot = Stored::List(Vec::new());
                    }
                    let Stored::List(list) = slot else {
                        unreachable!()
                    };
                    list.extend(items.iter().map(scalar_repr));
                    let window = trim_window(mappings, name, items.len());
                    if list.len() > window {
                        let excess = list.len() - window;
                        list.drain(..excess);
                    }
                }
                Extracted::Scalar(value) => {
                    values.insert(key, Stored::Scalar(scalar_repr(value)));
                }
            }
        }

        Ok(())
    }

    async fn read_all(&self, config: &Config) -> Result<ValueMap, FeedError> {
        let values = self.values.lock().await;
        let mut data: ValueMap = HashMap::new();

        for feed in &config.feeds {
            for mapping in &feed.store {
                let Some(stored) = values.get(&value_key(&feed.name, &mapping.name)) else {
                    continue;
                };
                let value = match stored {
                    Stored::Scalar(text) => Value::String(text.clone()),
                    Stored::List(items) => {
                        Value::Array(items.iter().cloned().map(Value::String).collect())
                    }
                };
                data.entry(feed.name.clone())
                    .or_default()
                    .insert(mapping.name.clone(), value);
            }
        }

        Ok(data)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), FeedError> {
        // A send with no live subscribers is not an error; broadcast
        // delivery just has nobody listening yet.
        let _ = self.sender_for(channel).await.send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, FeedError> {
        let mut source = self.sender_for(channel).await.subscribe();
        let channel_name = channel.to_string();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    // A lagged subscriber just loses the backlog; the
                    // channel itself is still alive.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "subscriber lagged on channel '{}', dropped {} messages",
                            channel_name, skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(name: &str, is_list: bool, window_size: Option<usize>) -> StoreMapping {
        StoreMapping {
            name: name.to_string(),
            path: name.to_string(),
            is_list,
            window_size,
        }
    }

    fn config_for(feed: &str, mappings: Vec<StoreMapping>) -> Config {
        Config {
            feeds: vec![crate::config::FeedConfig {
                name: feed.to_string(),
                query: serde_yaml::from_str("url: http://localhost").unwrap(),
                schedule: Default::default(),
                store: mappings,
            }],
            settings: Settings::default(),
        }
    }

    #[tokio::test]
    async fn scalar_overwrite_and_windowed_list() {
        let store = MemoryStore::new();
        let mappings = [mapping("a", false, None), mapping("b", true, Some(3))];
        let results = vec![
            ("a".to_string(), Extracted::Scalar(json!(1))),
            (
                "b".to_string(),
                Extracted::List(vec![json!(1), json!(2), json!(3), json!(4), json!(5)]),
            ),
        ];

        store.apply_results("f", &mappings, &results).await.unwrap();

        let config = config_for("f", mappings.to_vec());
        let data = store.read_all(&config).await.unwrap();
        assert_eq!(data["f"]["a"], json!("1"));
        assert_eq!(data["f"]["b"], json!(["3", "4", "5"]));
    }

    #[tokio::test]
    async fn window_holds_across_multiple_applies() {
        let store = MemoryStore::new();
        let mappings = [mapping("b", true, Some(4))];

        for chunk in [[1, 2, 3], [4, 5, 6], [7, 8, 9]] {
            let items = chunk.iter().map(|n| json!(n)).collect();
            let results = vec![("b".to_string(), Extracted::List(items))];
            store.apply_results("f", &mappings, &results).await.unwrap();
        }

        let config = config_for("f", mappings.to_vec());
        let data = store.read_all(&config).await.unwrap();
        assert_eq!(data["f"]["b"], json!(["6", "7", "8", "9"]));
    }

    #[tokio::test]
    async fn list_without_window_keeps_the_last_batch() {
        let store = MemoryStore::new();
        let mappings = [mapping("b", true, None)];

        for chunk in [vec![1, 2, 3, 4], vec![5, 6]] {
            let items = chunk.iter().map(|n| json!(n)).collect();
            let results = vec![("b".to_string(), Extracted::List(items))];
            store.apply_results("f", &mappings, &results).await.unwrap();
        }

        let config = config_for("f", mappings.to_vec());
        let data = store.read_all(&config).await.unwrap();
        assert_eq!(data["f"]["b"], json!(["5", "6"]));
    }

    #[tokio::test]
    async fn empty_list_batch_is_a_no_op() {
        let store = MemoryStore::new();
        let mappings = [mapping("b", true, None), mapping("fresh", true, None)];

        let first = vec![(
            "b".to_string(),
            Extracted::List(vec![json!(1), json!(2)]),
        )];
        store.apply_results("f", &mappings, &first).await.unwrap();

        // An empty batch leaves the stored list alone and never creates an
        // entry for a mapping that has nothing to append.
        let empty = vec![
            ("b".to_string(), Extracted::List(Vec::new())),
            ("fresh".to_string(), Extracted::List(Vec::new())),
        ];
        store.apply_results("f", &mappings, &empty).await.unwrap();

        let config = config_for("f", mappings.to_vec());
        let data = store.read_all(&config).await.unwrap();
        assert_eq!(data["f"]["b"], json!(["1", "2"]));
        assert!(!data["f"].contains_key("fresh"));
    }

    #[tokio::test]
    async fn subscriber_survives_broadcast_lag() {
        let store = MemoryStore::new();
        let mut messages = store.subscribe("updater").await.unwrap();

        // Flood well past the channel capacity before the bridge task gets
        // to run, then publish one more; the backlog is dropped but the
        // subscription must keep delivering.
        for i in 0..200 {
            store.publish("updater", &format!("m{i}")).await.unwrap();
        }
        store.publish("updater", "late").await.unwrap();

        let late = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(payload) = messages.recv().await {
                if payload == "late" {
                    return true;
                }
            }
            false
        })
        .await
        .expect("timed out waiting for the late message");
        assert!(late, "subscription ended before the late message arrived");
    }

    #[tokio::test]
    async fn shape_wins_over_declared_flag() {
        // Declared non-list, but the response produced an array: stored as a
        // list, trimmed to the batch length since no window is configured.
        let store = MemoryStore::new();
        let mappings = [mapping("vals", false, None)];
        let results = vec![(
            "vals".to_string(),
            Extracted::List(vec![json!(7), json!(8)]),
        )];

        store.apply_results("f", &mappings, &results).await.unwrap();

        let config = config_for("f", mappings.to_vec());
        let data = store.read_all(&config).await.unwrap();
        assert_eq!(data["f"]["vals"], json!(["7", "8"]));
    }

    #[tokio::test]
    async fn read_all_omits_never_written_mappings() {
        let store = MemoryStore::new();
        let mappings = [mapping("written", false, None), mapping("ghost", false, None)];
        let results = vec![("written".to_string(), Extracted::Scalar(json!("yes")))];

        store.apply_results("f", &mappings, &results).await.unwrap();

        let config = config_for("f", mappings.to_vec());
        let data = store.read_all(&config).await.unwrap();
        assert_eq!(data["f"].len(), 1);
        assert!(!data["f"].contains_key("ghost"));
    }

    #[tokio::test]
    async fn next_run_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get_next_run("f").await.unwrap(), None);

        let when = Utc::now() + chrono::Duration::hours(1);
        store.set_next_run("f", when).await.unwrap();
        assert_eq!(store.get_next_run("f").await.unwrap(), Some(when));
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let store = MemoryStore::new();
        let mut first = store.subscribe("updater").await.unwrap();
        let mut second = store.subscribe("updater").await.unwrap();

        store.publish("updater", "weather").await.unwrap();

        assert_eq!(first.recv().await.unwrap(), "weather");
        assert_eq!(second.recv().await.unwrap(), "weather");
    }

    #[tokio::test]
    async fn injected_write_failure_surfaces_as_store_error() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store
            .set_next_run("f", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::StoreError(_)));
    }
}
