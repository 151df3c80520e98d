//! Redis-backed value store. Uses a `ConnectionManager` for automatic
//! reconnection; batched writes go through a single pipeline per cycle.

use crate::config::{Config, StoreMapping};
use crate::error::FeedError;
use crate::extract::Extracted;
use crate::store::{
    scalar_repr, schedule_key, trim_window, value_key, Store, ValueMap, TIME_FORMAT,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use log::{info, warn};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub struct RedisStore {
    conn: ConnectionManager,
    // Kept for pub/sub: subscriptions need a dedicated connection.
    client: redis::Client,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self, FeedError> {
        info!("connecting to redis at {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { conn, client })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_next_run(&self, feed: &str) -> Result<Option<DateTime<Utc>>, FeedError> {
        let mut conn = self.conn.clone();
        let stored: Option<String> = conn.get(schedule_key(feed)).await?;
        match stored {
            None => Ok(None),
            Some(text) => {
                let parsed = NaiveDateTime::parse_from_str(&text, TIME_FORMAT)
                    .map_err(|e| FeedError::StoreError(format!("bad next-run '{text}': {e}")))?;
                Ok(Some(parsed.and_utc()))
            }
        }
    }

    async fn set_next_run(&self, feed: &str, when: DateTime<Utc>) -> Result<(), FeedError> {
        let mut conn = self.conn.clone();
        let text = when.format(TIME_FORMAT).to_string();
        conn.set::<_, _, ()>(schedule_key(feed), text).await?;
        Ok(())
    }

    async fn apply_results(
        &self,
        feed: &str,
        mappings: &[StoreMapping],
        results: &[(String, Extracted)],
    ) -> Result<(), FeedError> {
        let mut pipe = redis::pipe();

        for (name, extracted) in results {
            let key = value_key(feed, name);
            match extracted {
                Extracted::List(items) => {
                    if items.is_empty() {
                        continue;
                    }
                    for item in items {
                        pipe.rpush(&key, scalar_repr(item)).ignore();
                    }
                    let window = trim_window(mappings, name, items.len());
                    if window > 0 {
                        pipe.ltrim(&key, -(window as isize), -1).ignore();
                    }
                }
                Extracted::Scalar(value) => {
                    pipe.set(&key, scalar_repr(value)).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn read_all(&self, config: &Config) -> Result<ValueMap, FeedError> {
        let mut pipe = redis::pipe();
        let mut slots = Vec::new();

        for feed in &config.feeds {
            for mapping in &feed.store {
                let key = value_key(&feed.name, &mapping.name);
                let as_list = mapping.is_list || mapping.window_size.is_some();
                if as_list {
                    pipe.lrange(&key, 0, -1);
                } else {
                    pipe.get(&key);
                }
                slots.push((feed.name.clone(), mapping.name.clone(), as_list));
            }
        }

        let mut data: ValueMap = HashMap::new();
        if slots.is_empty() {
            return Ok(data);
        }

        let mut conn = self.conn.clone();
        let raw: redis::Value = pipe.query_async(&mut conn).await?;
        let redis::Value::Bulk(items) = raw else {
            return Err(FeedError::StoreError(
                "unexpected pipeline response shape".to_string(),
            ));
        };

        for ((feed_name, mapping_name, as_list), item) in slots.into_iter().zip(items) {
            let entry = data.entry(feed_name).or_default();
            if as_list {
                let values: Vec<String> = redis::from_redis_value(&item)?;
                if !values.is_empty() {
                    entry.insert(
                        mapping_name,
                        Value::Array(values.into_iter().map(Value::String).collect()),
                    );
                }
            } else {
                let value: Option<String> = redis::from_redis_value(&item)?;
                if let Some(text) = value {
                    entry.insert(mapping_name, Value::String(text));
                }
            }
        }

        // Feeds with nothing written yet should not appear at all.
        data.retain(|_, mappings| !mappings.is_empty());
        Ok(data)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), FeedError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, FeedError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let channel_name = channel.to_string();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            // The stream ends when the pubsub connection drops; the closed
            // sender then signals terminal failure to the listener loop.
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("bad payload on channel '{}': {}", channel_name, e);
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
