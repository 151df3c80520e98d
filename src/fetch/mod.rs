//! Builds and issues one HTTP request per feed from its declarative query.

use crate::config::FeedQuery;
use crate::error::FeedError;
use log::debug;
use reqwest::Method;
use std::env;

/// Resolves `env:NAME` indirections in header and param values.
///
/// Resolution happens at request time, so a later environment change is
/// observed on the next fetch. A missing variable resolves to an empty string.
pub fn string_or_env(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(name) => env::var(name).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Issues feed queries over a shared reqwest client.
///
/// No explicit timeout is applied; callers may wrap `fetch` with one.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetches the query and returns the raw body bytes.
    ///
    /// Fails with `StatusMismatch` if the response status differs from the
    /// declared one, and with `InvalidBody` if the body is not valid JSON;
    /// in both cases no values are updated downstream.
    pub async fn fetch(&self, query: &FeedQuery) -> Result<Vec<u8>, FeedError> {
        let method = Method::from_bytes(query.method.as_bytes())
            .map_err(|_| FeedError::ConfigError(format!("invalid method '{}'", query.method)))?;

        let mut request = self.client.request(method, &query.url);

        let params: Vec<(String, String)> = query
            .params
            .iter()
            .map(|(k, v)| (k.clone(), string_or_env(v)))
            .collect();
        if !params.is_empty() {
            request = request.query(&params);
        }

        for (name, value) in &query.headers {
            request = request.header(name.as_str(), string_or_env(value));
        }

        if !query.body.is_empty() {
            request = request.body(query.body.clone());
        }

        debug!("fetching {} {}", query.method, query.url);
        let response = request.send().await?;

        let status = response.status().as_u16();
        if status != query.status {
            return Err(FeedError::StatusMismatch {
                expected: query.status,
                actual: status,
            });
        }

        let body = response.bytes().await?.to_vec();
        serde_json::from_slice::<serde::de::IgnoredAny>(&body)
            .map_err(|e| FeedError::InvalidBody(e.to_string()))?;

        Ok(body)
    }
}
