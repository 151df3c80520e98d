pub mod feed;
pub mod settings;

pub use feed::{FeedConfig, FeedQuery, FeedSchedule, StoreMapping};
pub use settings::Settings;

use crate::error::FeedError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

/// The full application configuration: ordered feed definitions plus
/// environment-derived runtime settings. Loaded once at startup and immutable
/// for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    pub feeds: Vec<FeedConfig>,
    pub settings: Settings,
}

#[derive(Deserialize)]
struct FeedsFile {
    #[serde(default)]
    feeds: Vec<FeedConfig>,
}

impl Config {
    /// Parses feed definitions from YAML and validates name uniqueness.
    pub fn from_yaml(raw: &str, settings: Settings) -> Result<Self, FeedError> {
        let file: FeedsFile = serde_yaml::from_str(raw)?;
        let config = Config {
            feeds: file.feeds,
            settings,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), FeedError> {
        let mut feed_names = HashSet::new();
        for feed in &self.feeds {
            if !feed_names.insert(feed.name.as_str()) {
                return Err(FeedError::ConfigError(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }

            let mut mapping_names = HashSet::new();
            for mapping in &feed.store {
                if !mapping_names.insert(mapping.name.as_str()) {
                    return Err(FeedError::ConfigError(format!(
                        "duplicate mapping name '{}' in feed '{}'",
                        mapping.name, feed.name
                    )));
                }
            }

            // Surface malformed intervals and URLs at load time instead of
            // on the first update cycle.
            feed.schedule.every_interval()?;
            url::Url::parse(&feed.query.url).map_err(|e| {
                FeedError::ConfigError(format!(
                    "invalid url '{}' in feed '{}': {}",
                    feed.query.url, feed.name, e
                ))
            })?;
        }
        Ok(())
    }

    pub fn feed_by_name(&self, name: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.name == name)
    }
}

/// Loads `.env`, environment settings, and the YAML feed file.
pub fn load_config() -> Result<Arc<Config>, FeedError> {
    dotenv::dotenv().ok();

    let settings = Settings::from_env();
    let raw = fs::read_to_string(&settings.feeds_file).map_err(|e| {
        FeedError::ConfigError(format!(
            "unable to read feeds file '{}': {}",
            settings.feeds_file, e
        ))
    })?;

    Ok(Arc::new(Config::from_yaml(&raw, settings)?))
}
