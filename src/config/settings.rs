use crate::config::feed::parse_duration;
use std::env;
use std::time::Duration;

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub redis_url: String,
    pub address: String,
    pub port: u16,
    /// How often the synchronous scan loop re-checks every feed.
    pub tick: Duration,
    /// Path to the YAML feed definitions.
    pub feeds_file: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost".to_string()),
            address: env::var("ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            tick: env::var("TICK_DURATION")
                .ok()
                .and_then(|v| parse_duration(&v).ok())
                .unwrap_or(Duration::from_secs(15 * 60)),
            feeds_file: env::var("FEEDS_FILE").unwrap_or_else(|_| "feeds.yml".to_string()),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            redis_url: "redis://localhost".to_string(),
            address: "0.0.0.0".to_string(),
            port: 8080,
            tick: Duration::from_secs(15 * 60),
            feeds_file: "feeds.yml".to_string(),
        }
    }
}
