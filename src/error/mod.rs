use thiserror::Error;

/// Error taxonomy for the feed pipeline.
///
/// Fetch errors abort the cycle for one feed before any store mutation; store
/// errors leave the feed due so it retries on the next scheduling cycle.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration errors (bad YAML, bad duration string, invalid method)
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// A feed name that does not exist in the loaded configuration
    #[error("feed not found: '{0}'")]
    FeedNotFound(String),

    /// Transport-level failures issuing the HTTP request
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Response status did not match the status declared on the query
    #[error("status code '{actual}' does not match expected '{expected}'")]
    StatusMismatch { expected: u16, actual: u16 },

    /// Response body was not syntactically valid JSON
    #[error("body is not a valid JSON: {0}")]
    InvalidBody(String),

    /// Value store (Redis) failures
    #[error("Store Error: {0}")]
    StoreError(String),

    /// A pub/sub subscription stopped delivering messages; the affected
    /// listener loop terminates permanently.
    #[error("subscription to channel '{0}' closed")]
    ChannelClosed(String),

    /// I/O errors at the process edge (listener bind, config file read)
    #[error("I/O Error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::NetworkError(err.to_string())
    }
}

impl From<redis::RedisError> for FeedError {
    fn from(err: redis::RedisError) -> Self {
        FeedError::StoreError(err.to_string())
    }
}

impl From<serde_yaml::Error> for FeedError {
    fn from(err: serde_yaml::Error) -> Self {
        FeedError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Io(err.to_string())
    }
}
