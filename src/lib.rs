pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod schedule;
pub mod server;
pub mod store;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::FeedError;
pub use extract::Extracted;
pub use fetch::Fetcher;
pub use store::{MemoryStore, RedisStore, Store};
