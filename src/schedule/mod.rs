//! Decides whether a feed is eligible to be fetched again.

use crate::config::FeedConfig;
use crate::store::Store;
use chrono::Utc;
use log::debug;

/// Pure read against the store, no side effects.
///
/// Fail-open: a missing next-run record or a failed read makes the feed due —
/// an extra fetch is preferred over silent staleness. A feed without an
/// `every` interval whose record exists is never automatically due.
pub async fn is_due(feed: &FeedConfig, store: &dyn Store) -> bool {
    let next_run = match store.get_next_run(&feed.name).await {
        Ok(Some(next_run)) => next_run,
        Ok(None) => return true,
        Err(e) => {
            debug!("unable to get next run for '{}': {}", feed.name, e);
            return true;
        }
    };

    if feed.schedule.every.is_some() {
        Utc::now() >= next_run
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeedSchedule, StoreMapping};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn feed(name: &str, every: Option<&str>) -> FeedConfig {
        FeedConfig {
            name: name.to_string(),
            query: serde_yaml::from_str("url: http://localhost").unwrap(),
            schedule: FeedSchedule {
                every: every.map(str::to_string),
            },
            store: Vec::<StoreMapping>::new(),
        }
    }

    #[tokio::test]
    async fn missing_record_is_due() {
        let store = MemoryStore::new();
        assert!(is_due(&feed("weather", Some("1h")), &store).await);
    }

    #[tokio::test]
    async fn due_flips_at_the_stored_timestamp() {
        let store = MemoryStore::new();
        let scheduled = feed("weather", Some("1h"));

        store
            .set_next_run("weather", Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert!(!is_due(&scheduled, &store).await);

        store
            .set_next_run("weather", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(is_due(&scheduled, &store).await);
    }

    #[tokio::test]
    async fn feed_without_interval_is_never_due() {
        let store = MemoryStore::new();
        let unscheduled = feed("manual", None);

        store
            .set_next_run("manual", Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert!(!is_due(&unscheduled, &store).await);
    }
}
