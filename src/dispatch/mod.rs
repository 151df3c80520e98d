//! Drives the check → fetch → store → reschedule pipeline over time, either
//! through the synchronous scan loop or through the decoupled checker/updater
//! pub-sub loops.

use crate::config::{Config, FeedConfig};
use crate::error::FeedError;
use crate::extract::extract_many;
use crate::fetch::Fetcher;
use crate::schedule;
use crate::store::Store;
use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};

/// Channel carrying feed names to due-check (fed by cron or the CLI).
pub const SCHEDULER_CHANNEL: &str = "scheduler";
/// Channel carrying feed names that are due for an update.
pub const UPDATER_CHANNEL: &str = "updater";

pub struct Dispatcher {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    fetcher: Fetcher,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            fetcher: Fetcher::new(),
        }
    }

    fn resolve(&self, name: &str) -> Result<&FeedConfig, FeedError> {
        self.config
            .feed_by_name(name)
            .ok_or_else(|| FeedError::FeedNotFound(name.to_string()))
    }

    /// Forces one fetch → extract → store → reschedule cycle for a feed,
    /// bypassing the due-check.
    pub async fn update_feed(&self, name: &str) -> Result<(), FeedError> {
        let feed = self.resolve(name)?;
        self.run_cycle(feed).await
    }

    /// Due-checks a feed and updates it inline when due. Returns `Ok` for an
    /// up-to-date feed; unknown names surface as `FeedNotFound`.
    pub async fn check_feed(&self, name: &str) -> Result<(), FeedError> {
        let feed = self.resolve(name)?;
        info!("checking feed: {}", feed.name);

        if !schedule::is_due(feed, self.store.as_ref()).await {
            info!("feed up to date: {}", feed.name);
            return Ok(());
        }

        self.run_cycle(feed).await
    }

    /// Due-checks every feed in declaration order; one feed's failure never
    /// aborts the scan.
    pub async fn check_all(&self) {
        info!("checking all feeds");
        for feed in &self.config.feeds {
            if let Err(e) = self.check_feed(&feed.name).await {
                error!("unable to check feed '{}': {}", feed.name, e);
            }
        }
    }

    async fn run_cycle(&self, feed: &FeedConfig) -> Result<(), FeedError> {
        info!("updating feed: {}", feed.name);

        let body = self.fetcher.fetch(&feed.query).await?;
        let results = extract_many(&body, &feed.store)?;
        self.store
            .apply_results(&feed.name, &feed.store, &results)
            .await?;

        // The next-run record only advances after the values landed; a failed
        // cycle leaves the feed due again, which is the retry mechanism.
        if let Some(every) = feed.schedule.every_interval()? {
            let every = ChronoDuration::from_std(every)
                .map_err(|e| FeedError::ConfigError(e.to_string()))?;
            self.store.set_next_run(&feed.name, Utc::now() + every).await?;
        }

        info!("feed updated: {}", feed.name);
        Ok(())
    }

    /// Synchronous topology: scan every feed once at startup and again on a
    /// fixed wall-clock tick, processing feeds strictly one at a time. A
    /// scan that overruns its tick skips the missed fire rather than
    /// bursting to catch up.
    pub async fn run_scan_loop(&self) {
        let mut ticker = interval(self.config.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and doubles as the startup
        // scan.
        loop {
            ticker.tick().await;
            self.check_all().await;
        }
    }

    /// Checker stage of the decoupled topology: receives feed names from the
    /// scheduler channel and enqueues the due ones for the updater stage.
    /// Never fetches or stores anything itself. Terminates permanently when
    /// the subscription read fails.
    pub async fn run_checker_loop(&self) -> Result<(), FeedError> {
        let mut messages = self.store.subscribe(SCHEDULER_CHANNEL).await?;
        info!("checker listening on '{}'", SCHEDULER_CHANNEL);

        while let Some(name) = messages.recv().await {
            if let Err(e) = self.check_and_enqueue(&name).await {
                error!("unable to check feed '{}': {}", name, e);
            }
        }

        Err(FeedError::ChannelClosed(SCHEDULER_CHANNEL.to_string()))
    }

    async fn check_and_enqueue(&self, name: &str) -> Result<(), FeedError> {
        let feed = self.resolve(name)?;
        info!("checking feed: {}", feed.name);

        if !schedule::is_due(feed, self.store.as_ref()).await {
            info!("feed up to date: {}", feed.name);
            return Ok(());
        }

        info!("feed scheduled for update: {}", feed.name);
        self.store.publish(UPDATER_CHANNEL, &feed.name).await
    }

    /// Updater stage of the decoupled topology: runs the full update cycle
    /// for every feed name received on the updater channel. Delivery is
    /// broadcast, so only one live updater listener per channel is safe.
    /// Terminates permanently when the subscription read fails.
    pub async fn run_updater_loop(&self) -> Result<(), FeedError> {
        let mut messages = self.store.subscribe(UPDATER_CHANNEL).await?;
        info!("updater listening on '{}'", UPDATER_CHANNEL);

        while let Some(name) = messages.recv().await {
            if let Err(e) = self.update_feed(&name).await {
                error!("unable to update feed '{}': {}", name, e);
            }
        }

        Err(FeedError::ChannelClosed(UPDATER_CHANNEL.to_string()))
    }
}
