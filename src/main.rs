use anyhow::Context;
use clap::{Parser, Subcommand};
use dashfeed::config;
use dashfeed::dispatch::{Dispatcher, SCHEDULER_CHANNEL};
use dashfeed::server::{ApiServer, AppState};
use dashfeed::store::{RedisStore, Store};
use log::{error, info};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dashfeed", about = "Polls HTTP feeds and caches their values")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API plus the synchronous scan loop
    Serve,
    /// Run the decoupled checker/updater listener loops
    Worker,
    /// Run one fetch + store cycle for a single feed and exit
    Fetch { feed: String },
    /// Publish feed names onto the scheduler channel (all feeds by default),
    /// for driving the worker from cron
    Check { feed: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = config::load_config().context("reading config")?;
    let store: Arc<dyn Store> = Arc::new(
        RedisStore::new(&config.settings.redis_url)
            .await
            .context("connecting to redis")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), store.clone()));

    match cli.command {
        Command::Serve => {
            let scanner = dispatcher.clone();
            tokio::spawn(async move { scanner.run_scan_loop().await });

            let state = AppState {
                config: config.clone(),
                store,
                dispatcher,
            };
            ApiServer::new(config.settings.listen_addr(), state)
                .start()
                .await?;
        }
        Command::Worker => {
            let checker = dispatcher.clone();
            let checker = tokio::spawn(async move { checker.run_checker_loop().await });

            let updater = dispatcher.clone();
            let updater = tokio::spawn(async move { updater.run_updater_loop().await });

            // Each loop only returns once its subscription is gone; that is
            // terminal for this process, supervision restarts it.
            let (checker, updater) = tokio::join!(checker, updater);
            if let Ok(Err(e)) = checker {
                error!("checker loop stopped: {}", e);
            }
            if let Ok(Err(e)) = updater {
                error!("updater loop stopped: {}", e);
            }
            anyhow::bail!("worker loops terminated");
        }
        Command::Fetch { feed } => {
            dispatcher
                .update_feed(&feed)
                .await
                .with_context(|| format!("unable to update feed '{feed}'"))?;
        }
        Command::Check { feed } => {
            let names: Vec<&str> = match &feed {
                Some(name) => vec![name.as_str()],
                None => config.feeds.iter().map(|f| f.name.as_str()).collect(),
            };
            for name in names {
                info!("scheduling check for feed: {}", name);
                store.publish(SCHEDULER_CHANNEL, name).await?;
            }
        }
    }

    Ok(())
}
