use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sentineliq_common::Config;
use sentineliq_harvest::{run_on_interval, Harvest};
use sentineliq_store::Store;

#[derive(Parser)]
#[command(name = "harvest", about = "SentinelIQ news harvester: feed scanning and article scraping")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Scan every active feed once
    Scan,
    /// Find and register the feeds a site advertises
    Discover {
        #[arg(required = true)]
        sites: Vec<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Validate and register a single feed
    AddFeed {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Scrape pending articles once
    Scrape {
        /// Stop after this many articles
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Scan then scrape, once or every --interval-secs until Ctrl-C
    Run {
        /// Overrides HARVEST_INTERVAL_SECS (0 = single pass)
        #[arg(long, value_parser = clap::value_parser!(u64).range(0..=604_800))]
        interval_secs: Option<u64>,
    },
    /// Show feed and article counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    match cli.command {
        Command::Migrate => {
            let store = Store::connect(&config.database_url, config.database_max_connections).await?;
            store.migrate().await?;
        }
        Command::Scan => {
            let harvest = Harvest::connect(&config).await?;
            let stats = harvest.scanner().run().await?;
            info!("Scan complete. {stats}");
        }
        Command::Discover { sites, category } => {
            let harvest = Harvest::connect(&config).await?;
            let mut registered = 0;
            for site in &sites {
                match harvest
                    .scanner()
                    .discover_and_register(site, category.as_deref())
                    .await
                {
                    Ok(feeds) if feeds.is_empty() => warn!(site = %site, "No feeds found"),
                    Ok(feeds) => {
                        for feed in &feeds {
                            info!(site = %site, feed_url = %feed.url, name = ?feed.name, "Feed registered");
                        }
                        registered += feeds.len();
                    }
                    Err(e) => warn!(site = %site, error = %e, "Discovery failed"),
                }
            }
            info!(sites = sites.len(), registered, "Discovery complete");
        }
        Command::AddFeed {
            url,
            name,
            category,
        } => {
            let harvest = Harvest::connect(&config).await?;
            let feed = harvest
                .scanner()
                .add_feed(&url, name.as_deref(), category.as_deref())
                .await
                .with_context(|| format!("Could not add feed {url}"))?;
            info!(id = %feed.id, feed_url = %feed.url, name = ?feed.name, "Feed added");
        }
        Command::Scrape { limit } => {
            let harvest = Harvest::connect(&config).await?.with_scraper(&config)?;
            let stats = harvest.engine()?.run_with_limit(limit).await;
            harvest.shutdown();
            info!("Scrape complete. {}", stats?);
        }
        Command::Run { interval_secs } => {
            let harvest = Harvest::connect(&config).await?.with_scraper(&config)?;
            let interval = interval_secs
                .map(Duration::from_secs)
                .or(config.harvest_interval)
                .filter(|d| !d.is_zero());

            match interval {
                None => {
                    let result = harvest.pass().await;
                    harvest.shutdown();
                    result?;
                }
                Some(every) => {
                    info!(interval_secs = every.as_secs(), "Harvest loop starting (Ctrl-C to stop)");
                    let shutdown = async {
                        if let Err(e) = tokio::signal::ctrl_c().await {
                            warn!(error = %e, "Failed to listen for Ctrl-C");
                            std::future::pending::<()>().await;
                        }
                    };
                    let passes = run_on_interval(every, shutdown, |_| async {
                        harvest.pass().await.map(|_| ())
                    })
                    .await;
                    harvest.shutdown();
                    info!(passes, "Harvest loop stopped");
                }
            }
        }
        Command::Status => {
            let store = Store::connect(&config.database_url, config.database_max_connections).await?;
            let feeds = store.feeds().active().await?;
            info!(active_feeds = feeds.len(), "Feeds");
            for (status, count) in store.articles().status_counts().await? {
                info!(%status, count, "Articles");
            }
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("harvest=info".parse()?)
        .add_directive("sentineliq_harvest=info".parse()?)
        .add_directive("wirescanner=info".parse()?)
        .add_directive("cortex=info".parse()?)
        .add_directive("sentineliq_store=info".parse()?);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
