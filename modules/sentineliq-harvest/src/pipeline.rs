// Wires the store, WireScanner and Cortex together from configuration.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cortex::{launcher_from_config, BrowserPool, ScrapeSettings, ScrapeStats, ScrapingEngine};
use sentineliq_common::Config;
use sentineliq_store::Store;
use tracing::info;
use wirescanner::{HttpFeedFetcher, ScanSettings, ScanStats, Scanner};

/// Stats for one scan-then-scrape pass.
#[derive(Debug, Clone)]
pub struct PassStats {
    pub scan: ScanStats,
    pub scrape: ScrapeStats,
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan: {}; scrape: {}", self.scan, self.scrape)
    }
}

/// Store plus WireScanner, and Cortex once [`with_scraper`](Self::with_scraper)
/// has been called. Feed-only commands never touch the browser backend.
pub struct Harvest {
    store: Store,
    scanner: Scanner,
    engine: Option<ScrapingEngine>,
}

impl Harvest {
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = Store::connect(&config.database_url, config.database_max_connections)
            .await
            .context("Failed to connect to Postgres")?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: &Config, store: Store) -> Result<Self> {
        let fetcher = HttpFeedFetcher::new(config.feed_timeout)?;
        let scanner = Scanner::new(
            Arc::new(store.clone()),
            Arc::new(fetcher),
            ScanSettings::from_config(config),
        );

        Ok(Self {
            store,
            scanner,
            engine: None,
        })
    }

    /// Build the browser pool and scraping engine.
    pub fn with_scraper(mut self, config: &Config) -> Result<Self> {
        let launcher = launcher_from_config(config).context("Failed to set up browser backend")?;
        let pool = BrowserPool::new(launcher, config.browser_pool_size, config.browser_max_pages);
        self.engine = Some(ScrapingEngine::new(
            Arc::new(self.store.clone()),
            pool,
            ScrapeSettings::from_config(config),
        ));
        Ok(self)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn engine(&self) -> Result<&ScrapingEngine> {
        self.engine
            .as_ref()
            .ok_or_else(|| anyhow!("Scraping is not set up for this command"))
    }

    /// One WireScanner pass followed by one Cortex pass.
    pub async fn pass(&self) -> Result<PassStats> {
        let engine = self.engine()?;
        let scan = self.scanner.run().await.context("Feed scan failed")?;
        let scrape = engine.run().await.context("Scrape failed")?;
        let stats = PassStats { scan, scrape };
        info!("Harvest pass complete. {stats}");
        Ok(stats)
    }

    /// Release browsers. Further scrapes fail.
    pub fn shutdown(&self) {
        if let Some(engine) = &self.engine {
            engine.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn browserless_without_url() -> Config {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://harvest@localhost:1/harvest"),
            ("BROWSER_BACKEND", "browserless"),
        ]
        .into_iter()
        .collect();
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
    }

    fn lazy_store(config: &Config) -> Store {
        Store::new(PgPoolOptions::new().connect_lazy(&config.database_url).unwrap())
    }

    #[tokio::test]
    async fn feed_commands_do_not_need_a_browser_backend() {
        let config = browserless_without_url();
        let harvest = Harvest::with_store(&config, lazy_store(&config)).unwrap();

        assert!(harvest.engine().is_err());
        harvest.shutdown();
    }

    #[tokio::test]
    async fn scraping_reports_a_missing_browser_backend() {
        let config = browserless_without_url();
        let harvest = Harvest::with_store(&config, lazy_store(&config)).unwrap();

        let err = harvest.with_scraper(&config).err().unwrap();
        assert!(format!("{err:#}").contains("BROWSERLESS_URL"));
    }

    #[tokio::test]
    async fn scraper_is_built_for_a_complete_config() {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://harvest@localhost:1/harvest".to_string()),
            _ => None,
        })
        .unwrap();
        let harvest = Harvest::with_store(&config, lazy_store(&config))
            .unwrap()
            .with_scraper(&config)
            .unwrap();

        assert_eq!(harvest.engine().unwrap().pool_stats().capacity, 3);
        harvest.shutdown();
        assert!(harvest.engine().unwrap().run().await.is_err());
    }
}
