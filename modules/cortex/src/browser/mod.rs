// Rendering backends. A launcher produces renderer handles; the pool owns
// and reuses them.

mod browserless;
mod chrome;

pub use browserless::BrowserlessLauncher;
pub use chrome::ChromeLauncher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentineliq_common::{BrowserBackend, Config};

use crate::error::{CortexError, Result};

/// One live rendering session. Dropping it releases its resources.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to `url` and return the rendered DOM.
    async fn render(&self, url: &str, timeout: Duration) -> Result<String>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageRenderer>>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the launcher selected by configuration.
pub fn launcher_from_config(config: &Config) -> Result<Arc<dyn BrowserLauncher>> {
    match &config.browser_backend {
        BrowserBackend::Chrome { binary } => Ok(Arc::new(ChromeLauncher::new(binary))),
        BrowserBackend::Browserless { base_url, token } => {
            let base_url = base_url.as_deref().ok_or_else(|| {
                CortexError::Config(
                    "BROWSERLESS_URL environment variable is required for the browserless backend"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(BrowserlessLauncher::new(
                base_url,
                token.as_deref(),
                config.page_timeout,
            )?))
        }
    }
}

pub(crate) fn require_http_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|_| CortexError::InvalidUrl(url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CortexError::InvalidUrl(format!(
            "only http/https URLs allowed, got: {}",
            parsed.scheme()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        Config::from_lookup(|key| map.get(key).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn browserless_without_url_fails_only_when_a_launcher_is_built() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/harvest"),
            ("BROWSER_BACKEND", "browserless"),
        ]);
        let err = launcher_from_config(&config).err().unwrap();
        assert!(matches!(err, CortexError::Config(_)));
        assert!(err.to_string().contains("BROWSERLESS_URL"));
    }

    #[test]
    fn selects_the_configured_backend() {
        let chrome = config_from(&[("DATABASE_URL", "postgres://localhost/harvest")]);
        assert_eq!(launcher_from_config(&chrome).unwrap().name(), "chrome");

        let browserless = config_from(&[
            ("DATABASE_URL", "postgres://localhost/harvest"),
            ("BROWSER_BACKEND", "browserless"),
            ("BROWSERLESS_URL", "http://browserless:3000"),
        ]);
        assert_eq!(launcher_from_config(&browserless).unwrap().name(), "browserless");
    }

    #[test]
    fn oversized_page_timeout_does_not_overflow() {
        let mut config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/harvest"),
            ("BROWSER_BACKEND", "browserless"),
            ("BROWSERLESS_URL", "http://browserless:3000"),
        ]);
        config.page_timeout = Duration::MAX;
        assert!(launcher_from_config(&config).is_ok());
        assert_eq!(
            crate::ScrapeSettings::from_config(&config).acquire_timeout,
            Duration::MAX
        );
    }
}
