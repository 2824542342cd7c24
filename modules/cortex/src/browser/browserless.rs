// Remote rendering through a Browserless instance. Handles share one HTTP
// client; the pool still bounds how many renders are in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, ContentOptions};
use tracing::{debug, info};

use super::{require_http_url, BrowserLauncher, PageRenderer};
use crate::error::Result;

/// Slack added on top of the navigation timeout for the HTTP exchange itself.
const REQUEST_SLACK: Duration = Duration::from_secs(15);

pub struct BrowserlessLauncher {
    client: Arc<BrowserlessClient>,
    options: ContentOptions,
}

impl BrowserlessLauncher {
    pub fn new(base_url: &str, token: Option<&str>, page_timeout: Duration) -> Result<Self> {
        let request_timeout = page_timeout.saturating_add(REQUEST_SLACK);
        let client = BrowserlessClient::new(base_url, token, request_timeout)?;
        info!(base_url, "BrowserlessLauncher initialized");
        Ok(Self {
            client: Arc::new(client),
            options: ContentOptions {
                goto_timeout: page_timeout,
                ..ContentOptions::default()
            },
        })
    }

    pub fn with_options(mut self, options: ContentOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl BrowserLauncher for BrowserlessLauncher {
    async fn launch(&self) -> Result<Box<dyn PageRenderer>> {
        debug!(base_url = self.client.base_url(), "browserless: new session");
        Ok(Box::new(BrowserlessSession {
            client: Arc::clone(&self.client),
            options: self.options.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "browserless"
    }
}

struct BrowserlessSession {
    client: Arc<BrowserlessClient>,
    options: ContentOptions,
}

#[async_trait]
impl PageRenderer for BrowserlessSession {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String> {
        require_http_url(url)?;
        let options = ContentOptions {
            goto_timeout: timeout,
            ..self.options.clone()
        };
        Ok(self.client.content(url, &options).await?)
    }
}
