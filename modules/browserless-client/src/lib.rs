pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// Render options forwarded to the `/content` endpoint.
#[derive(Debug, Clone)]
pub struct ContentOptions {
    /// Navigation timeout inside the remote browser.
    pub goto_timeout: Duration,
    /// Puppeteer lifecycle event to wait for (`load`, `domcontentloaded`, `networkidle2`, ...).
    pub wait_until: String,
    /// Resource types the remote browser should not download.
    pub reject_resource_types: Vec<String>,
    pub user_agent: Option<String>,
    /// Optional CSS selector to wait for before capturing the DOM.
    pub wait_for_selector: Option<String>,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            goto_timeout: Duration::from_secs(30),
            wait_until: "domcontentloaded".to_string(),
            reject_resource_types: vec![
                "image".to_string(),
                "media".to_string(),
                "font".to_string(),
                "stylesheet".to_string(),
            ],
            user_agent: None,
            wait_for_selector: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions<'a>,
    #[serde(skip_serializing_if = "is_empty")]
    reject_resource_types: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_selector: Option<WaitForSelector<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions<'a> {
    wait_until: &'a str,
    timeout: u64,
}

#[derive(Serialize)]
struct WaitForSelector<'a> {
    selector: &'a str,
    timeout: u64,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    /// `request_timeout` bounds the whole HTTP exchange and should exceed the
    /// navigation timeout passed in [`ContentOptions`].
    pub fn new(base_url: &str, token: Option<&str>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str, options: &ContentOptions) -> Result<String> {
        let body = request_body(url, options);
        debug!(url, endpoint = %self.base_url, "browserless: /content");

        let mut request = self
            .client
            .post(format!("{}/content", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref token) = self.token {
            request = request.query(&[("token", token)]);
        }

        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

fn is_empty(types: &&[String]) -> bool {
    types.is_empty()
}

fn request_body(url: &str, options: &ContentOptions) -> serde_json::Value {
    let goto_ms = options.goto_timeout.as_millis() as u64;
    let request = ContentRequest {
        url,
        goto_options: GotoOptions {
            wait_until: &options.wait_until,
            timeout: goto_ms,
        },
        reject_resource_types: &options.reject_resource_types,
        user_agent: options.user_agent.as_deref(),
        wait_for_selector: options
            .wait_for_selector
            .as_deref()
            .map(|selector| WaitForSelector {
                selector,
                timeout: goto_ms,
            }),
    };
    serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_body_blocks_heavy_resources() {
        let body = request_body("https://example.com/a", &ContentOptions::default());

        assert_eq!(body["url"], "https://example.com/a");
        assert_eq!(body["gotoOptions"]["waitUntil"], "domcontentloaded");
        assert_eq!(body["gotoOptions"]["timeout"], 30_000);
        assert_eq!(body["rejectResourceTypes"][0], "image");
        assert!(body.get("userAgent").is_none());
        assert!(body.get("waitForSelector").is_none());
    }

    #[test]
    fn optional_fields_are_serialized_when_set() {
        let options = ContentOptions {
            goto_timeout: Duration::from_secs(10),
            reject_resource_types: Vec::new(),
            user_agent: Some("harvest-bot/1.0".to_string()),
            wait_for_selector: Some("article".to_string()),
            ..ContentOptions::default()
        };
        let body = request_body("https://example.com/b", &options);

        assert_eq!(body["userAgent"], "harvest-bot/1.0");
        assert_eq!(body["waitForSelector"]["selector"], "article");
        assert_eq!(body["waitForSelector"]["timeout"], 10_000);
        assert!(body.get("rejectResourceTypes").is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client =
            BrowserlessClient::new("http://browserless:3000/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://browserless:3000");
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(BrowserlessError::Timeout.is_transient());
        assert!(BrowserlessError::Api { status: 503, message: String::new() }.is_transient());
        assert!(BrowserlessError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!BrowserlessError::Api { status: 400, message: String::new() }.is_transient());
    }
}
