// Local headless Chrome. Each handle owns a profile directory that lives as
// long as the handle, so cookies and cache carry across the renders it serves.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{require_http_url, BrowserLauncher, PageRenderer};
use crate::error::{CortexError, Result};

/// Max attempts per render for transient Chrome failures.
const CHROME_MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration for Chrome retries.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);

pub struct ChromeLauncher {
    binary: String,
    user_agent: Option<String>,
}

impl ChromeLauncher {
    pub fn new(binary: &str) -> Self {
        info!(binary, "ChromeLauncher initialized");
        Self {
            binary: binary.to_string(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageRenderer>> {
        let profile = tempfile::Builder::new()
            .prefix("cortex-chrome-")
            .tempdir()
            .map_err(|e| CortexError::Launch(format!("failed to create profile dir: {e}")))?;
        debug!(profile = %profile.path().display(), "chrome: new session");
        Ok(Box::new(ChromeSession {
            binary: self.binary.clone(),
            user_agent: self.user_agent.clone(),
            profile,
        }))
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

struct ChromeSession {
    binary: String,
    user_agent: Option<String>,
    profile: TempDir,
}

impl ChromeSession {
    fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--headless".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--blink-settings=imagesEnabled=false".to_string(),
            format!("--user-data-dir={}", self.profile.path().display()),
        ];
        if let Some(ua) = &self.user_agent {
            args.push(format!("--user-agent={ua}"));
        }
        args.push("--dump-dom".to_string());
        args.push(url.to_string());
        args
    }

    async fn run(&self, url: &str, timeout: Duration) -> Result<std::io::Result<Output>> {
        let child = tokio::process::Command::new(&self.binary)
            .args(self.args(url))
            .kill_on_drop(true)
            .output();
        tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| CortexError::RenderTimeout(timeout))
    }
}

#[async_trait]
impl PageRenderer for ChromeSession {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String> {
        require_http_url(url)?;

        let mut attempt = 0;
        loop {
            let last_attempt = attempt + 1 >= CHROME_MAX_ATTEMPTS;

            match self.run(url, timeout).await? {
                Ok(output) if output.status.success() => {
                    if output.stdout.is_empty() && !last_attempt {
                        warn!(url, attempt = attempt + 1, "Chrome returned empty DOM, retrying");
                        backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if is_transient_error(&stderr) && !last_attempt {
                        warn!(url, attempt = attempt + 1, "Chrome hit a transient error, retrying");
                        backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    let message = stderr
                        .lines()
                        .rev()
                        .find(|l| !l.trim().is_empty())
                        .unwrap_or("chrome exited with an error")
                        .to_string();
                    return Err(CortexError::Render {
                        url: url.to_string(),
                        message,
                    });
                }
                Err(e) => {
                    if is_transient_error(&e.to_string()) && !last_attempt {
                        warn!(url, attempt = attempt + 1, error = %e, "Chrome launch failed, retrying");
                        backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(CortexError::Launch(format!("{}: {e}", self.binary)));
                }
            }
        }
    }
}

fn is_transient_error(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}

async fn backoff(attempt: u32) {
    let base = CHROME_RETRY_BASE * 3u32.pow(attempt);
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    tokio::time::sleep(base + jitter).await;
}
