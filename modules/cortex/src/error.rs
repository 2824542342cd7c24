use std::time::Duration;

use browserless_client::BrowserlessError;
use sentineliq_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CortexError>;

#[derive(Debug, Error)]
pub enum CortexError {
    #[error("Browser pool is closed")]
    PoolClosed,

    #[error("No browser became free within {0:?}")]
    PoolExhausted(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Render failed for {url}: {message}")]
    Render { url: String, message: String },

    #[error("Render timed out after {0:?}")]
    RenderTimeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Browserless: {0}")]
    Browserless(#[from] BrowserlessError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CortexError {
    /// Whether the browser that produced this error should be retired
    /// rather than handed back to the pool.
    pub fn poisons_browser(&self) -> bool {
        match self {
            CortexError::RenderTimeout(_) | CortexError::Launch(_) => true,
            CortexError::Browserless(e) => e.is_transient(),
            _ => false,
        }
    }
}
