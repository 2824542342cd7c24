use sentineliq_store::StoreError;

/// Result type alias for WireScanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Response too large: {0} bytes")]
    TooLarge(usize),

    #[error("Failed to parse feed: {0}")]
    Parse(String),

    #[error("Feed has no entries")]
    Empty,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Worth another attempt within the same fetch: transport failures and 5xx.
    /// Every 4xx, 429 included, fails the fetch at once.
    pub fn is_transient(&self) -> bool {
        match self {
            ScanError::Network { .. } => true,
            ScanError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
