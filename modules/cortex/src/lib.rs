pub mod browser;
pub mod dedup;
pub mod delay;
pub mod engine;
pub mod error;
pub mod extract;
pub mod memory;
pub mod pool;
mod readability;
pub mod store;
pub mod validate;

pub use browser::{launcher_from_config, BrowserLauncher, BrowserlessLauncher, ChromeLauncher, PageRenderer};
pub use dedup::{ContentDeduper, HashClaim};
pub use delay::AdaptiveDelay;
pub use engine::{ScrapeSettings, ScrapeStats, ScrapingEngine};
pub use error::{CortexError, Result};
pub use extract::{extract_article, ExtractedArticle};
pub use memory::MemoryGuard;
pub use pool::{BrowserPool, PoolStats, PooledBrowser};
pub use store::ScrapeStore;
pub use validate::{validate_content, ContentPolicy, ContentRejection};
