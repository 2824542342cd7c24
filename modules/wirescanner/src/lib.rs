pub mod cache;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod parser;
pub mod scanner;
pub mod store;
pub mod validate;

pub use cache::ExistenceCache;
pub use discovery::{discover_feed_urls, DiscoveredFeed};
pub use error::{Result, ScanError};
pub use fetcher::{FeedFetcher, HttpFeedFetcher};
pub use parser::{parse_feed, ParsedFeed, RawItem};
pub use scanner::{ScanSettings, ScanStats, Scanner};
pub use store::IngestStore;
pub use validate::{validate_item, ItemPolicy, ItemRejection};
