pub mod bounded;
pub mod config;
pub mod error;
pub mod hash;
pub mod text;
pub mod types;

pub use bounded::BoundedSet;
pub use config::{BrowserBackend, Config};
pub use error::{HarvestError, Result};
pub use hash::{content_hash, content_hash_hex};
pub use text::{is_valid_http_url, normalize_url, strip_html, truncate_chars, word_count};
pub use types::*;
