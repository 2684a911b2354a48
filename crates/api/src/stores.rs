//! Ephemeral stores (Redis).
//!
//! ## Stores
//!
//! - **page_views** - Per-article sets of visitor fingerprints awaiting flush
//! - **blacklist** - Revoked tokens, each expiring with the token itself
//!
//! ## Redis Key Patterns
//!
//! ```text
//! article_page_view:{article_id}        → Set of visitor fingerprints
//! access_token_blacklist:{raw_token}    → Owning user id (TTL = token lifetime left)
//! refresh_token_blacklist:{raw_token}   → Owning user id (TTL = token lifetime left)
//! ```

mod blacklist;
mod page_views;

pub use blacklist::{BlacklistStore, RedisBlacklistStore, TokenKind};
pub use page_views::{KeyParseError, PageViewStore, RedisPageViewStore, parse_page_view_key};

#[cfg(test)]
pub use blacklist::MockBlacklistStore;
#[cfg(test)]
pub use page_views::MockPageViewStore;

use std::sync::Arc;

/// Collection of all ephemeral stores.
#[derive(Clone)]
pub struct Stores {
    pub page_views: Arc<dyn PageViewStore>,
    pub blacklist: Arc<dyn BlacklistStore>,
}
