//! Pending page views for Redis.
//!
//! Each article with views since the last flush owns a set of visitor
//! fingerprints. The set's cardinality is the number of views not yet
//! written to the database.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

pub const PAGE_VIEW_KEY_PREFIX: &str = "article_page_view";

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Builds the Redis key holding pending views for an article.
pub fn page_view_key(article_id: i64) -> String {
    format!("{}:{}", PAGE_VIEW_KEY_PREFIX, article_id)
}

/// A page view key that does not map back to exactly one article id.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("page view key {key:?} must have exactly two ':'-separated segments")]
    Segments { key: String },
    #[error("page view key {key:?} is outside the article_page_view namespace")]
    Prefix { key: String },
    #[error("page view key {key:?} does not end in a canonical non-negative article id")]
    Id { key: String },
}

/// Inverse of [`page_view_key`].
pub fn parse_page_view_key(key: &str) -> Result<i64, KeyParseError> {
    let mut segments = key.split(':');
    let (Some(prefix), Some(id), None) = (segments.next(), segments.next(), segments.next()) else {
        return Err(KeyParseError::Segments {
            key: key.to_string(),
        });
    };

    if prefix != PAGE_VIEW_KEY_PREFIX {
        return Err(KeyParseError::Prefix {
            key: key.to_string(),
        });
    }

    // `str::parse` tolerates a leading '+' and leading zeros; only the
    // canonical form produced by `page_view_key` maps back to an article.
    let canonical = id == "0" || !id.starts_with('0');
    if id.is_empty() || !canonical || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyParseError::Id {
            key: key.to_string(),
        });
    }

    id.parse::<i64>().map_err(|_| KeyParseError::Id {
        key: key.to_string(),
    })
}

/// Store for not-yet-flushed page views.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageViewStore: Send + Sync {
    /// Health check - verify Redis connectivity.
    async fn health_check(&self) -> Result<bool>;

    /// Add a visitor fingerprint to an article's pending set.
    async fn add_view(&self, article_id: i64, fingerprint: &str) -> Result<()>;

    /// Number of distinct pending visitors for an article.
    async fn pending_count(&self, article_id: i64) -> Result<u64>;

    /// All keys in the page view namespace.
    async fn pending_keys(&self) -> Result<Vec<String>>;

    /// Cardinality of the set stored at `key`.
    async fn key_cardinality(&self, key: &str) -> Result<u64>;

    /// Remove a pending set.
    async fn delete_key(&self, key: &str) -> Result<()>;
}

/// Redis implementation of PageViewStore.
#[derive(Clone)]
pub struct RedisPageViewStore {
    client: redis::Client,
}

impl RedisPageViewStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageViewStore for RedisPageViewStore {
    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }

    async fn add_view(&self, article_id: i64, fingerprint: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = conn.sadd(page_view_key(article_id), fingerprint).await?;
        Ok(())
    }

    async fn pending_count(&self, article_id: i64) -> Result<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.scard(page_view_key(article_id)).await?;
        Ok(count)
    }

    async fn pending_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{}:*", PAGE_VIEW_KEY_PREFIX);

        // SCAN may repeat keys across iterations.
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            for key in batch {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn key_cardinality(&self, key: &str) -> Result<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}
