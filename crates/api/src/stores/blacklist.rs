//! Revoked-token storage for Redis.
//!
//! Tokens are otherwise stateless, so an entry here is the only way to make a
//! still-valid token unusable. Entries expire when the token would have.

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

pub const ACCESS_TOKEN_BLACKLIST_PREFIX: &str = "access_token_blacklist:";
pub const REFRESH_TOKEN_BLACKLIST_PREFIX: &str = "refresh_token_blacklist:";

/// Which namespace a revoked token is written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn key(self, token: &str) -> String {
        match self {
            TokenKind::Access => format!("{}{}", ACCESS_TOKEN_BLACKLIST_PREFIX, token),
            TokenKind::Refresh => format!("{}{}", REFRESH_TOKEN_BLACKLIST_PREFIX, token),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlacklistStore: Send + Sync {
    /// Revoke `token` for `ttl_secs` seconds, recording its owner.
    async fn revoke(&self, kind: TokenKind, token: &str, user_id: i64, ttl_secs: u64)
    -> Result<()>;

    /// Whether `token` is revoked under either namespace.
    async fn is_revoked(&self, token: &str) -> Result<bool>;
}

/// Redis implementation of BlacklistStore.
#[derive(Clone)]
pub struct RedisBlacklistStore {
    client: redis::Client,
}

impl RedisBlacklistStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlacklistStore for RedisBlacklistStore {
    async fn revoke(
        &self,
        kind: TokenKind,
        token: &str,
        user_id: i64,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(kind.key(token), user_id, ttl_secs).await?;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys = vec![TokenKind::Access.key(token), TokenKind::Refresh.key(token)];
        let count: i64 = conn.exists(keys).await?;
        Ok(count > 0)
    }
}
