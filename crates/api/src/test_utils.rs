//! Shared test utilities for service and handler tests.
//!
//! Provides common fixtures, a [`PausedClock`] that follows tokio's test
//! clock, and a flexible `TestStateBuilder` for constructing `AppState`
//! instances with only the mocks needed for each test.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::{TestStateBuilder, mock_user};
//!
//! let mut user_repo = MockUserRepo::new();
//! user_repo
//!     .expect_find_by_username()
//!     .returning(|_| Ok(Some(mock_user(1, "narcissus", "hunter2hunter2"))));
//!
//! let state = TestStateBuilder::new()
//!     .with_user_repo(user_repo)
//!     .build();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use crate::clock::Clock;
use crate::config::Config;
use crate::models::User;
use crate::repos::{MockArticleRepo, MockStatusRepo, MockUserRepo, Repos};
use crate::services::{SessionConfig, hash_password};
use crate::state::AppState;
use crate::stores::{MockBlacklistStore, MockPageViewStore, Stores};

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        database_url: "postgres://test".to_string(),
        redis_url: "redis://test".to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "jwt".to_string(),
        access_token_ttl_hours: 2,
        refresh_token_ttl_hours: 240,
        refresh_renewal_secs: 24 * 60 * 60,
        cookie_domain: "example.com".to_string(),
        flush_hour: 3,
        flush_max_attempts: 3,
        flush_retry_delay_ms: 1000,
        env: "test".to_string(),
        sentry_dsn: None,
    }
}

pub fn test_session_config() -> SessionConfig {
    SessionConfig::from(&test_config())
}

/// Wall clock pinned to a fixed origin that advances with tokio's clock.
///
/// Under `#[tokio::test(start_paused = true)]`, `tokio::time::advance` and
/// auto-advanced sleeps move this clock too.
pub struct PausedClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl PausedClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap())
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
        self.origin + elapsed
    }
}

/// Creates a user whose stored hash matches `password`.
pub fn mock_user(id: i64, username: &str, password: &str) -> User {
    User {
        id,
        username: username.to_string(),
        nickname: "Narcissus".to_string(),
        password_hash: hash_password(password).unwrap(),
        email: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Revoked token to the TTL it was last written with.
pub type RevokedTokens = Arc<Mutex<HashMap<String, u64>>>;

/// Blacklist mock backed by a map, so revocations are visible to later
/// lookups the way they are in Redis.
pub fn recording_blacklist() -> (MockBlacklistStore, RevokedTokens) {
    let revoked: RevokedTokens = Arc::default();
    let mut blacklist = MockBlacklistStore::new();

    let writer = revoked.clone();
    blacklist
        .expect_revoke()
        .returning(move |_, token, _, ttl_secs| {
            writer.lock().unwrap().insert(token.to_string(), ttl_secs);
            Ok(())
        });

    let reader = revoked.clone();
    blacklist
        .expect_is_revoked()
        .returning(move |token| Ok(reader.lock().unwrap().contains_key(token)));

    (blacklist, revoked)
}

/// Builder for constructing test `AppState` with custom mocks.
///
/// Uses default (empty) mocks for any repo/store not explicitly set. Tokens
/// are issued against a [`PausedClock`].
pub struct TestStateBuilder {
    user_repo: Option<MockUserRepo>,
    article_repo: Option<MockArticleRepo>,
    status_repo: Option<MockStatusRepo>,
    page_view_store: Option<MockPageViewStore>,
    blacklist_store: Option<MockBlacklistStore>,
}

impl TestStateBuilder {
    /// Creates a new builder with no mocks configured.
    pub fn new() -> Self {
        Self {
            user_repo: None,
            article_repo: None,
            status_repo: None,
            page_view_store: None,
            blacklist_store: None,
        }
    }

    pub fn with_user_repo(mut self, repo: MockUserRepo) -> Self {
        self.user_repo = Some(repo);
        self
    }

    pub fn with_article_repo(mut self, repo: MockArticleRepo) -> Self {
        self.article_repo = Some(repo);
        self
    }

    pub fn with_status_repo(mut self, repo: MockStatusRepo) -> Self {
        self.status_repo = Some(repo);
        self
    }

    pub fn with_page_view_store(mut self, store: MockPageViewStore) -> Self {
        self.page_view_store = Some(store);
        self
    }

    pub fn with_blacklist_store(mut self, store: MockBlacklistStore) -> Self {
        self.blacklist_store = Some(store);
        self
    }

    /// Builds the `AppState` using configured mocks or defaults.
    pub fn build(self) -> AppState {
        let repos = Repos {
            users: Arc::new(self.user_repo.unwrap_or_else(MockUserRepo::new)),
            articles: Arc::new(self.article_repo.unwrap_or_else(MockArticleRepo::new)),
            status: Arc::new(self.status_repo.unwrap_or_else(MockStatusRepo::new)),
        };

        let stores = Stores {
            page_views: Arc::new(
                self.page_view_store
                    .unwrap_or_else(MockPageViewStore::new),
            ),
            blacklist: Arc::new(
                self.blacklist_store
                    .unwrap_or_else(MockBlacklistStore::new),
            ),
        };

        AppState::new(
            test_config(),
            repos,
            stores,
            Arc::new(PausedClock::default()),
        )
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
