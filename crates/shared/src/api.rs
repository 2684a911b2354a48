//! Shared API request/response types used by the blog server and its clients.

use garde::Validate;
use serde::{Deserialize, Serialize};

/// Register a new account.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SignupPayload {
    /// Letters, digits and underscores, 5-20 characters.
    #[garde(pattern(r"^[a-zA-Z0-9_]{5,20}$"))]
    pub username: String,
    #[garde(length(chars, min = 1, max = 20))]
    pub nickname: String,
    #[garde(pattern(r"^[a-zA-Z0-9_!@#$%^&.*]{8,64}$"))]
    pub password: String,
    #[garde(length(max = 254))]
    #[serde(default)]
    pub email: Option<String>,
}

/// Exchange credentials for a token pair.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginPayload {
    #[garde(length(min = 5, max = 20))]
    pub username: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// An access/refresh token pair, used by logout and refresh.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenPairPayload {
    #[garde(length(min = 1))]
    pub access_token: String,
    #[garde(length(min = 1))]
    pub refresh_token: String,
}

/// Returned by login and refresh.
///
/// After a refresh, `refresh_token` is absent unless the old refresh token was
/// close enough to expiry to be rotated; clients keep using the old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPairResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Record one view of an article.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PageViewPayload {
    #[garde(range(min = 0))]
    pub article_id: i64,
}

/// Durable plus not-yet-flushed view count for an article.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleViewsResponse {
    pub article_id: i64,
    pub views: i64,
}
