//! Token pair lifecycle: signup, login, logout, refresh, and per-request
//! authentication.
//!
//! Tokens are stateless; revocation is done by writing the raw token string
//! into the blacklist store for however long the token has left to live.

use std::sync::Arc;

use crate::config::Config;
use crate::models::{NewUser, User};
use crate::repos::UserRepo;
use crate::services::password::{hash_password, verify_password};
use crate::services::token::{TokenError, TokenService};
use crate::stores::{BlacklistStore, TokenKind};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Unknown username or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("username already exists")]
    UsernameTaken,
    /// Forged, malformed, revoked, or mismatched tokens.
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    /// Store, database or signing failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => SessionError::TokenExpired,
            TokenError::Invalid(_) => SessionError::TokenInvalid,
            TokenError::Signing(msg) => SessionError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Token lifetimes and the refresh rotation threshold.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub issuer: String,
    pub access_ttl_hours: i64,
    pub refresh_ttl_hours: i64,
    /// Refresh tokens with this many seconds or fewer left are rotated.
    pub renewal_threshold_secs: u64,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            issuer: config.jwt_issuer.clone(),
            access_ttl_hours: config.access_token_ttl_hours,
            refresh_ttl_hours: config.refresh_token_ttl_hours,
            renewal_threshold_secs: config.refresh_renewal_secs,
        }
    }
}

/// Tokens handed back to the client. `refresh_token` is `None` when a refresh
/// did not rotate the refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

pub struct SessionService {
    users: Arc<dyn UserRepo>,
    blacklist: Arc<dyn BlacklistStore>,
    tokens: Arc<TokenService>,
    config: SessionConfig,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        blacklist: Arc<dyn BlacklistStore>,
        tokens: Arc<TokenService>,
        config: SessionConfig,
    ) -> Self {
        Self {
            users,
            blacklist,
            tokens,
            config,
        }
    }

    /// Create an account with an Argon2-hashed password.
    pub async fn signup(
        &self,
        username: &str,
        nickname: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<User, SessionError> {
        if self.users.find_by_username(username).await?.is_some() {
            return Err(SessionError::UsernameTaken);
        }

        let password_hash = hash_password(password)
            .map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?;

        let new_user = NewUser {
            username: username.to_string(),
            nickname: nickname.to_string(),
            password_hash,
            email: email.map(str::to_string),
        };

        // A concurrent signup can still win the insert race.
        let user = self
            .users
            .create(&new_user)
            .await?
            .ok_or(SessionError::UsernameTaken)?;

        tracing::info!(user_id = user.id, username = %user.username, "user signed up");
        Ok(user)
    }

    /// Verify credentials and issue an access/refresh pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedTokens, SessionError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            tracing::warn!(username, "login failed: unknown user");
            return Err(SessionError::InvalidCredentials);
        };

        let matches = verify_password(password, &user.password_hash)
            .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;
        if !matches {
            tracing::warn!(user_id = user.id, "login failed: wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        let access_token = self.issue_access(user.id)?;
        let refresh_token = self.issue_refresh(user.id)?;

        tracing::info!(user_id = user.id, "user logged in");
        Ok(IssuedTokens {
            access_token,
            refresh_token: Some(refresh_token),
        })
    }

    /// Revoke both tokens of a pair for whatever lifetime each has left.
    ///
    /// Already-expired tokens are skipped. Nothing is written unless both
    /// tokens are genuine and belong to the same user. Repeating a logout
    /// rewrites the same entries with the same or shorter TTLs.
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), SessionError> {
        let (access_user, access_ttl) = self.inspect(access_token)?;
        let (refresh_user, refresh_ttl) = self.inspect(refresh_token)?;

        if access_user != refresh_user {
            tracing::warn!(access_user, refresh_user, "logout with tokens from different users");
            return Err(SessionError::TokenInvalid);
        }

        if let Some(ttl) = access_ttl {
            self.blacklist
                .revoke(TokenKind::Access, access_token, access_user, ttl)
                .await?;
        }
        if let Some(ttl) = refresh_ttl {
            self.blacklist
                .revoke(TokenKind::Refresh, refresh_token, refresh_user, ttl)
                .await?;
        }

        tracing::info!(user_id = access_user, "user logged out");
        Ok(())
    }

    /// Issue a new access token from a live refresh token.
    ///
    /// The refresh token itself is rotated (old one revoked, new one issued)
    /// only when it has `renewal_threshold_secs` or less left.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, SessionError> {
        let claims = self.tokens.parse(refresh_token)?;

        if self.blacklist.is_revoked(refresh_token).await? {
            tracing::warn!(user_id = claims.user_id, "refresh with revoked refresh token");
            return Err(SessionError::TokenInvalid);
        }

        let access_token = self.issue_access(claims.user_id)?;

        let remaining = self.tokens.remaining_secs(&claims);
        let refresh_token = if remaining <= self.config.renewal_threshold_secs {
            // Still accepted during its final second, when `remaining` is 0.
            self.blacklist
                .revoke(TokenKind::Refresh, refresh_token, claims.user_id, remaining.max(1))
                .await?;
            tracing::info!(user_id = claims.user_id, remaining, "rotating refresh token");
            Some(self.issue_refresh(claims.user_id)?)
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Resolve a bearer token to its user id, rejecting revoked tokens.
    pub async fn authenticate(&self, token: &str) -> Result<i64, SessionError> {
        let claims = self.tokens.parse(token)?;
        if self.blacklist.is_revoked(token).await? {
            return Err(SessionError::TokenInvalid);
        }
        Ok(claims.user_id)
    }

    /// Owner of a genuine token and how long to blacklist it for, `None`
    /// once it has expired.
    ///
    /// A token is accepted through its expiry second, so a live token is
    /// blacklisted for at least one second.
    fn inspect(&self, token: &str) -> Result<(i64, Option<u64>), SessionError> {
        let user_id = self.tokens.subject_id(token).map_err(|e| {
            tracing::warn!(error = %e, "unreadable token presented");
            SessionError::TokenInvalid
        })?;

        let ttl = match self.tokens.parse(token) {
            Ok(_) => {
                let remaining = self
                    .tokens
                    .remaining_ttl(token)
                    .map_err(|_| SessionError::TokenInvalid)?;
                Some(remaining.max(1))
            }
            Err(TokenError::Expired) => None,
            Err(_) => return Err(SessionError::TokenInvalid),
        };

        Ok((user_id, ttl))
    }

    fn issue_access(&self, user_id: i64) -> Result<String, SessionError> {
        Ok(self
            .tokens
            .issue(&self.config.issuer, user_id, self.config.access_ttl_hours)?)
    }

    fn issue_refresh(&self, user_id: i64) -> Result<String, SessionError> {
        Ok(self
            .tokens
            .issue(&self.config.issuer, user_id, self.config.refresh_ttl_hours)?)
    }
}
