//! Signed, time-limited tokens.
//!
//! Access and refresh tokens share one format (compact HS256 JWT) and differ
//! only in the lifetime chosen at issuance. Expiry is judged against the
//! injected [`Clock`] rather than the system clock, and is reported as
//! [`TokenError::Expired`] only once the signature has been verified.

use std::sync::Arc;

use chrono::TimeDelta;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

/// Signed token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub user_id: i64,
    pub iss: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expires-at, unix seconds.
    pub exp: i64,
    /// Unique per token, so two tokens minted in the same second differ.
    pub jti: Uuid,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// Signature is valid but the token is past its expiry.
    #[error("token expired")]
    Expired,
    /// Bad signature, malformed structure or missing claims.
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            clock,
        }
    }

    /// Sign a token for `user_id` valid for `ttl_hours` from now.
    pub fn issue(&self, issuer: &str, user_id: i64, ttl_hours: i64) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            user_id,
            iss: issuer.to_string(),
            iat: now.timestamp(),
            exp: (now + TimeDelta::hours(ttl_hours)).timestamp(),
            jti: Uuid::new_v4(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, structure and expiry.
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.exp < self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// `Ok(true)` for a genuine but expired token; other failures propagate.
    pub fn is_expired(&self, token: &str) -> Result<bool, TokenError> {
        match self.parse(token) {
            Ok(_) => Ok(false),
            Err(TokenError::Expired) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Seconds until expiry, 0 once expired.
    pub fn remaining_ttl(&self, token: &str) -> Result<u64, TokenError> {
        let claims = self.verify(token)?;
        Ok(self.remaining_secs(&claims))
    }

    /// Subject of a genuine token, expired or not.
    pub fn subject_id(&self, token: &str) -> Result<i64, TokenError> {
        Ok(self.verify(token)?.user_id)
    }

    /// Seconds until `claims` expire, 0 once expired.
    pub fn remaining_secs(&self, claims: &Claims) -> u64 {
        let remaining = claims.exp - self.clock.now().timestamp();
        u64::try_from(remaining).unwrap_or(0)
    }

    /// Signature and structure only; expiry is left to the caller.
    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}
