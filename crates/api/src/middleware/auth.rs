//! Bearer token authentication.
//!
//! Usage: Add `AuthUser` as an extractor parameter to require authentication.
//! The user's id is taken from a valid, unrevoked access token.
//!
//! ```ignore
//! async fn my_handler(user: AuthUser, ...) -> ... {
//!     // user.id is available here
//! }
//! ```

use axum::{
    Json, RequestPartsExt,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::services::SessionError;
use crate::state::AppState;

/// Authenticated user extracted from a valid access token.
#[derive(Debug)]
pub struct AuthUser {
    pub id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingToken)?;

        match state.sessions.authenticate(bearer.token()).await {
            Ok(id) => Ok(AuthUser { id }),
            Err(SessionError::TokenExpired) => Err(AuthError::ExpiredToken),
            Err(SessionError::Internal(e)) => {
                tracing::error!("token verification error: {:?}", e);
                Err(AuthError::InvalidToken)
            }
            Err(_) => Err(AuthError::InvalidToken),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    ExpiredToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "Token expired"),
        };

        let body = serde_json::json!({ "error": message });

        (status, Json(body)).into_response()
    }
}
