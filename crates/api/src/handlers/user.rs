//! Account and session endpoints.
//!
//! Endpoints:
//! - POST /user/signin - Create an account
//! - POST /user/login - Exchange credentials for an access/refresh pair
//! - POST /user/logout - Revoke the caller's token pair
//! - POST /user/token/refresh - Trade an expired access token for a new one
//!
//! Refresh is deliberately unauthenticated: its caller's access token has
//! already expired.

use axum::{
    Json, Router, debug_handler, extract::State, http::StatusCode, response::IntoResponse,
    routing::post,
};
use garde::Validate;
use shared::api::{LoginPayload, SignupPayload, TokenPairPayload, TokenPairResponse};

use crate::{
    error::AppError, middleware::AuthUser, services::IssuedTokens, state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signin", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/token/refresh", post(refresh_token))
}

impl From<IssuedTokens> for TokenPairResponse {
    fn from(issued: IssuedTokens) -> Self {
        Self {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        }
    }
}

#[debug_handler]
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = state
        .sessions
        .signup(
            &payload.username,
            &payload.nickname,
            &payload.password,
            payload.email.as_deref(),
        )
        .await
        .map_err(AppError::session)?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[debug_handler]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let issued = state
        .sessions
        .login(&payload.username, &payload.password)
        .await
        .map_err(AppError::session)?;

    Ok(Json(TokenPairResponse::from(issued)))
}

/// Revokes the pair in the body. The pair must belong to the bearer.
#[debug_handler]
async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<TokenPairPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let owner = state
        .tokens
        .subject_id(&payload.access_token)
        .map_err(|_| AppError::External(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    if owner != user.id {
        tracing::warn!(user_id = user.id, owner, "logout for another user's tokens");
        return Err(AppError::External(StatusCode::UNAUTHORIZED, "Invalid token"));
    }

    state
        .sessions
        .logout(&payload.access_token, &payload.refresh_token)
        .await
        .map_err(AppError::session)?;

    Ok(StatusCode::OK)
}

#[debug_handler]
async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenPairPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    match state.tokens.is_expired(&payload.access_token) {
        Ok(true) => {}
        Ok(false) => {
            return Err(AppError::External(
                StatusCode::BAD_REQUEST,
                "Access token has not expired",
            ));
        }
        Err(_) => return Err(AppError::External(StatusCode::UNAUTHORIZED, "Invalid token")),
    }

    let issued = state
        .sessions
        .refresh(&payload.refresh_token)
        .await
        .map_err(AppError::session)?;

    Ok(Json(TokenPairResponse::from(issued)))
}
