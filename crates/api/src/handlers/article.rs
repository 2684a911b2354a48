//! Article page views.
//!
//! Endpoints:
//! - POST /article/views - Record a view by the calling visitor
//! - GET /article/{id}/views - Durable plus pending view count

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use garde::Validate;
use shared::api::{ArticleViewsResponse, PageViewPayload};

use crate::{
    error::AppError,
    middleware::{Visitor, visitor_cookie},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/views", post(record_view))
        .route("/{id}/views", get(get_views))
}

/// Counts the view once per visitor. First-time visitors get their
/// fingerprint back as a cookie so later views collapse onto it.
#[debug_handler]
async fn record_view(
    State(state): State<AppState>,
    visitor: Visitor,
    jar: CookieJar,
    Json(payload): Json<PageViewPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state
        .views
        .record_view(payload.article_id, &visitor.fingerprint)
        .await?;

    let jar = if visitor.is_new {
        jar.add(visitor_cookie(visitor.fingerprint, &state.config.cookie_domain))
    } else {
        jar
    };

    Ok((jar, StatusCode::OK))
}

#[debug_handler]
async fn get_views(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let views = state
        .views
        .current_view_total(article_id)
        .await?
        .ok_or(AppError::External(StatusCode::NOT_FOUND, "Article not found"))?;

    Ok(Json(ArticleViewsResponse { article_id, views }))
}
