//! Anonymous visitor identity for page view counting.
//!
//! A returning reader presents the `temp_user_id` cookie and is identified by
//! its value. A first-time reader is fingerprinted from client IP and
//! User-Agent; the handler then hands that fingerprint back as the cookie.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header::USER_AGENT, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::services::fingerprint;

pub const VISITOR_COOKIE: &str = "temp_user_id";

/// How long a visitor keeps the same fingerprint.
const VISITOR_COOKIE_MAX_AGE_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
    pub fingerprint: String,
    /// No cookie was presented; the caller should set one.
    pub is_new: bool,
}

impl<S> FromRequestParts<S> for Visitor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(value) = jar
            .get(VISITOR_COOKIE)
            .map(|cookie| cookie.value())
            .filter(|value| !value.is_empty())
        {
            return Ok(Visitor {
                fingerprint: value.to_string(),
                is_new: false,
            });
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let ip = client_ip(&parts.headers, peer);
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        Ok(Visitor {
            fingerprint: fingerprint(&ip, user_agent),
            is_new: true,
        })
    }
}

/// Client address as reported by the proxy chain, falling back to the peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Cookie carrying a visitor fingerprint, shared across subdomains of
/// `domain` when one is configured.
pub fn visitor_cookie(fingerprint: String, domain: &str) -> Cookie<'static> {
    let mut cookie = Cookie::build((VISITOR_COOKIE, fingerprint))
        .path("/")
        .max_age(time::Duration::hours(VISITOR_COOKIE_MAX_AGE_HOURS))
        .http_only(true)
        .build();

    if !domain.is_empty() {
        cookie.set_domain(format!(".{}", domain));
    }

    cookie
}
