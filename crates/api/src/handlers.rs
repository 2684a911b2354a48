//! HTTP handlers, one router per path prefix.
//!
//! - `/health` - dependency health
//! - `/user` - signup, login, logout and token refresh
//! - `/article` - page view recording and view totals

pub mod article;
pub mod health;
pub mod user;
