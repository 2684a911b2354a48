//! Request extractors.
//!
//! - **auth** - `AuthUser`, resolved from a bearer access token
//! - **visitor** - `Visitor`, the anonymous reader fingerprint behind page views

pub mod auth;
pub mod visitor;

pub use auth::AuthUser;
pub use visitor::{Visitor, visitor_cookie};
