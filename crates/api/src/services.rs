//! Domain services sitting between handlers and the repos/stores.
//!
//! ## Services
//!
//! - **token** - HS256 token issuance and validation
//! - **session** - Signup, login, logout, refresh and request authentication
//! - **views** - Page view recording and view totals
//! - **password** - Argon2 password hashing

mod password;
mod session;
mod token;
mod views;

#[cfg(test)]
pub use password::hash_password;
pub use session::{IssuedTokens, SessionConfig, SessionError, SessionService};
pub use token::TokenService;
pub use views::{ViewService, fingerprint};
