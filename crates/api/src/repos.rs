//! Database repositories (PostgreSQL).
//!
//! Each repository is abstracted behind a trait to enable mocking in tests.
//!
//! ## Repositories
//!
//! - **users** - Account lookup and signup
//! - **articles** - Durable article view counts
//! - **status** - Database health checks

mod articles;
mod status;
mod users;

pub use articles::{ArticleRepo, PgArticleRepo};
pub use status::{PgStatusRepo, StatusRepo};
pub use users::{PgUserRepo, UserRepo};

#[cfg(test)]
pub use articles::MockArticleRepo;
#[cfg(test)]
pub use status::MockStatusRepo;
#[cfg(test)]
pub use users::MockUserRepo;

use std::sync::Arc;

/// Collection of all database repositories.
#[derive(Clone)]
pub struct Repos {
    pub users: Arc<dyn UserRepo>,
    pub articles: Arc<dyn ArticleRepo>,
    pub status: Arc<dyn StatusRepo>,
}
