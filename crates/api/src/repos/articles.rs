//! Article view counts for PostgreSQL.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};

/// Repository for the durable per-article view counter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArticleRepo: Send + Sync {
    /// Durable view count, or `None` if the article does not exist.
    async fn find_views(&self, article_id: i64) -> Result<Option<i64>>;

    /// Add `delta` to the article's view count. Returns rows affected.
    async fn increase_views(&self, article_id: i64, delta: i64) -> Result<u64>;
}

/// PostgreSQL implementation of ArticleRepo.
#[derive(Clone)]
pub struct PgArticleRepo {
    pool: Pool<Postgres>,
}

impl PgArticleRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleRepo for PgArticleRepo {
    async fn find_views(&self, article_id: i64) -> Result<Option<i64>> {
        let views = sqlx::query_scalar::<_, i64>("SELECT views FROM articles WHERE id = $1")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(views)
    }

    async fn increase_views(&self, article_id: i64, delta: i64) -> Result<u64> {
        let result = sqlx::query("UPDATE articles SET views = views + $2 WHERE id = $1")
            .bind(article_id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
