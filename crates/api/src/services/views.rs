//! Page view recording.
//!
//! Views land only in the page view store on the request path; the flush job
//! moves them into the database later. Reads add the two together.

use std::sync::Arc;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::repos::ArticleRepo;
use crate::stores::PageViewStore;

/// Stable visitor id derived from client IP and user agent, used when the
/// visitor has no cookie yet. Visitors behind one NAT with the same browser
/// collapse into one.
pub fn fingerprint(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct ViewService {
    page_views: Arc<dyn PageViewStore>,
    articles: Arc<dyn ArticleRepo>,
}

impl ViewService {
    pub fn new(page_views: Arc<dyn PageViewStore>, articles: Arc<dyn ArticleRepo>) -> Self {
        Self {
            page_views,
            articles,
        }
    }

    /// Count one view per visitor per flush window.
    pub async fn record_view(&self, article_id: i64, fingerprint: &str) -> Result<()> {
        self.page_views.add_view(article_id, fingerprint).await?;
        tracing::debug!(article_id, "page view recorded");
        Ok(())
    }

    /// Durable count plus pending views, or `None` if the article is gone.
    ///
    /// If the page view store is unreachable the durable count alone is
    /// returned.
    pub async fn current_view_total(&self, article_id: i64) -> Result<Option<i64>> {
        let Some(durable) = self.articles.find_views(article_id).await? else {
            return Ok(None);
        };

        let pending = match self.page_views.pending_count(article_id).await {
            Ok(count) => i64::try_from(count).unwrap_or(i64::MAX),
            Err(e) => {
                tracing::error!(article_id, error = %e, "failed to read pending page views");
                0
            }
        };

        Ok(Some(durable.saturating_add(pending)))
    }
}
