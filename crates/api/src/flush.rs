//! Daily flush of pending page views into the database.
//!
//! Once a day, at a fixed local wall-clock time, every pending page view set
//! is read, its cardinality added to the article's durable view count, and
//! the set deleted. Keys are independent: one failing key is recorded and
//! skipped, and a pass with any failures is re-run as a whole a bounded
//! number of times. Keys left behind are picked up the next night.
//!
//! A view that arrives between reading a set's cardinality and deleting the
//! set is lost. A set whose delete fails after its update succeeded is
//! counted again on the next pass.
//!
//! Waits are measured on the monotonic clock but the next run is picked from
//! the wall clock, so stepping the wall clock back past the run time right
//! after a flush makes the same night's flush run again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeDelta, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::repos::ArticleRepo;
use crate::stores::{KeyParseError, PageViewStore, parse_page_view_key};

#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Local time of day at which the flush runs.
    pub run_at: NaiveTime,
    /// Full passes attempted per night while a pass reports errors.
    pub max_attempts: u32,
    /// Fixed pause between passes.
    pub retry_delay: Duration,
}

impl From<&Config> for FlushConfig {
    fn from(config: &Config) -> Self {
        Self {
            run_at: config.flush_time(),
            max_attempts: config.flush_max_attempts,
            retry_delay: config.flush_retry_delay(),
        }
    }
}

/// Why one key (or the whole listing) could not be flushed.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("failed to list page view keys: {0:#}")]
    Enumerate(anyhow::Error),
    #[error("failed to read pending views at {key}: {error:#}")]
    Cardinality { key: String, error: anyhow::Error },
    #[error(transparent)]
    KeyParse(#[from] KeyParseError),
    #[error("failed to add {delta} views to article {article_id}: {error:#}")]
    Update {
        article_id: i64,
        delta: i64,
        error: anyhow::Error,
    },
    #[error("failed to delete {key}: {error:#}")]
    Delete { key: String, error: anyhow::Error },
}

/// Outcome of a flush: the last pass's per-key results and how many passes ran.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub keys: usize,
    pub flushed: usize,
    pub views: i64,
    pub attempts: u32,
    pub errors: Vec<FlushError>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct PageViewFlusher {
    page_views: Arc<dyn PageViewStore>,
    articles: Arc<dyn ArticleRepo>,
    config: FlushConfig,
}

impl PageViewFlusher {
    pub fn new(
        page_views: Arc<dyn PageViewStore>,
        articles: Arc<dyn ArticleRepo>,
        config: FlushConfig,
    ) -> Self {
        Self {
            page_views,
            articles,
            config,
        }
    }

    /// Run passes until one is clean or `max_attempts` is reached.
    pub async fn flush_with_retry(&self) -> FlushReport {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let mut report = self.flush_once().await;
            report.attempts = attempt;

            if report.is_clean() {
                return report;
            }

            if attempt >= max_attempts {
                error!(
                    attempts = attempt,
                    errors = report.errors.len(),
                    "page view flush still failing after retries, leaving keys for next run"
                );
                return report;
            }

            warn!(
                attempt,
                errors = report.errors.len(),
                "page view flush pass had errors, retrying"
            );
            tokio::time::sleep(self.config.retry_delay).await;
            attempt += 1;
        }
    }

    /// One pass over every pending key, in listing order.
    pub async fn flush_once(&self) -> FlushReport {
        let mut report = FlushReport::default();

        let keys = match self.page_views.pending_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "failed to list page view keys");
                report.errors.push(FlushError::Enumerate(e));
                return report;
            }
        };

        report.keys = keys.len();
        info!(total = keys.len(), "collected page view keys");

        for key in keys {
            match self.flush_key(&key).await {
                Ok(delta) => {
                    report.flushed += 1;
                    report.views += delta;
                }
                Err(e) => {
                    error!(key = %key, error = %e, "failed to flush page view key");
                    report.errors.push(e);
                }
            }
        }

        report
    }

    /// Apply one key's pending views and delete it. Returns the views applied.
    ///
    /// The key is left in place on any failure before the delete.
    async fn flush_key(&self, key: &str) -> Result<i64, FlushError> {
        let count = self
            .page_views
            .key_cardinality(key)
            .await
            .map_err(|error| FlushError::Cardinality {
                key: key.to_string(),
                error,
            })?;

        let article_id = parse_page_view_key(key)?;
        let delta = i64::try_from(count).unwrap_or(i64::MAX);

        if delta > 0 {
            let rows = self
                .articles
                .increase_views(article_id, delta)
                .await
                .map_err(|error| FlushError::Update {
                    article_id,
                    delta,
                    error,
                })?;

            if rows == 0 {
                // Article deleted since the views were recorded. Drop the key
                // anyway so it doesn't linger forever.
                warn!(
                    key = %key,
                    article_id,
                    views = delta,
                    "no article row updated, discarding pending views"
                );
            }
        }

        self.page_views
            .delete_key(key)
            .await
            .map_err(|error| FlushError::Delete {
                key: key.to_string(),
                error,
            })?;

        Ok(delta)
    }
}

/// First occurrence of `at` (local to `now`'s zone) strictly after `now`.
///
/// Days where `at` does not exist locally (DST gap) are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    for offset in 0..=2 {
        let date = today + Days::new(offset);
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + TimeDelta::days(1)
}

/// Background task running the flush once a day.
pub struct FlushScheduler {
    flusher: Arc<PageViewFlusher>,
    clock: Arc<dyn Clock>,
}

impl FlushScheduler {
    pub fn new(flusher: Arc<PageViewFlusher>, clock: Arc<dyn Clock>) -> Self {
        Self { flusher, clock }
    }

    /// Spawn the scheduler loop. Stop it through the returned handle.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let run_at = self.flusher.config.run_at;
        info!(run_at = %run_at, "page view flush scheduler started");

        loop {
            let now = self.clock.now();
            let next = next_run_after(&now.with_timezone(&Local), run_at);
            let wait = (next.with_timezone(&Utc) - now)
                .to_std()
                .unwrap_or_default();

            info!(next_run = %next, "next page view flush scheduled");

            // A pass that has started always runs to completion; shutdown is
            // only observed while waiting.
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let started = tokio::time::Instant::now();
                    info!("starting page view flush");

                    let report = self.flusher.flush_with_retry().await;

                    info!(
                        keys = report.keys,
                        flushed = report.flushed,
                        views = report.views,
                        attempts = report.attempts,
                        failed = report.errors.len(),
                        cost = ?started.elapsed(),
                        "page view flush done"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("page view flush scheduler stopped");
                        break;
                    }
                }
            }
        }
    }
}

/// Owner of the running scheduler task.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler and wait for it to exit. An in-flight flush
    /// finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "page view flush scheduler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{FixedOffset, NaiveDate};
    use mockall::predicate::eq;

    use super::*;
    use crate::repos::MockArticleRepo;
    use crate::stores::MockPageViewStore;
    use crate::test_utils::PausedClock;

    fn three_am() -> NaiveTime {
        NaiveTime::from_hms_opt(3, 0, 0).unwrap()
    }

    fn config() -> FlushConfig {
        FlushConfig {
            run_at: three_am(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    fn flusher(store: MockPageViewStore, articles: MockArticleRepo) -> PageViewFlusher {
        PageViewFlusher::new(Arc::new(store), Arc::new(articles), config())
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn next_run_is_later_today_before_three() {
        let now = utc(2025, 3, 14, 2, 59, 59);
        assert_eq!(next_run_after(&now, three_am()), utc(2025, 3, 14, 3, 0, 0));
    }

    #[test]
    fn next_run_is_tomorrow_after_three() {
        let now = utc(2025, 3, 14, 14, 30, 0);
        assert_eq!(next_run_after(&now, three_am()), utc(2025, 3, 15, 3, 0, 0));
    }

    #[test]
    fn next_run_is_strictly_after_now() {
        let now = utc(2025, 3, 14, 3, 0, 0);
        assert_eq!(next_run_after(&now, three_am()), utc(2025, 3, 15, 3, 0, 0));
    }

    #[test]
    fn next_run_repeats_after_wall_clock_steps_back() {
        let after_flush = utc(2025, 3, 14, 3, 0, 5);
        assert_eq!(next_run_after(&after_flush, three_am()), utc(2025, 3, 15, 3, 0, 0));

        let stepped_back = utc(2025, 3, 14, 2, 58, 0);
        assert_eq!(next_run_after(&stepped_back, three_am()), utc(2025, 3, 14, 3, 0, 0));
    }

    #[test]
    fn next_run_rolls_over_month_end() {
        let now = utc(2025, 12, 31, 23, 0, 0);
        assert_eq!(next_run_after(&now, three_am()), utc(2026, 1, 1, 3, 0, 0));
    }

    #[test]
    fn next_run_uses_local_wall_clock() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        // 20:00 UTC is 04:00 next day at +08:00, so the next local 03:00 is a day later.
        let now = utc(2025, 3, 14, 20, 0, 0).with_timezone(&tz);
        let expected = NaiveDate::from_ymd_opt(2025, 3, 16)
            .unwrap()
            .and_time(three_am());

        let next = next_run_after(&now, three_am());
        assert_eq!(next.naive_local(), expected);
        assert_eq!(next.with_timezone(&Utc), utc(2025, 3, 15, 19, 0, 0));
    }

    #[tokio::test]
    async fn flush_applies_cardinality_and_deletes_every_key() {
        let mut store = MockPageViewStore::new();
        store.expect_pending_keys().times(1).returning(|| {
            Ok(vec![
                "article_page_view:1".to_string(),
                "article_page_view:2".to_string(),
            ])
        });
        store.expect_key_cardinality().returning(|key| {
            Ok(if key == "article_page_view:1" { 3 } else { 0 })
        });
        store
            .expect_delete_key()
            .with(eq("article_page_view:1"))
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_delete_key()
            .with(eq("article_page_view:2"))
            .times(1)
            .returning(|_| Ok(()));

        let mut articles = MockArticleRepo::new();
        articles
            .expect_increase_views()
            .with(eq(1), eq(3))
            .times(1)
            .returning(|_, _| Ok(1));
        articles
            .expect_increase_views()
            .with(eq(2), mockall::predicate::always())
            .never();

        let report = flusher(store, articles).flush_once().await;

        assert!(report.is_clean());
        assert_eq!(report.keys, 2);
        assert_eq!(report.flushed, 2);
        assert_eq!(report.views, 3);
    }

    #[tokio::test]
    async fn malformed_key_is_skipped_and_left_in_place() {
        let mut store = MockPageViewStore::new();
        store.expect_pending_keys().returning(|| {
            Ok(vec![
                "article_page_view:abc".to_string(),
                "article_page_view:5".to_string(),
            ])
        });
        store.expect_key_cardinality().returning(|_| Ok(2));
        store
            .expect_delete_key()
            .with(eq("article_page_view:5"))
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_delete_key()
            .with(eq("article_page_view:abc"))
            .never();

        let mut articles = MockArticleRepo::new();
        articles
            .expect_increase_views()
            .with(eq(5), eq(2))
            .times(1)
            .returning(|_, _| Ok(1));

        let report = flusher(store, articles).flush_once().await;

        assert_eq!(report.flushed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            FlushError::KeyParse(KeyParseError::Id { .. })
        ));
    }

    #[tokio::test]
    async fn missing_article_still_deletes_key() {
        let mut store = MockPageViewStore::new();
        store
            .expect_pending_keys()
            .returning(|| Ok(vec!["article_page_view:404".to_string()]));
        store.expect_key_cardinality().returning(|_| Ok(6));
        store
            .expect_delete_key()
            .with(eq("article_page_view:404"))
            .times(1)
            .returning(|_| Ok(()));

        let mut articles = MockArticleRepo::new();
        articles.expect_increase_views().returning(|_, _| Ok(0));

        let report = flusher(store, articles).flush_once().await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn failed_update_keeps_key_for_next_pass() {
        let mut store = MockPageViewStore::new();
        store
            .expect_pending_keys()
            .returning(|| Ok(vec!["article_page_view:9".to_string()]));
        store.expect_key_cardinality().returning(|_| Ok(4));
        store.expect_delete_key().never();

        let mut articles = MockArticleRepo::new();
        articles
            .expect_increase_views()
            .returning(|_, _| Err(anyhow::anyhow!("deadlock detected")));

        let report = flusher(store, articles).flush_once().await;

        assert_eq!(report.flushed, 0);
        assert!(matches!(
            report.errors[0],
            FlushError::Update {
                article_id: 9,
                delta: 4,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn one_failing_key_does_not_stop_the_others() {
        let mut store = MockPageViewStore::new();
        store.expect_pending_keys().returning(|| {
            Ok(vec![
                "article_page_view:1".to_string(),
                "article_page_view:2".to_string(),
                "article_page_view:3".to_string(),
            ])
        });
        store.expect_key_cardinality().returning(|key| {
            if key == "article_page_view:2" {
                Err(anyhow::anyhow!("timeout"))
            } else {
                Ok(1)
            }
        });
        store.expect_delete_key().times(2).returning(|_| Ok(()));

        let mut articles = MockArticleRepo::new();
        articles.expect_increase_views().times(2).returning(|_, _| Ok(1));

        let report = flusher(store, articles).flush_once().await;

        assert_eq!(report.flushed, 2);
        assert!(matches!(report.errors[0], FlushError::Cardinality { .. }));
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let mut store = MockPageViewStore::new();
        store
            .expect_pending_keys()
            .returning(|| Ok(vec!["article_page_view:1".to_string()]));
        store.expect_key_cardinality().returning(|_| Ok(1));
        store
            .expect_delete_key()
            .returning(|_| Err(anyhow::anyhow!("READONLY replica")));

        let mut articles = MockArticleRepo::new();
        articles.expect_increase_views().returning(|_, _| Ok(1));

        let report = flusher(store, articles).flush_once().await;
        assert!(matches!(report.errors[0], FlushError::Delete { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_is_retried_three_times_then_given_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut store = MockPageViewStore::new();
        store.expect_pending_keys().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("connection refused"))
        });

        let started = tokio::time::Instant::now();
        let report = flusher(store, MockArticleRepo::new())
            .flush_with_retry()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempts, 3);
        assert!(matches!(report.errors[0], FlushError::Enumerate(_)));
        // Delay between attempts, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reruns_whole_pass_until_clean() {
        // Key 2 fails its update once; the retried pass only sees what's left.
        let remaining = Arc::new(Mutex::new(vec![
            "article_page_view:1".to_string(),
            "article_page_view:2".to_string(),
        ]));
        let update_failures = Arc::new(AtomicUsize::new(0));

        let mut store = MockPageViewStore::new();
        let lister = remaining.clone();
        store
            .expect_pending_keys()
            .times(2)
            .returning(move || Ok(lister.lock().unwrap().clone()));
        store.expect_key_cardinality().returning(|_| Ok(1));
        let deleter = remaining.clone();
        store.expect_delete_key().returning(move |key| {
            deleter.lock().unwrap().retain(|k| k != key);
            Ok(())
        });

        let mut articles = MockArticleRepo::new();
        let failures = update_failures.clone();
        articles.expect_increase_views().returning(move |id, _| {
            if id == 2 && failures.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow::anyhow!("lock wait timeout"))
            } else {
                Ok(1)
            }
        });

        let report = flusher(store, articles).flush_with_retry().await;

        assert!(report.is_clean());
        assert_eq!(report.attempts, 2);
        assert_eq!(report.keys, 1);
        assert!(remaining.lock().unwrap().is_empty());
    }

    fn counting_store(passes: Arc<AtomicUsize>) -> MockPageViewStore {
        let mut store = MockPageViewStore::new();
        store.expect_pending_keys().returning(move || {
            passes.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["article_page_view:7".to_string()])
        });
        store.expect_key_cardinality().returning(|_| Ok(2));
        store.expect_delete_key().returning(|_| Ok(()));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_flushes_once_a_day_until_stopped() {
        let passes = Arc::new(AtomicUsize::new(0));
        let mut articles = MockArticleRepo::new();
        articles
            .expect_increase_views()
            .with(eq(7), eq(2))
            .returning(|_, _| Ok(1));

        let clock = Arc::new(PausedClock::default());
        let flusher = Arc::new(flusher(counting_store(passes.clone()), articles));
        let handle = FlushScheduler::new(flusher, clock.clone()).start();

        let now = clock.now();
        let first = next_run_after(&now.with_timezone(&Local), three_am());
        let until_first = (first.with_timezone(&Utc) - now).to_std().unwrap();

        tokio::time::sleep(until_first - Duration::from_secs(60)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 2);

        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(3 * 24 * 3600)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_stops_promptly_while_waiting() {
        let passes = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(PausedClock::default());
        let flusher = Arc::new(flusher(
            counting_store(passes.clone()),
            MockArticleRepo::new(),
        ));

        let handle = FlushScheduler::new(flusher, clock).start();
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        handle.stop().await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(passes.load(Ordering::SeqCst), 0);
    }
}
