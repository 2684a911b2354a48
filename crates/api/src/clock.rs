//! Wall-clock source shared by token issuance and the flush scheduler.

use chrono::{DateTime, Utc};

/// Supplies the current time. Injected so tests can move time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
