//! Bounded polling

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Cap for deadlines too far out to represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline for a polling loop.
///
/// The caller checks first and only calls [`Deadline::tick`] when the check
/// was not satisfied, so a condition that already holds never sleeps. The
/// last check happens at the deadline itself.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
    interval: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration, interval: Duration) -> Self {
        Self {
            end: later(Instant::now(), timeout),
            interval,
        }
    }

    /// Sleep until the next check; false once the deadline has passed
    pub async fn tick(&self) -> bool {
        let now = Instant::now();
        if now >= self.end {
            return false;
        }
        sleep_until(later(now, self.interval).min(self.end)).await;
        true
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }
}

fn later(from: Instant, by: Duration) -> Instant {
    from.checked_add(by).unwrap_or_else(|| from + FAR_FUTURE)
}
