//! Bounded polling for state that an external daemon updates asynchronously.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Wait `settle`, then check up to `attempts` times with `interval` between checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub settle: Duration,
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// Single check with no waiting.
    pub const fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            attempts: 1,
            interval: Duration::ZERO,
        }
    }

    /// Upper bound on the time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        self.settle + self.interval * self.attempts.saturating_sub(1)
    }
}

/// Returns true as soon as `check` does; false once the attempts are spent.
pub async fn poll_until<F, Fut>(policy: PollPolicy, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !policy.settle.is_zero() {
        tokio::time::sleep(policy.settle).await;
    }

    for attempt in 1..=policy.attempts {
        if check().await {
            debug!(attempt, "Poll condition met");
            return true;
        }
        debug!(attempt, max = policy.attempts, "Poll condition not met");
        if attempt < policy.attempts && !policy.interval.is_zero() {
            tokio::time::sleep(policy.interval).await;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = Cell::new(0);
        let policy = PollPolicy {
            attempts: 5,
            ..PollPolicy::immediate()
        };

        let ok = poll_until(policy, || {
            calls.set(calls.get() + 1);
            let done = calls.get() == 3;
            async move { done }
        })
        .await;

        assert!(ok);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let calls = Cell::new(0);
        let policy = PollPolicy {
            attempts: 4,
            ..PollPolicy::immediate()
        };

        let ok = poll_until(policy, || {
            calls.set(calls.get() + 1);
            async { false }
        })
        .await;

        assert!(!ok);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn max_wait_counts_settle_and_intervals() {
        let policy = PollPolicy {
            settle: Duration::from_secs(3),
            attempts: 5,
            interval: Duration::from_secs(1),
        };
        assert_eq!(policy.max_wait(), Duration::from_secs(7));
    }
}
