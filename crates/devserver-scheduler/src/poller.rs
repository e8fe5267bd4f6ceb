//! Periodic full passes.

use devserver_config::PollInterval;
use std::time::Duration;
use tracing::info;

use crate::coordinator::Coordinator;

/// Starts a full pass, then sleeps a jittered interval, forever.
pub struct Poller {
    coordinator: Coordinator,
}

impl Poller {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Run until the task is dropped.
    ///
    /// Passes are not awaited: a slow pass overlaps the next one, and the
    /// queues serialize the work.
    pub async fn run(self) {
        loop {
            let coordinator = self.coordinator.clone();
            tokio::spawn(async move {
                coordinator.request_full_pass().await;
            });

            // Re-read each time so a reload takes effect
            let interval = self.coordinator.config().current().poll_interval;
            let delay = jittered_delay(interval);
            info!(delay_secs = delay.as_secs(), "Next poll scheduled");
            tokio::time::sleep(delay).await;
        }
    }
}

/// A delay drawn uniformly from `[min, max]`.
pub fn jittered_delay(interval: PollInterval) -> Duration {
    if interval.max <= interval.min {
        return interval.min;
    }
    let span = (interval.max - interval.min).as_millis() as u64;
    let random = uuid::Uuid::new_v4().as_u128() as u64;
    interval.min + Duration::from_millis(random % (span + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_bounds() {
        let interval = PollInterval {
            min: Duration::from_secs(150),
            max: Duration::from_secs(450),
        };
        for _ in 0..1000 {
            let delay = jittered_delay(interval);
            assert!(delay >= interval.min && delay <= interval.max);
        }
    }

    #[test]
    fn test_jitter_varies() {
        let interval = PollInterval {
            min: Duration::from_secs(1),
            max: Duration::from_secs(1000),
        };
        let first = jittered_delay(interval);
        assert!((0..50).any(|_| jittered_delay(interval) != first));
    }

    #[test]
    fn test_fixed_interval() {
        let interval = PollInterval {
            min: Duration::from_secs(30),
            max: Duration::from_secs(30),
        };
        assert_eq!(jittered_delay(interval), Duration::from_secs(30));
    }
}
