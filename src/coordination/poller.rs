use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::PollConfig;
use crate::errors::CoordinatorResult;

/// Shortest base interval; anything lower is raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Agent-side polling cadence with exponential backoff on failure
///
/// The coordinator itself never sleeps between operations; agents that
/// watch their inbox drive this loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollScheduler {
    interval: Duration,
    max_backoff: Duration,
}

impl PollScheduler {
    pub fn new(interval: Duration, max_backoff: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self {
            interval,
            max_backoff: max_backoff.max(interval),
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.interval, config.max_backoff)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay before the next tick
    ///
    /// Success resets to the base interval; failure doubles the current
    /// delay up to `max_backoff`.
    pub fn next_delay(&self, current: Duration, succeeded: bool) -> Duration {
        if succeeded {
            self.interval
        } else {
            current.saturating_mul(2).clamp(self.interval, self.max_backoff)
        }
    }

    /// Runs `tick` until `shutdown` turns true
    ///
    /// Tick errors are logged and slow the loop down; they never stop it.
    pub async fn run<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoordinatorResult<()>>,
    {
        let mut delay = self.interval;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let succeeded = match tick().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Poll tick failed");
                    false
                }
            };
            delay = self.next_delay(delay, succeeded);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Poll loop stopped");
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CoordinatorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_success_resets_to_interval() {
        let scheduler = PollScheduler::new(Duration::from_secs(3), Duration::from_secs(60));
        assert_eq!(
            scheduler.next_delay(Duration::from_secs(48), true),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_failure_doubles_up_to_cap() {
        let scheduler = PollScheduler::new(Duration::from_secs(3), Duration::from_secs(60));
        let mut delay = scheduler.interval();
        let mut seen = Vec::new();
        for _ in 0..6 {
            delay = scheduler.next_delay(delay, false);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![6, 12, 24, 48, 60, 60]);
    }

    #[test]
    fn test_zero_interval_is_raised_to_floor() {
        let scheduler = PollScheduler::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(scheduler.interval(), MIN_POLL_INTERVAL);
        assert_eq!(scheduler.next_delay(Duration::ZERO, true), MIN_POLL_INTERVAL);
        assert!(scheduler.next_delay(Duration::ZERO, false) >= MIN_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let scheduler = PollScheduler::new(Duration::from_millis(10), Duration::from_millis(40));
        let (tx, rx) = watch::channel(false);
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        let handle = tokio::spawn(async move {
            scheduler
                .run(rx, move || {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        if n % 2 == 1 {
                            return Err(CoordinatorError::persistence("store busy"));
                        }
                        Ok(())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
