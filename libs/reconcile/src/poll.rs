//! Cancellable polling.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Why a poll ended without producing a value.
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The cancellation token fired.
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    /// The probe reported an error that must not be retried.
    #[error(transparent)]
    Failed(E),
}

impl<E> PollError<E> {
    /// Returns true if the poll was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// How often to probe, and whether to report progress while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between the end of one probe and the start of the next.
    pub interval: Duration,

    /// When set, the wait is split into steps of this size and each step is
    /// reported to the observer as a countdown.
    pub tick: Option<Duration>,
}

impl PollPolicy {
    /// A silent fixed-interval policy.
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            tick: None,
        }
    }

    /// A fixed-interval policy that reports a countdown every `tick`.
    pub const fn countdown(interval: Duration, tick: Duration) -> Self {
        Self {
            interval,
            tick: Some(tick),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(crate::READINESS_INTERVAL)
    }
}

/// Receives progress notifications from a [`Poller`].
///
/// Implementations decide how (or whether) to surface waits to a human.
pub trait PollObserver: Send + Sync {
    /// A probe came back negative; another attempt will follow.
    fn on_retry(&self, _name: &str, _attempt: u32) {}

    /// Time left before the next attempt.
    fn on_countdown(&self, _name: &str, _remaining: Duration) {}

    /// The probe succeeded after `attempts` tries.
    fn on_ready(&self, _name: &str, _attempts: u32) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PollObserver for NoopObserver {}

/// Repeats a probe until it yields a value, fails fatally, or is cancelled.
pub struct Poller<'a> {
    policy: PollPolicy,
    cancel: &'a CancellationToken,
    observer: &'a dyn PollObserver,
}

impl<'a> Poller<'a> {
    /// Creates a poller bound to a cancellation token.
    pub fn new(policy: PollPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            policy,
            cancel,
            observer: &NoopObserver,
        }
    }

    /// Routes progress notifications to `observer`.
    pub fn with_observer(mut self, observer: &'a dyn PollObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Runs `probe` until it returns `Ok(Some(_))`.
    ///
    /// `Ok(None)` means "not yet" and schedules another attempt after the
    /// policy's interval; `Err(_)` ends the poll immediately. The attempt
    /// number (starting at 1) is passed to the probe.
    pub async fn run<T, E, F, Fut>(&self, name: &str, mut probe: F) -> Result<T, PollError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            trace!(name, attempt, "Polling");

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled(name.to_string()));
                }
                outcome = probe(attempt) => outcome,
            };

            match outcome {
                Ok(Some(value)) => {
                    self.observer.on_ready(name, attempt);
                    return Ok(value);
                }
                Ok(None) => {
                    debug!(name, attempt, "Not ready, retrying");
                    self.observer.on_retry(name, attempt);
                }
                Err(e) => return Err(PollError::Failed(e)),
            }

            self.wait(name).await?;
        }
    }

    async fn wait<E>(&self, name: &str) -> Result<(), PollError<E>> {
        let step = self
            .policy
            .tick
            .filter(|t| !t.is_zero())
            .unwrap_or(self.policy.interval);
        let mut remaining = self.policy.interval;

        loop {
            if self.policy.tick.is_some() && !remaining.is_zero() {
                self.observer.on_countdown(name, remaining);
            }

            let delay = step.min(remaining);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled(name.to_string()));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            remaining = remaining.saturating_sub(delay);
            if remaining.is_zero() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        retries: Mutex<Vec<u32>>,
        countdown: Mutex<Vec<u64>>,
        ready: Mutex<Option<u32>>,
    }

    impl PollObserver for Recorder {
        fn on_retry(&self, _name: &str, attempt: u32) {
            self.retries.lock().unwrap().push(attempt);
        }

        fn on_countdown(&self, _name: &str, remaining: Duration) {
            self.countdown.lock().unwrap().push(remaining.as_secs());
        }

        fn on_ready(&self, _name: &str, attempts: u32) {
            *self.ready.lock().unwrap() = Some(attempts);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_ready_value() {
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollPolicy::fixed(Duration::from_secs(1)), &cancel);

        let started = tokio::time::Instant::now();
        let value: Result<u32, PollError<()>> = poller
            .run("counter", |attempt| async move {
                Ok((attempt == 3).then_some(attempt * 10))
            })
            .await;

        assert_eq!(value.unwrap(), 30);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_polling() {
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollPolicy::default(), &cancel);

        let mut calls = 0;
        let result: Result<(), PollError<&str>> = poller
            .run("fatal", |attempt| {
                calls += 1;
                async move {
                    if attempt == 2 {
                        Err("auth rejected")
                    } else {
                        Ok(None)
                    }
                }
            })
            .await;

        assert!(matches!(result, Err(PollError::Failed("auth rejected"))));
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let poller = Poller::new(PollPolicy::fixed(Duration::from_secs(10)), &cancel);
        let result: Result<(), PollError<std::io::Error>> =
            poller.run("never", |_| async { Ok(None) }).await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "cancelled while waiting for never");
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_reports_each_tick() {
        let cancel = CancellationToken::new();
        let recorder = Recorder::default();
        let poller = Poller::new(
            PollPolicy::countdown(Duration::from_secs(3), Duration::from_secs(1)),
            &cancel,
        )
        .with_observer(&recorder);

        let result: Result<(), PollError<()>> = poller
            .run("dns", |attempt| async move { Ok((attempt == 2).then_some(())) })
            .await;

        assert!(result.is_ok());
        assert_eq!(*recorder.retries.lock().unwrap(), vec![1]);
        assert_eq!(*recorder.countdown.lock().unwrap(), vec![3, 2, 1]);
        assert_eq!(*recorder.ready.lock().unwrap(), Some(2));
    }
}
