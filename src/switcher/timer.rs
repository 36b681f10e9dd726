//! Cancellable one-shot timers
//!
//! A [`TimerHandle`] owns a spawned task that sleeps for a delay and then runs
//! an action, unless [`TimerHandle::cancel`] is called first. Timers use
//! `tokio::time`, so tests drive them with a paused clock.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled action
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `action` after `delay` unless cancelled
    ///
    /// The action is still responsible for checking that it is current when
    /// it runs: a cancel that races with the deadline can lose.
    pub fn schedule<F, Fut>(id: u64, delay: Duration, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {
                    tracing::trace!("Timer {} cancelled", id);
                }
                _ = tokio::time::sleep(delay) => {
                    if !child.is_cancelled() {
                        action().await;
                    }
                }
            }
        });

        Self { id, token, handle }
    }

    /// Identifier given at schedule time
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the timer if it has not fired yet
    ///
    /// An action that already started keeps running; it is never aborted
    /// halfway through a transport call.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check if the timer task has completed (fired or cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_timer(id: u64, delay: Duration, counter: &Arc<AtomicUsize>) -> TimerHandle {
        let counter = counter.clone();
        TimerHandle::schedule(id, delay, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = counting_timer(1, Duration::from_secs(5), &fired);

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.is_finished());
        assert_eq!(timer.id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_action() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = counting_timer(2, Duration::from_secs(5), &fired);

        tokio::time::sleep(Duration::from_secs(1)).await;
        timer.cancel();
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_fires_on_next_tick() {
        let fired = Arc::new(AtomicUsize::new(0));
        let _timer = counting_timer(3, Duration::ZERO, &fired);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
