use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Enforces a minimum gap between consecutive transport sends.
///
/// Holders of a [`SendPermit`] send one at a time. The gap is measured from
/// the moment the previous permit was released (the previous send finished)
/// to the moment the next permit is handed out.
pub struct SendThrottle {
    min_spacing: Duration,
    last_release: Mutex<Option<Instant>>,
}

/// Exclusive right to issue one send. Dropping it starts the spacing window.
pub struct SendPermit<'a> {
    last_release: MutexGuard<'a, Option<Instant>>,
}

impl SendThrottle {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_release: Mutex::new(None),
        }
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Wait for the spacing window to elapse, then take the send slot.
    pub async fn acquire(&self) -> SendPermit<'_> {
        let guard = self.last_release.lock().await;

        if let Some(last) = *guard {
            let ready_at = last + self.min_spacing;
            if ready_at > Instant::now() {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Throttling send"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        SendPermit {
            last_release: guard,
        }
    }
}

impl Drop for SendPermit<'_> {
    fn drop(&mut self) {
        *self.last_release = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let throttle = SendThrottle::new(Duration::from_millis(500));
        let start = Instant::now();
        drop(throttle.acquire().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_waits_for_spacing() {
        let throttle = SendThrottle::new(Duration::from_millis(500));

        drop(throttle.acquire().await);
        let released = Instant::now();

        drop(throttle.acquire().await);
        assert!(released.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_when_window_already_elapsed() {
        let throttle = SendThrottle::new(Duration::from_millis(500));
        drop(throttle.acquire().await);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        drop(throttle.acquire().await);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_spacing_never_waits() {
        let throttle = SendThrottle::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..3 {
            drop(throttle.acquire().await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
