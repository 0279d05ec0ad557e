use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Bounded retry schedule: how many attempts, and how long to wait after
/// each failed one. No sleep follows the final attempt.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    delay: fn(u32) -> Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: fn(u32) -> Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Delay after the zero-based `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.delay)(attempt)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Run `op` until `should_retry` rejects its outcome or the attempts run out,
/// then return the last outcome. `op` receives the zero-based attempt index.
pub async fn retry<T, F, Fut, P>(policy: &RetryPolicy, mut op: F, should_retry: P) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 0;
    loop {
        let outcome = op(attempt).await;
        let last = attempt + 1 >= policy.max_attempts;
        if last || !should_retry(&outcome) {
            return outcome;
        }
        let delay = policy.delay_after(attempt);
        debug!("Attempt {} not accepted, retrying in {:?}", attempt + 1, delay);
        sleep(delay).await;
        attempt += 1;
    }
}
