//! Backoff executor: bounded exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::domain::TransferError;

/// Delays are never longer than this, whatever the multiplier does.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

/// Retry policy for one logical operation.
///
/// Pure value: the executor creates a fresh attempt counter per call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    initial_delay: Duration,

    /// Growth factor applied per attempt.
    multiplier: f64,

    /// Maximum number of attempts (not retries).
    max_steps: u32,

    /// Fraction of the delay added or removed at random, in [0, 1].
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(
        initial_delay: Duration,
        multiplier: f64,
        max_steps: u32,
        jitter: f64,
    ) -> Result<Self, TransferError> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(TransferError::Config(format!(
                "backoff multiplier must be a positive number, got {multiplier}"
            )));
        }
        if max_steps == 0 {
            return Err(TransferError::Config(
                "backoff max_steps must be at least 1".to_string(),
            ));
        }
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(Self {
            initial_delay,
            multiplier,
            max_steps,
            jitter,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Un-jittered delay after `attempt` failed attempts (0-indexed).
    ///
    /// delay = initial_delay * multiplier^attempt
    ///
    /// Example with initial_delay=1s, multiplier=2.0:
    /// - attempt 0: 1s
    /// - attempt 1: 2s
    /// - attempt 2: 4s
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= MAX_DELAY.as_secs_f64() {
            return MAX_DELAY;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay after `attempt`, jittered by ± `jitter`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter == 0.0 {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let secs = (base.as_secs_f64() * factor).clamp(0.0, MAX_DELAY.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl Default for BackoffPolicy {
    /// 1s, x2, 5 attempts, 10% jitter.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_steps: 5,
            jitter: 0.1,
        }
    }
}

/// Result of one attempt that did not fail hard.
#[derive(Debug)]
pub enum Step<T> {
    /// Finished; stop retrying.
    Done(T),

    /// Not finished, try again after the backoff delay. Carries the cause.
    Retry(TransferError),
}

impl<T> Step<T> {
    /// Transient errors retry, everything else aborts.
    pub fn from_result(result: Result<T, TransferError>) -> Result<Self, TransferError> {
        match result {
            Ok(value) => Ok(Step::Done(value)),
            Err(err) if err.is_transient() => Ok(Step::Retry(err)),
            Err(err) => Err(err),
        }
    }
}

/// Run `op` under `policy`.
///
/// `op` receives the 0-indexed attempt number and returns:
/// - `Ok(Step::Done(v))`: success, returned as-is
/// - `Ok(Step::Retry(cause))`: sleep, then try again
/// - `Err(e)`: hard failure, returned immediately without another attempt
///
/// After `max_steps` attempts that all asked to retry, the last cause is
/// returned inside [`TransferError::RetriesExhausted`]. Attempts never overlap.
pub async fn retry<T, F, Fut>(policy: &BackoffPolicy, mut op: F) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Step<T>, TransferError>>,
{
    let mut attempt = 0;
    loop {
        let cause = match op(attempt).await? {
            Step::Done(value) => return Ok(value),
            Step::Retry(cause) => cause,
        };

        let attempts = attempt + 1;
        if attempts >= policy.max_steps {
            warn!(attempts, error = %cause, "giving up after retries");
            return Err(TransferError::RetriesExhausted {
                attempts,
                last: Box::new(cause),
            });
        }

        let delay = policy.next_delay(attempt);
        debug!(attempt = attempts, ?delay, error = %cause, "attempt failed, backing off");
        tokio::time::sleep(delay).await;
        attempt = attempts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_steps: u32) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(1), 2.0, max_steps, 0.0).unwrap()
    }

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.multiplier(), 2.0);
        assert_eq!(policy.max_steps(), 5);
        assert_eq!(policy.jitter(), 0.1);
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 2.0, 5, 0.0).unwrap();

        assert_eq!(policy.next_delay(0), Duration::from_secs(2));
        assert_eq!(policy.next_delay(1), Duration::from_secs(4));
        assert_eq!(policy.next_delay(2), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), 10.0, 5, 0.0).unwrap();
        assert_eq!(policy.base_delay(50), MAX_DELAY);
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = BackoffPolicy::new(Duration::from_millis(1000), 1.0, 5, 0.25).unwrap();
        for _ in 0..200 {
            let delay = policy.next_delay(0);
            assert!(delay >= Duration::from_millis(750), "{delay:?}");
            assert!(delay <= Duration::from_millis(1250), "{delay:?}");
        }
    }

    #[test]
    fn rejects_invalid_policies() {
        assert!(BackoffPolicy::new(Duration::from_secs(1), 0.0, 3, 0.1).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(1), f64::NAN, 3, 0.1).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(1), 2.0, 0, 0.1).is_err());

        let clamped = BackoffPolicy::new(Duration::from_secs(1), 2.0, 3, 4.0).unwrap();
        assert_eq!(clamped.jitter(), 1.0);
    }

    #[tokio::test]
    async fn always_retrying_operation_stops_after_max_steps() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(4), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Step::Retry(TransferError::transient("flaky"))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(TransferError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.is_transient());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hard_failure_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(4), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransferError::LocalPathIsDirectory("/tmp/out".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TransferError::LocalPathIsDirectory(_))));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let result = retry(&fast_policy(5), |attempt| async move {
            if attempt < 2 {
                Step::from_result(Err(TransferError::transient("connection reset")))
            } else {
                Step::from_result(Ok(attempt))
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn from_result_splits_transient_and_structural() {
        assert!(matches!(Step::from_result(Ok(1)), Ok(Step::Done(1))));
        assert!(matches!(
            Step::<()>::from_result(Err(TransferError::transient("x"))),
            Ok(Step::Retry(_))
        ));
        assert!(matches!(
            Step::<()>::from_result(Err(TransferError::not_found("b", "k"))),
            Err(TransferError::NotFound { .. })
        ));
    }
}
