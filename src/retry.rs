use std::time::Duration;

use log::warn;
use rand::Rng;

const DEFAULT_SLEEP_INITIAL_DURATION: Duration = Duration::from_millis(200);
const DEFAULT_SLEEP_BACKOFF_FACTOR: f64 = 1.5;
const DEFAULT_JITTER: Duration = Duration::from_millis(100);

#[allow(clippy::module_name_repetitions)]
pub struct RetryConfig {
    sleep_duration: Duration,
    backoff_factor: f64,
    jitter: Duration,
}

impl RetryConfig {
    pub fn new(sleep_duration: Duration, backoff_factor: f64, jitter: Duration) -> Self {
        Self {
            sleep_duration,
            backoff_factor,
            jitter,
        }
    }

    pub fn sleep_after_error(&mut self) {
        std::thread::sleep(self.sleep_duration);
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::rng().random_range(Duration::ZERO..self.jitter)
        };
        self.sleep_duration = self.sleep_duration.mul_f64(self.backoff_factor) + jitter;
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_SLEEP_INITIAL_DURATION,
            DEFAULT_SLEEP_BACKOFF_FACTOR,
            DEFAULT_JITTER,
        )
    }
}

/// Runs `func` until it succeeds, gives up or `max_retries` extra attempts are spent.
/// Only errors for which `is_retriable` holds are retried.
pub fn execute_with_retries<T, E>(
    mut func: impl FnMut() -> Result<T, E>,
    is_retriable: impl Fn(&E) -> bool,
    mut retry_config: RetryConfig,
    max_retries: usize,
) -> Result<T, E> {
    let mut exec_result = func();
    for attempt_idx in 0..max_retries {
        match &exec_result {
            Ok(_) => return exec_result,
            Err(e) if !is_retriable(e) => return exec_result,
            Err(_) => {}
        }
        warn!("Attempt {attempt_idx}: retrying operation after an error...");
        retry_config.sleep_after_error();
        exec_result = func();
    }

    exec_result
}
