use std::time::Duration;

use log::{debug, warn};

pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_BACKOFF_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles the delay after every attempt, capped at 30 seconds.
    Exponential,
}

/// Bounded polling schedule: `max_attempts` checks with a delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    /// Delay to wait after the given (1-based) attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.interval
                    .checked_mul(factor)
                    .map_or(MAX_BACKOFF_INTERVAL, |delay| delay.min(MAX_BACKOFF_INTERVAL))
            }
        }
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

/// Calls `check` until it yields a value or the policy runs out of attempts.
///
/// `check` returns:
/// - `Ok(Some(value))` to stop polling,
/// - `Ok(None)` to try again after the policy's delay,
/// - `Err(_)` to stop immediately with that error.
///
/// No delay follows the final attempt.
pub fn poll_until<T, E, F>(
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut check: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Result<Option<T>, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        debug!("[poll] {label}: attempt {attempt}/{max_attempts}");
        if let Some(value) = check(attempt)? {
            debug!("[poll] {label}: settled after {attempt} attempt(s)");
            return Ok(PollOutcome::Ready { value, attempts: attempt });
        }
        if attempt < max_attempts {
            let delay = policy.delay_after(attempt);
            debug!(
                "[poll] {label}: not settled yet, waiting {}ms",
                delay.as_millis()
            );
            sleeper.sleep(delay);
        }
    }

    warn!("[poll] {label}: gave up after {max_attempts} attempt(s)");
    Ok(PollOutcome::Exhausted {
        attempts: max_attempts,
    })
}
