//! Backoff table: how long to wait after each failed attempt.

use std::time::Duration;

use super::error::ConfigError;

const DEFAULT_WAIT_SECS: [u64; 7] = [1, 1, 2, 3, 5, 8, 13];

/// An ordered table of waits, indexed by the attempt that just failed.
///
/// Tables are pure data: looking up a delay has no side effects and never
/// fails. Attempts past the end of the table reuse the last wait,
/// so the delay saturates instead of growing without bound.
///
/// # Examples
///
/// ```rust
/// use steadfast::BackoffTable;
/// use std::time::Duration;
///
/// let table = BackoffTable::default();
///
/// assert_eq!(table.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(table.delay_for_attempt(5), Duration::from_secs(5));
/// assert_eq!(table.delay_for_attempt(7), Duration::from_secs(13));
/// assert_eq!(table.delay_for_attempt(100), Duration::from_secs(13)); // saturated
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffTable {
    waits: Vec<Duration>,
}

impl Default for BackoffTable {
    /// The `1, 1, 2, 3, 5, 8, 13` second table.
    fn default() -> Self {
        Self {
            waits: DEFAULT_WAIT_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

impl BackoffTable {
    /// Create a table from explicit waits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyBackoff`] if `waits` is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use steadfast::{BackoffTable, ConfigError};
    /// use std::time::Duration;
    ///
    /// let table = BackoffTable::new(vec![Duration::from_millis(250), Duration::from_secs(1)]).unwrap();
    /// assert_eq!(table.steps(), 2);
    ///
    /// assert_eq!(BackoffTable::new(Vec::new()), Err(ConfigError::EmptyBackoff));
    /// ```
    pub fn new(waits: Vec<Duration>) -> Result<Self, ConfigError> {
        if waits.is_empty() {
            Err(ConfigError::EmptyBackoff)
        } else {
            Ok(Self { waits })
        }
    }

    /// Create a table from whole seconds.
    pub fn from_secs(secs: &[u64]) -> Result<Self, ConfigError> {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Create a table from milliseconds.
    pub fn from_millis(millis: &[u64]) -> Result<Self, ConfigError> {
        Self::new(millis.iter().copied().map(Duration::from_millis).collect())
    }

    /// Create a table following the Fibonacci sequence: `unit * fib(k)` for
    /// `k` in `1..=steps`.
    ///
    /// A `steps` of zero still yields a one-entry table.
    ///
    /// ```rust
    /// use steadfast::BackoffTable;
    /// use std::time::Duration;
    ///
    /// let table = BackoffTable::fibonacci(Duration::from_secs(1), 7);
    /// assert_eq!(table, BackoffTable::default());
    /// ```
    pub fn fibonacci(unit: Duration, steps: usize) -> Self {
        let steps = u32::try_from(steps.max(1)).unwrap_or(u32::MAX);
        Self {
            waits: (1..=steps)
                .map(|k| unit.saturating_mul(fibonacci(k)))
                .collect(),
        }
    }

    /// The wait after attempt `attempt` (1-indexed) failed.
    ///
    /// The index is clamped into the table: attempt `0` gets the first wait
    /// and every attempt past the end gets the last one.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let last = self.waits.len() - 1;
        let index = usize::try_from(attempt.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .min(last);
        self.waits[index]
    }

    /// Total time spent waiting if the first `failures` attempts all fail
    /// recoverably.
    pub fn total_for(&self, failures: u32) -> Duration {
        let failures = usize::try_from(failures).unwrap_or(usize::MAX);
        let covered = failures.min(self.waits.len());
        let listed: Duration = self.waits[..covered].iter().sum();
        let beyond = u32::try_from(failures - covered).unwrap_or(u32::MAX);
        listed.saturating_add(self.max_delay().saturating_mul(beyond))
    }

    /// Number of distinct entries before the table saturates.
    pub fn steps(&self) -> usize {
        self.waits.len()
    }

    /// The last wait, reused for every attempt past the end of the table.
    pub fn max_delay(&self) -> Duration {
        self.delay_for_attempt(u32::MAX)
    }

    /// The table entries in attempt order.
    pub fn waits(&self) -> &[Duration] {
        &self.waits
    }
}

/// Calculate the nth Fibonacci number.
fn fibonacci(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut a = 0u32;
    let mut b = 1u32;
    for _ in 1..n {
        let temp = a.saturating_add(b);
        a = b;
        b = temp;
    }
    b
}
