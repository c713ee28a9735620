//! Testing utilities and helpers for Steadfast
//!
//! This module provides utilities for testing code that retries operations:
//! a scheduler that records what it was asked to do, a manual cancellation
//! switch, assertion macros for run outcomes, and property-based testing
//! support.
//!
//! # Examples
//!
//! ## RecordingScheduler
//!
//! ```rust
//! use steadfast::retry_to;
//! use steadfast::testing::RecordingScheduler;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let scheduler = Arc::new(RecordingScheduler::current().unwrap());
//!
//! let outcome = retry_to("ping", || async { Ok::<_, std::io::Error>(()) }, || false)
//!     .in_client_session("session-1")
//!     .with_scheduler(scheduler.clone())
//!     .execute()
//!     .await;
//!
//! assert!(outcome.is_ok());
//! assert_eq!(scheduler.submissions(), 1);
//! assert!(scheduler.delays().is_empty());
//! # });
//! ```
//!
//! ## Assertion Macros
//!
//! ```rust
//! use steadfast::{assert_retry_cancelled, assert_retry_ok, ClientDestroyed, RetryError};
//!
//! let ok: Result<u32, RetryError> = Ok(3);
//! assert_retry_ok!(ok, 3);
//!
//! let gone: Result<u32, RetryError> = Err(RetryError::Cancelled(ClientDestroyed::new("s")));
//! assert_retry_cancelled!(gone, "s");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::retry::ConfigError;
use crate::scheduler::{Scheduler, TokioScheduler, Work};

/// A scheduler that records every request before forwarding it.
///
/// Counts immediate submissions and remembers the delay of every delayed
/// one, in order. Combined with tokio's paused clock this shows exactly
/// which waits a run asked for.
pub struct RecordingScheduler {
    inner: Arc<dyn Scheduler>,
    record: Mutex<Record>,
}

#[derive(Debug, Default)]
struct Record {
    submissions: usize,
    delays: Vec<Duration>,
}

impl RecordingScheduler {
    /// Record requests, then forward them to `inner`.
    pub fn new(inner: Arc<dyn Scheduler>) -> Self {
        Self {
            inner,
            record: Mutex::new(Record::default()),
        }
    }

    /// Record requests, then run them on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingScheduler`] outside a tokio runtime.
    pub fn current() -> Result<Self, ConfigError> {
        let inner = TokioScheduler::current()?;
        Ok(Self::new(Arc::new(inner)))
    }

    /// Number of immediate submissions.
    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    /// Delays of every delayed submission, in the order they were requested.
    pub fn delays(&self) -> Vec<Duration> {
        self.lock().delays.clone()
    }

    /// Sum of all requested delays.
    pub fn total_delay(&self) -> Duration {
        self.lock().delays.iter().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RecordingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingScheduler")
            .field("record", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl Scheduler for RecordingScheduler {
    fn submit(&self, work: Work) {
        self.lock().submissions += 1;
        self.inner.submit(work);
    }

    fn schedule_after(&self, delay: Duration, work: Work) {
        self.lock().delays.push(delay);
        self.inner.schedule_after(delay, work);
    }
}

/// A switch standing in for a client's lifecycle.
///
/// Clones share the same switch.
///
/// # Example
///
/// ```rust
/// use steadfast::testing::ManualCancellation;
///
/// let lifecycle = ManualCancellation::new();
/// let check = lifecycle.check();
///
/// assert!(!check());
/// lifecycle.cancel();
/// assert!(check());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualCancellation {
    cancelled: Arc<AtomicBool>,
}

impl ManualCancellation {
    /// Create a switch that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the switch. Runs notice at their next attempt.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// A cancellation check suitable for [`retry_to`](crate::retry_to).
    pub fn check(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let cancelled = Arc::clone(&self.cancelled);
        move || cancelled.load(Ordering::SeqCst)
    }
}

/// Assert that a retry run succeeded, optionally with a specific value.
///
/// # Example
///
/// ```rust
/// use steadfast::{assert_retry_ok, RetryError};
///
/// let outcome: Result<&str, RetryError> = Ok("done");
/// assert_retry_ok!(outcome);
/// ```
#[macro_export]
macro_rules! assert_retry_ok {
    ($outcome:expr) => {
        match $outcome {
            Ok(_) => {}
            Err(e) => panic!("Expected success, got {:?}", e),
        }
    };
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            Ok(value) => assert_eq!(value, $expected),
            Err(e) => panic!("Expected success with {:?}, got {:?}", $expected, e),
        }
    };
}

/// Assert that a retry run ended on a fatal failure, optionally of a specific
/// error type.
///
/// # Example
///
/// ```rust
/// use steadfast::{assert_retry_fatal, PanicError, RetryError};
/// use std::sync::Arc;
///
/// let outcome: Result<(), RetryError> = Err(RetryError::Fatal(Arc::new(PanicError::new("x"))));
/// assert_retry_fatal!(outcome, PanicError);
/// ```
#[macro_export]
macro_rules! assert_retry_fatal {
    ($outcome:expr) => {
        match $outcome {
            Err($crate::RetryError::Fatal(_)) => {}
            other => panic!("Expected a fatal failure, got {:?}", other),
        }
    };
    ($outcome:expr, $kind:ty) => {
        match $outcome {
            Err(e @ $crate::RetryError::Fatal(_)) => {
                if e.downcast_ref::<$kind>().is_none() {
                    panic!(
                        "Expected a fatal {}, got {:?}",
                        stringify!($kind),
                        e
                    );
                }
            }
            other => panic!("Expected a fatal failure, got {:?}", other),
        }
    };
}

/// Assert that a retry run was abandoned, optionally for a specific session.
///
/// # Example
///
/// ```rust
/// use steadfast::{assert_retry_cancelled, ClientDestroyed, RetryError};
///
/// let outcome: Result<(), RetryError> = Err(RetryError::Cancelled(ClientDestroyed::new("abc")));
/// assert_retry_cancelled!(outcome);
/// ```
#[macro_export]
macro_rules! assert_retry_cancelled {
    ($outcome:expr) => {
        match $outcome {
            Err($crate::RetryError::Cancelled(_)) => {}
            other => panic!("Expected cancellation, got {:?}", other),
        }
    };
    ($outcome:expr, $session:expr) => {
        match $outcome {
            Err($crate::RetryError::Cancelled(destroyed)) => {
                assert_eq!(destroyed.session_id(), $session)
            }
            other => panic!("Expected cancellation, got {:?}", other),
        }
    };
}

#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
impl Arbitrary for crate::retry::BackoffTable {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop::collection::vec(0u64..60_000, 1..16)
            .prop_map(|millis| {
                crate::retry::BackoffTable::new(
                    millis.into_iter().map(Duration::from_millis).collect(),
                )
                .unwrap_or_default()
            })
            .boxed()
    }
}
