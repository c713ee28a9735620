//! The scheduling seam retry runs are driven through.
//!
//! A retry run owns no threads. Every attempt, and every wait before the next
//! attempt, is handed to a [`Scheduler`] as a unit of [`Work`]. The scheduler
//! is shared and owned by the caller: runs never shut it down and never
//! assume they are its only users.
//!
//! [`TokioScheduler`] runs work on a tokio runtime. Anything else that can
//! run a boxed future now or after a delay can implement the trait.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::retry::ConfigError;

/// A unit of work handed to a scheduler.
pub type Work = BoxFuture<'static, ()>;

/// Runs work immediately or after a delay.
///
/// Implementations must not block the caller: `submit` and `schedule_after`
/// only enqueue.
pub trait Scheduler: Send + Sync {
    /// Run `work` as soon as possible.
    fn submit(&self, work: Work);

    /// Run `work` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, work: Work);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn submit(&self, work: Work) {
        (**self).submit(work)
    }

    fn schedule_after(&self, delay: Duration, work: Work) {
        (**self).schedule_after(delay, work)
    }
}

/// Schedules work as tasks on a tokio runtime.
///
/// Delayed work is a spawned task that sleeps first, so waiting never holds a
/// worker thread.
///
/// # Examples
///
/// ```rust
/// use steadfast::{Scheduler, TokioScheduler};
/// use futures::FutureExt;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let scheduler = TokioScheduler::current().unwrap();
/// let (tx, rx) = tokio::sync::oneshot::channel();
///
/// scheduler.schedule_after(
///     Duration::from_millis(5),
///     async move {
///         let _ = tx.send("ran");
///     }
///     .boxed(),
/// );
///
/// assert_eq!(rx.await.unwrap(), "ran");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedule onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingScheduler`] outside a tokio runtime.
    pub fn current() -> Result<Self, ConfigError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ConfigError::MissingScheduler)
    }

    /// The runtime this scheduler spawns onto.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Scheduler for TokioScheduler {
    fn submit(&self, work: Work) {
        self.handle.spawn(work);
    }

    fn schedule_after(&self, delay: Duration, work: Work) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        });
    }
}
