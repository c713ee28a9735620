//! Staged configuration for retry runs.
//!
//! The builder moves through three stages, each a distinct type:
//!
//! 1. [`retry_to`] names the action and supplies the operation and the
//!    cancellation check ([`NeedsSession`]);
//! 2. [`in_client_session`](RetryBuilder::in_client_session) supplies the
//!    session id ([`NeedsScheduler`]);
//! 3. a scheduler is supplied ([`Ready`]). Only now can the run be
//!    executed, and the optional notifier, classifier and backoff table be
//!    set, in any order and as often as needed (last write wins).
//!
//! Every step borrows the current stage and returns a new value, so a
//! partially configured stage can be kept and reused to derive variants.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::FutureExt;
use tokio::runtime::Handle;

use super::backoff::BackoffTable;
use super::classify::Classifier;
use super::coordinator::{CancellationCheck, Operation, RetryConfig};
use super::error::{BoxError, Cause, ConfigError};
use super::handle::RetryHandle;
use super::notify::ErrorNotifier;
use crate::scheduler::{Scheduler, TokioScheduler};

const UNNAMED_ACTION: &str = "unnamed action";

/// First stage: waiting for the client session.
#[derive(Debug, Clone, Copy)]
pub struct NeedsSession;

/// Second stage: waiting for a scheduler.
#[derive(Debug, Clone, Copy)]
pub struct NeedsScheduler;

/// Final stage: ready to execute.
#[derive(Clone)]
pub struct Ready {
    scheduler: Arc<dyn Scheduler>,
}

impl fmt::Debug for Ready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ready").finish_non_exhaustive()
    }
}

/// Start configuring a retried action.
///
/// `action` labels the action in logs, e.g. `"fetch things"`. `operation` is
/// invoked once per attempt until it yields a value; a value of `()` or
/// `None` is still a success. `is_cancelled` is polled before every attempt
/// and must be safe to call from any thread.
///
/// # Examples
///
/// ```rust
/// use steadfast::{retry_to, BackoffTable};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let calls = Arc::new(AtomicU32::new(0));
///
/// let value = retry_to(
///     "fetch things",
///     {
///         let calls = calls.clone();
///         move || {
///             let calls = calls.clone();
///             async move {
///                 if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///                     Err("not yet")
///                 } else {
///                     Ok(42)
///                 }
///             }
///         }
///     },
///     || false,
/// )
/// .in_client_session("session-1")
/// .with_current_runtime()
/// .unwrap()
/// .with_backoff(BackoffTable::from_millis(&[1]).unwrap())
/// .execute()
/// .await;
///
/// assert_eq!(value.unwrap(), 42);
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # });
/// ```
pub fn retry_to<T, F, Fut, E, C>(
    action: impl Into<String>,
    operation: F,
    is_cancelled: C,
) -> RetryBuilder<T, NeedsSession>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
    C: Fn() -> bool + Send + Sync + 'static,
{
    let action = action.into();
    let action: Arc<str> = if action.is_empty() {
        Arc::from(UNNAMED_ACTION)
    } else {
        Arc::from(action)
    };
    let operation: Operation<T> = Arc::new(move || operation().map(|r| r.map_err(Into::into)).boxed());

    RetryBuilder {
        action,
        operation,
        is_cancelled: Arc::new(is_cancelled),
        session_id: Arc::from(""),
        notifier: None,
        classifier: Classifier::default(),
        backoff: BackoffTable::default(),
        stage: NeedsSession,
    }
}

/// A retry configuration in progress. `Stage` tracks which mandatory parts
/// have been supplied.
pub struct RetryBuilder<T, Stage> {
    action: Arc<str>,
    operation: Operation<T>,
    is_cancelled: CancellationCheck,
    session_id: Arc<str>,
    notifier: Option<ErrorNotifier>,
    classifier: Classifier,
    backoff: BackoffTable,
    stage: Stage,
}

impl<T, Stage: Clone> Clone for RetryBuilder<T, Stage> {
    fn clone(&self) -> Self {
        self.advance(self.stage.clone())
    }
}

impl<T, Stage: fmt::Debug> fmt::Debug for RetryBuilder<T, Stage> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryBuilder")
            .field("action", &self.action)
            .field("session_id", &self.session_id)
            .field("notifier", &self.notifier)
            .field("classifier", &self.classifier)
            .field("backoff", &self.backoff)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl<T, Stage> RetryBuilder<T, Stage> {
    /// The label used for the action in logs.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Copy every setting into a builder at `stage`.
    fn advance<Next>(&self, stage: Next) -> RetryBuilder<T, Next> {
        RetryBuilder {
            action: Arc::clone(&self.action),
            operation: Arc::clone(&self.operation),
            is_cancelled: Arc::clone(&self.is_cancelled),
            session_id: Arc::clone(&self.session_id),
            notifier: self.notifier.clone(),
            classifier: self.classifier.clone(),
            backoff: self.backoff.clone(),
            stage,
        }
    }
}

impl<T> RetryBuilder<T, NeedsSession> {
    /// Set the client session runs belong to. Used to correlate logs and to
    /// identify the client in cancellation failures; may be empty.
    pub fn in_client_session(&self, session_id: impl Into<String>) -> RetryBuilder<T, NeedsScheduler> {
        let mut next = self.advance(NeedsScheduler);
        next.session_id = Arc::from(session_id.into());
        next
    }
}

impl<T> RetryBuilder<T, NeedsScheduler> {
    /// Drive attempts and waits through `scheduler`.
    ///
    /// The scheduler stays shared; runs never shut it down.
    pub fn with_scheduler(&self, scheduler: Arc<dyn Scheduler>) -> RetryBuilder<T, Ready> {
        self.advance(Ready { scheduler })
    }

    /// Drive attempts and waits as tasks on the runtime behind `handle`.
    pub fn with_runtime(&self, handle: Handle) -> RetryBuilder<T, Ready> {
        self.with_scheduler(Arc::new(TokioScheduler::new(handle)))
    }

    /// Drive attempts and waits on the tokio runtime the caller runs in.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingScheduler`] when called outside a
    /// runtime, before any attempt is made.
    pub fn with_current_runtime(&self) -> Result<RetryBuilder<T, Ready>, ConfigError> {
        let scheduler = TokioScheduler::current()?;
        Ok(self.with_scheduler(Arc::new(scheduler)))
    }
}

impl<T> RetryBuilder<T, Ready> {
    /// Observe the cause of every failed attempt.
    ///
    /// The notifier runs on the scheduler; a panic inside it is logged and
    /// otherwise ignored.
    pub fn notify_on_error<F>(&self, notifier: F) -> Self
    where
        F: Fn(Cause<'_>) + Send + Sync + 'static,
    {
        let mut next = self.clone();
        next.notifier = Some(ErrorNotifier::new(notifier));
        next
    }

    /// Remove a previously set notifier.
    pub fn without_notifier(&self) -> Self {
        let mut next = self.clone();
        next.notifier = None;
        next
    }

    /// Decide which failures are worth another attempt. Failures the
    /// predicate rejects end the run. Every failure is recoverable unless
    /// this is set.
    pub fn is_recoverable<F>(&self, predicate: F) -> Self
    where
        F: Fn(Cause<'_>) -> bool + Send + Sync + 'static,
    {
        self.with_classifier(Classifier::new(predicate))
    }

    /// Use a prepared [`Classifier`].
    pub fn with_classifier(&self, classifier: Classifier) -> Self {
        let mut next = self.clone();
        next.classifier = classifier;
        next
    }

    /// Replace the default `1, 1, 2, 3, 5, 8, 13` second backoff table.
    pub fn with_backoff(&self, backoff: BackoffTable) -> Self {
        let mut next = self.clone();
        next.backoff = backoff;
        next
    }

    /// Freeze the configuration.
    pub fn build(&self) -> RetryConfig<T> {
        RetryConfig {
            action: Arc::clone(&self.action),
            session_id: Arc::clone(&self.session_id),
            operation: Arc::clone(&self.operation),
            is_cancelled: Arc::clone(&self.is_cancelled),
            scheduler: Arc::clone(&self.stage.scheduler),
            notifier: self.notifier.clone(),
            classifier: self.classifier.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<T: Send + 'static> RetryBuilder<T, Ready> {
    /// Start a run of the configured action.
    pub fn execute(&self) -> RetryHandle<T> {
        self.build().execute()
    }
}
