//! The attempt loop.
//!
//! A run moves through `attempting(n)`, optionally `waiting(n)`, and settles
//! in exactly one of succeeded, fatally failed, or cancelled. Each attempt is
//! a unit of work on the configured scheduler; the wait between attempts is a
//! delayed submission, never a blocked thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::Instrument;

use super::backoff::BackoffTable;
use super::classify::{root_cause, Classifier};
use super::error::{
    BoxError, Cause, ClientDestroyed, CompletionError, PanicError, RetryError,
};
use super::handle::{self, Resolver, RetryHandle};
use super::notify::ErrorNotifier;
use crate::scheduler::{Scheduler, Work};

pub(crate) type Operation<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

pub(crate) type CancellationCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// A complete, immutable retry configuration.
///
/// Produced by [`RetryBuilder::build`](super::RetryBuilder::build). Every call
/// to [`execute`](Self::execute) starts an independent run; nothing is shared
/// between runs except the scheduler and the callables themselves.
pub struct RetryConfig<T> {
    pub(crate) action: Arc<str>,
    pub(crate) session_id: Arc<str>,
    pub(crate) operation: Operation<T>,
    pub(crate) is_cancelled: CancellationCheck,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) notifier: Option<ErrorNotifier>,
    pub(crate) classifier: Classifier,
    pub(crate) backoff: BackoffTable,
}

impl<T> Clone for RetryConfig<T> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
            session_id: Arc::clone(&self.session_id),
            operation: Arc::clone(&self.operation),
            is_cancelled: Arc::clone(&self.is_cancelled),
            scheduler: Arc::clone(&self.scheduler),
            notifier: self.notifier.clone(),
            classifier: self.classifier.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<T> fmt::Debug for RetryConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("action", &self.action)
            .field("session_id", &self.session_id)
            .field("notifier", &self.notifier)
            .field("classifier", &self.classifier)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<T> RetryConfig<T> {
    /// The label used for the retried action in logs.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The client session runs of this configuration belong to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The waits between attempts.
    pub fn backoff(&self) -> &BackoffTable {
        &self.backoff
    }
}

impl<T: Send + 'static> RetryConfig<T> {
    /// Start a run and return its handle.
    ///
    /// The first attempt is submitted to the scheduler; nothing runs on the
    /// calling thread.
    pub fn execute(&self) -> RetryHandle<T> {
        let (resolver, handle) = handle::channel();
        let run = Run {
            config: self.clone(),
            resolver,
            parent: tracing::Span::current(),
        };
        self.scheduler.submit(run.attempt(1));
        handle
    }
}

/// One execution of a configuration. Owns the resolver, so it can settle at
/// most once; every path through [`Run::attempt`] either settles or hands the
/// run on to the next attempt.
struct Run<T> {
    config: RetryConfig<T>,
    resolver: Resolver<T>,
    // attempt spans are siblings under the span `execute` was called in
    parent: tracing::Span,
}

impl<T: Send + 'static> Run<T> {
    fn attempt(self, attempt: u32) -> Work {
        let span = tracing::info_span!(
            parent: &self.parent,
            "retry",
            session_id = %self.config.session_id,
            action = %self.config.action,
            attempt
        );
        async move { self.run_attempt(attempt).await }
            .instrument(span)
            .boxed()
    }

    async fn run_attempt(self, attempt: u32) {
        if self.cancelled() {
            tracing::debug!("client is gone, abandoning");
            let destroyed = ClientDestroyed::new(self.config.session_id.as_ref());
            self.resolver.resolve(Err(RetryError::Cancelled(destroyed)));
            return;
        }

        tracing::debug!("starting attempt");
        let failure = match self.invoke().await {
            Ok(value) => {
                tracing::debug!("attempt succeeded");
                self.resolver.resolve(Ok(value));
                return;
            }
            Err(failure) => failure,
        };

        let cause = root_cause(&failure);
        if let Some(notifier) = &self.config.notifier {
            notifier.notify(cause);
        }

        if !self.recoverable(cause) {
            tracing::error!(
                error = %failure,
                "client <{}>: permanently failed to <{}>",
                self.config.session_id,
                self.config.action
            );
            self.resolver
                .resolve(Err(RetryError::Fatal(Arc::from(failure))));
            return;
        }

        let delay = self.config.backoff.delay_for_attempt(attempt);
        tracing::error!(
            error = %failure,
            "client <{}>: failed to <{}>",
            self.config.session_id,
            self.config.action
        );
        tracing::info!(
            delay_secs = delay.as_secs_f64(),
            "client <{}>: waiting {:?} before retrying to <{}>",
            self.config.session_id,
            delay,
            self.config.action
        );

        let scheduler = Arc::clone(&self.config.scheduler);
        scheduler.schedule_after(delay, self.attempt(attempt + 1));
    }

    /// Polls the cancellation check. A panicking check counts as cancelled.
    fn cancelled(&self) -> bool {
        panic::catch_unwind(AssertUnwindSafe(|| (self.config.is_cancelled)())).unwrap_or_else(
            |payload| {
                tracing::error!(
                    error = %PanicError::from_payload(payload),
                    "cancellation check panicked, treating the client as gone"
                );
                true
            },
        )
    }

    /// A panicking classifier counts as rejecting the failure.
    fn recoverable(&self, cause: Cause<'_>) -> bool {
        panic::catch_unwind(AssertUnwindSafe(|| self.config.classifier.is_recoverable(cause)))
            .unwrap_or_else(|payload| {
                tracing::error!(
                    error = %PanicError::from_payload(payload),
                    "error classifier panicked, treating the failure as fatal"
                );
                false
            })
    }

    /// Invoke the operation once.
    ///
    /// A panic while building the future is a plain failure. A panic while
    /// the future is polled surfaces through completion, so it arrives
    /// wrapped in a [`CompletionError`].
    async fn invoke(&self) -> Result<T, BoxError> {
        let future = match panic::catch_unwind(AssertUnwindSafe(|| (self.config.operation)())) {
            Ok(future) => future,
            Err(payload) => return Err(Box::new(PanicError::from_payload(payload))),
        };
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Err(Box::new(CompletionError::new(PanicError::from_payload(
                payload,
            )))),
        }
    }
}
