//! Side-channel observer for failed attempts.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::error::{Cause, PanicError};

/// Best-effort observer invoked with the cause of every failed attempt.
///
/// The notifier runs on whatever thread the scheduler uses. It cannot change
/// the outcome of a run: a panic inside it is caught, logged and dropped.
///
/// # Examples
///
/// ```rust
/// use steadfast::ErrorNotifier;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let seen = Arc::new(AtomicU32::new(0));
/// let notifier = ErrorNotifier::new({
///     let seen = seen.clone();
///     move |_cause| {
///         seen.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// notifier.notify(&std::io::Error::other("reset"));
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct ErrorNotifier {
    consumer: Arc<dyn Fn(Cause<'_>) + Send + Sync>,
}

impl ErrorNotifier {
    /// Create a notifier from a consumer.
    pub fn new<F>(consumer: F) -> Self
    where
        F: Fn(Cause<'_>) + Send + Sync + 'static,
    {
        Self {
            consumer: Arc::new(consumer),
        }
    }

    /// Hand `cause` to the consumer, containing any panic it raises.
    pub fn notify(&self, cause: Cause<'_>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.consumer)(cause)));
        if let Err(payload) = outcome {
            let panic = PanicError::from_payload(payload);
            tracing::warn!(
                error = %panic,
                "error notifier panicked: {}. The notifier runs on the retry scheduler, so the \
                 panic never reaches the caller; handle the failure inside the notifier instead.",
                panic.message()
            );
        }
    }
}

impl fmt::Debug for ErrorNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorNotifier").finish_non_exhaustive()
    }
}
