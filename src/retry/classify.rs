//! Deciding whether a failed attempt is worth another try.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use super::error::{BoxError, Cause, CompletionError};

/// A predicate over failure causes: `true` means recoverable.
///
/// Classifiers are invoked once per failed attempt, always on the unwrapped
/// cause (see [`root_cause`]). The default treats every failure as
/// recoverable, so a run only ends on success or cancellation.
///
/// # Examples
///
/// ```rust
/// use steadfast::Classifier;
/// use std::fmt;
///
/// #[derive(Debug)]
/// struct AuthError;
///
/// impl fmt::Display for AuthError {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "unauthorized")
///     }
/// }
///
/// impl std::error::Error for AuthError {}
///
/// let classifier = Classifier::fatal_on::<AuthError>();
///
/// assert!(!classifier.is_recoverable(&AuthError));
/// assert!(classifier.is_recoverable(&std::io::Error::other("reset")));
/// ```
#[derive(Clone)]
pub struct Classifier {
    predicate: Arc<dyn Fn(Cause<'_>) -> bool + Send + Sync>,
}

impl Classifier {
    /// Create a classifier from a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(Cause<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Every failure is recoverable.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Every failure is fatal.
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    /// Failures of type `E` are fatal, everything else is recoverable.
    pub fn fatal_on<E: Error + 'static>() -> Self {
        Self::new(|cause| !cause.is::<E>())
    }

    /// Returns true if another attempt should be made after `cause`.
    pub fn is_recoverable(&self, cause: Cause<'_>) -> bool {
        (self.predicate)(cause)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

/// The cause to classify and report for a failed attempt.
///
/// Strips exactly one [`CompletionError`] layer; any other error is its own
/// cause.
pub fn root_cause(error: &BoxError) -> Cause<'_> {
    match error.downcast_ref::<CompletionError>() {
        Some(completion) => completion.cause(),
        None => error.as_ref(),
    }
}
