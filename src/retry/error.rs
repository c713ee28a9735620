//! Error types for retry runs.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A type-erased error, as produced by a failed attempt.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A borrowed failure cause, as seen by classifiers and notifiers.
///
/// Concrete error kinds can be recovered with `downcast_ref::<E>()` or
/// checked with `is::<E>()`.
pub type Cause<'a> = &'a (dyn Error + Send + Sync + 'static);

/// The failure a retry run settles with.
///
/// A run resolves with exactly one of these, or with its success value.
///
/// # Examples
///
/// ```rust
/// use steadfast::{retry_to, BackoffTable, Classifier, RetryError};
///
/// # tokio_test::block_on(async {
/// let outcome = retry_to("load profile", || async { Err::<(), _>("denied") }, || false)
///     .in_client_session("session-1")
///     .with_current_runtime()
///     .unwrap()
///     .with_classifier(Classifier::never())
///     .execute()
///     .await;
///
/// match outcome {
///     Err(RetryError::Fatal(cause)) => assert_eq!(cause.to_string(), "denied"),
///     other => panic!("expected a fatal failure, got {:?}", other),
/// }
/// # });
/// ```
#[derive(Debug, Clone)]
pub enum RetryError {
    /// The classifier rejected a failure. Holds the failure exactly as the
    /// attempt produced it, including any completion wrapper.
    Fatal(Arc<dyn Error + Send + Sync>),
    /// The cancellation check reported the client as gone before an attempt.
    Cancelled(ClientDestroyed),
    /// The scheduler dropped the run before it settled.
    Interrupted,
}

impl RetryError {
    /// Returns true if the run ended on a failure the classifier rejected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns true if the run was abandoned by the cancellation check.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if the scheduler dropped the run.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// The failure that ended the run, if it was fatal.
    pub fn fatal_cause(&self) -> Option<Cause<'_>> {
        match self {
            Self::Fatal(cause) => Some(cause.as_ref()),
            Self::Cancelled(_) | Self::Interrupted => None,
        }
    }

    /// Look up a concrete error kind in a fatal failure.
    ///
    /// Checks the stored failure first and, if that is a [`CompletionError`],
    /// the cause it wraps.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        let cause = self.fatal_cause()?;
        cause.downcast_ref::<E>().or_else(|| {
            cause
                .downcast_ref::<CompletionError>()
                .and_then(|completion| completion.cause().downcast_ref::<E>())
        })
    }
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal(cause) => write!(f, "permanently failed: {}", cause),
            Self::Cancelled(destroyed) => write!(f, "{}", destroyed),
            Self::Interrupted => write!(f, "retry run was dropped by its scheduler"),
        }
    }
}

impl Error for RetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fatal(cause) => Some(cause.as_ref() as &(dyn Error + 'static)),
            Self::Cancelled(destroyed) => Some(destroyed),
            Self::Interrupted => None,
        }
    }
}

/// The client owning a retry run was destroyed, so the run was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDestroyed {
    session_id: String,
}

impl ClientDestroyed {
    /// Create the failure for the given client session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    /// The session the abandoned run belonged to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Display for ClientDestroyed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "client <{}>: the client was destroyed",
            self.session_id
        )
    }
}

impl Error for ClientDestroyed {}

/// One layer of wrapping added by asynchronous completion.
///
/// Classifiers and notifiers always see the wrapped cause; a fatal run
/// resolves with the wrapper itself. Operations can return this to mark a
/// failure that surfaced through some other future's completion.
#[derive(Debug)]
pub struct CompletionError {
    cause: BoxError,
}

impl CompletionError {
    /// Wrap a cause.
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    /// The wrapped cause.
    pub fn cause(&self) -> Cause<'_> {
        self.cause.as_ref()
    }

    /// Unwrap, discarding the wrapper.
    pub fn into_cause(self) -> BoxError {
        self.cause
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asynchronous completion failed: {}", self.cause)
    }
}

impl Error for CompletionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref() as &(dyn Error + 'static))
    }
}

/// A panic caught while running user code, turned into an ordinary failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Create from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create from the payload returned by `catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&'static str>() {
                Some(message) => (*message).to_string(),
                None => "Box<dyn Any>".to_string(),
            },
        };
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panicked: {}", self.message)
    }
}

impl Error for PanicError {}

/// A retry configuration that cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A backoff table needs at least one wait.
    EmptyBackoff,
    /// No scheduler was supplied and none could be found.
    MissingScheduler,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBackoff => write!(f, "missing required configuration: backoff table is empty"),
            Self::MissingScheduler => {
                write!(f, "missing required configuration: no scheduler available")
            }
        }
    }
}

impl Error for ConfigError {}
