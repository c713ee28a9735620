//! Retrying asynchronous operations until they produce a result.
//!
//! A retry run invokes an operation, and if it fails, asks a [`Classifier`]
//! whether the failure is worth another attempt. Recoverable failures are
//! retried after a wait taken from a [`BackoffTable`]; the first fatal
//! failure ends the run. Before every attempt the run polls a cancellation
//! check supplied by the owner of the operation, and abandons itself with
//! [`ClientDestroyed`] once the owner is gone.
//!
//! - **No attempt limit**: the backoff table saturates at its last entry, and
//!   only the classifier or the cancellation check end a failing run. Encode
//!   a ceiling in either if you need one.
//! - **Cooperative cancellation**: the check runs at attempt boundaries. An
//!   attempt in flight is never aborted, so observing cancellation can take
//!   up to one attempt plus one wait.
//! - **Side-channel errors**: individual failures never reach the caller.
//!   They are logged and handed to the optional [`ErrorNotifier`].
//!
//! # Quick Start
//!
//! ```rust
//! use steadfast::{retry_to, BackoffTable, Classifier};
//! use std::fmt;
//!
//! #[derive(Debug)]
//! struct AuthError;
//!
//! impl fmt::Display for AuthError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "unauthorized")
//!     }
//! }
//!
//! impl std::error::Error for AuthError {}
//!
//! # tokio_test::block_on(async {
//! let outcome = retry_to("log in", || async { Err::<(), _>(AuthError) }, || false)
//!     .in_client_session("session-7")
//!     .with_current_runtime()
//!     .unwrap()
//!     .with_classifier(Classifier::fatal_on::<AuthError>())
//!     .execute()
//!     .await;
//!
//! let err = outcome.unwrap_err();
//! assert!(err.is_fatal());
//! assert!(err.downcast_ref::<AuthError>().is_some());
//! # });
//! ```
//!
//! # Failure shapes
//!
//! An attempt fails when the operation's future resolves with an error, or
//! when the operation panics. A panic while *creating* the future is reported
//! as a [`PanicError`]; a panic while the future is *polled* surfaces through
//! completion and arrives wrapped in a [`CompletionError`]. Classifiers and
//! notifiers always see the cause with one completion layer stripped, while a
//! fatal run resolves with the failure exactly as it arrived.

mod backoff;
mod builder;
mod classify;
mod coordinator;
mod error;
mod handle;
mod notify;
#[cfg(feature = "serde")]
mod serde_impl;

pub use backoff::BackoffTable;
pub use builder::{retry_to, NeedsScheduler, NeedsSession, Ready, RetryBuilder};
pub use classify::{root_cause, Classifier};
pub use coordinator::RetryConfig;
pub use error::{
    BoxError, Cause, ClientDestroyed, CompletionError, ConfigError, PanicError, RetryError,
};
pub use handle::RetryHandle;
pub use notify::ErrorNotifier;

#[cfg(test)]
mod tests;
