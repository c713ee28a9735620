//! # Steadfast
//!
//! > *Keep trying, politely.*
//!
//! A Rust library for retrying asynchronous operations on a shared scheduler.
//!
//! ## Philosophy
//!
//! A retry run is configured once, executed on someone else's scheduler, and
//! settles exactly once:
//! - **Staged**: the builder will not hand out an executable run until the
//!   action, session and scheduler are known
//! - **Bounded waits**: delays come from a table that saturates, never from an
//!   unbounded formula
//! - **Cooperative**: cancellation is polled between attempts, never forced
//!
//! ## Quick Example
//!
//! ```rust
//! use steadfast::retry_to;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let destroyed = Arc::new(AtomicBool::new(false));
//!
//! let greeting = retry_to(
//!     "fetch greeting",
//!     || async { Ok::<_, std::io::Error>("hello") },
//!     {
//!         let destroyed = destroyed.clone();
//!         move || destroyed.load(Ordering::SeqCst)
//!     },
//! )
//! .in_client_session("session-1")
//! .with_current_runtime()
//! .unwrap()
//! .execute()
//! .await;
//!
//! assert_eq!(greeting.unwrap(), "hello");
//! # });
//! ```
//!
//! See the [`retry`] module for the full picture, and `demos/` for runnable
//! programs.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod retry;
pub mod scheduler;
pub mod testing;

// Re-exports
pub use retry::{
    retry_to, BackoffTable, BoxError, Cause, Classifier, ClientDestroyed, CompletionError,
    ConfigError, ErrorNotifier, PanicError, RetryBuilder, RetryConfig, RetryError, RetryHandle,
};
pub use scheduler::{Scheduler, TokioScheduler, Work};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::retry::{
        retry_to, BackoffTable, Cause, Classifier, RetryError, RetryHandle,
    };
    pub use crate::scheduler::{Scheduler, TokioScheduler};
}
