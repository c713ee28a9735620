//! Retry Patterns Example
//!
//! Demonstrates retrying asynchronous operations with Steadfast.
//! Shows practical patterns including:
//! - Basic retry with the default backoff table
//! - Custom backoff tables
//! - Separating recoverable from fatal failures
//! - Observing failures with a notifier
//! - Abandoning a run when its client goes away
//!
//! Retry log lines are printed at INFO level alongside the output.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use steadfast::prelude::*;

// ==================== Basic Retry ====================

/// Example 1: Basic retry
///
/// An operation that fails twice, waiting out the first two entries of the
/// default table (one second each).
async fn example_basic_retry() {
    println!("\n=== Example 1: Basic Retry ===");

    let attempts = Arc::new(AtomicU32::new(0));

    let outcome = retry_to(
        "fetch greeting",
        {
            let attempts = attempts.clone();
            move || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    println!("  Attempt {}", n + 1);
                    if n < 2 {
                        Err("transient failure")
                    } else {
                        Ok("hello!")
                    }
                }
            }
        },
        || false,
    )
    .in_client_session("demo-1")
    .with_current_runtime()
    .expect("running inside tokio")
    .execute()
    .await;

    match outcome {
        Ok(value) => println!(
            "Success after {} attempts: {}",
            attempts.load(Ordering::SeqCst),
            value
        ),
        Err(e) => println!("Run ended: {}", e),
    }
}

// ==================== Backoff Tables ====================

/// Example 2: Backoff tables
///
/// Shows the waits a table produces, including saturation.
async fn example_backoff_tables() {
    println!("\n=== Example 2: Backoff Tables ===");

    let default = BackoffTable::default();
    println!("Default table:");
    for attempt in 1..=9 {
        println!(
            "  After attempt {}: wait {:?}",
            attempt,
            default.delay_for_attempt(attempt)
        );
    }
    println!("  Total for 9 failures: {:?}", default.total_for(9));

    let quick = BackoffTable::fibonacci(Duration::from_millis(50), 5);
    println!("Fibonacci table in 50ms steps:");
    for wait in quick.waits() {
        println!("  {:?}", wait);
    }
    println!("  Saturates at {:?}", quick.max_delay());
}

// ==================== Classification ====================

#[derive(Debug)]
enum HttpError {
    Timeout,
    ServerError(u16),
    ClientError(u16),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Timeout => write!(f, "request timed out"),
            HttpError::ServerError(code) => write!(f, "server error: {}", code),
            HttpError::ClientError(code) => write!(f, "client error: {}", code),
        }
    }
}

impl std::error::Error for HttpError {}

// Only retry on timeouts and server errors, not client errors
fn is_retryable(cause: Cause<'_>) -> bool {
    matches!(
        cause.downcast_ref::<HttpError>(),
        Some(HttpError::Timeout | HttpError::ServerError(_))
    )
}

/// Example 3: Recoverable versus fatal failures
async fn example_classification() {
    println!("\n=== Example 3: Classification ===");

    let attempts = Arc::new(AtomicU32::new(0));

    let outcome = retry_to(
        "call api",
        {
            let attempts = attempts.clone();
            move || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    println!("  HTTP request attempt {}", n + 1);
                    match n {
                        0 => Err(HttpError::ServerError(503)),
                        1 => Err(HttpError::Timeout),
                        _ => Ok("{ \"status\": \"ok\" }"),
                    }
                }
            }
        },
        || false,
    )
    .in_client_session("demo-3")
    .with_current_runtime()
    .expect("running inside tokio")
    .with_backoff(BackoffTable::from_millis(&[100, 200]).expect("non-empty table"))
    .is_recoverable(is_retryable)
    .execute()
    .await;

    match outcome {
        Ok(body) => println!("\nResponse: {}", body),
        Err(e) => println!("\nRequest failed: {}", e),
    }

    println!("\n--- Client Error (should NOT retry) ---");
    let attempts = Arc::new(AtomicU32::new(0));

    let outcome = retry_to(
        "call api",
        {
            let attempts = attempts.clone();
            move || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    println!("  HTTP request attempt");
                    Err::<&str, _>(HttpError::ClientError(400))
                }
            }
        },
        || false,
    )
    .in_client_session("demo-3")
    .with_current_runtime()
    .expect("running inside tokio")
    .is_recoverable(is_retryable)
    .execute()
    .await;

    match outcome {
        Ok(body) => println!("\nResponse: {}", body),
        Err(e) => println!("\nRequest failed (no retries for client error): {}", e),
    }
    println!("Total attempts: {}", attempts.load(Ordering::SeqCst));
}

// ==================== Notifier ====================

/// Example 4: Observing failures
///
/// Individual failures never reach the caller; a notifier sees each one.
async fn example_notifier() {
    println!("\n=== Example 4: Notifier ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let failures_seen = Arc::new(AtomicU32::new(0));

    let outcome = retry_to(
        "refresh token",
        {
            let attempts = attempts.clone();
            move || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(HttpError::Timeout)
                    } else {
                        Ok(())
                    }
                }
            }
        },
        || false,
    )
    .in_client_session("demo-4")
    .with_current_runtime()
    .expect("running inside tokio")
    .with_backoff(BackoffTable::from_millis(&[50]).expect("non-empty table"))
    .notify_on_error({
        let failures_seen = failures_seen.clone();
        move |cause| {
            let n = failures_seen.fetch_add(1, Ordering::SeqCst) + 1;
            println!("  [notifier] failure {}: {}", n, cause);
        }
    })
    .execute()
    .await;

    println!(
        "Outcome: {:?} after {} failures",
        outcome.is_ok(),
        failures_seen.load(Ordering::SeqCst)
    );
}

// ==================== Cancellation ====================

/// Example 5: Abandoning a run
///
/// The client is destroyed while the run waits; the next attempt never
/// happens.
async fn example_cancellation() {
    println!("\n=== Example 5: Cancellation ===");

    let destroyed = Arc::new(AtomicBool::new(false));
    let attempts = Arc::new(AtomicU32::new(0));

    let handle = retry_to(
        "sync inbox",
        {
            let attempts = attempts.clone();
            move || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    println!("  Sync attempt {}", n + 1);
                    Err::<(), _>(HttpError::ServerError(502))
                }
            }
        },
        {
            let destroyed = destroyed.clone();
            move || destroyed.load(Ordering::SeqCst)
        },
    )
    .in_client_session("demo-5")
    .with_current_runtime()
    .expect("running inside tokio")
    .with_backoff(BackoffTable::from_millis(&[100]).expect("non-empty table"))
    .execute();

    tokio::time::sleep(Duration::from_millis(250)).await;
    println!("  Destroying client");
    destroyed.store(true, Ordering::SeqCst);

    match handle.await {
        Ok(()) => println!("Unexpected success"),
        Err(e) => println!("Run ended: {}", e),
    }
    println!("Total attempts: {}", attempts.load(Ordering::SeqCst));
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    println!("======================================");
    println!("       Retry Patterns Example         ");
    println!("======================================");

    example_basic_retry().await;
    example_backoff_tables().await;
    example_classification().await;
    example_notifier().await;
    example_cancellation().await;

    println!("\n======================================");
    println!("           Examples Complete           ");
    println!("======================================");
}
