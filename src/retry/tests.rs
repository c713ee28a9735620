//! Integration tests for retry runs.

use super::*;
use crate::scheduler::{Scheduler, TokioScheduler, Work};
use crate::testing::{ManualCancellation, RecordingScheduler};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing_test::traced_test;

#[derive(Debug)]
struct AuthError;

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unauthorized")
    }
}

impl std::error::Error for AuthError {}

type Attempt<T> = BoxFuture<'static, Result<T, BoxError>>;

/// An operation that fails `failures` times with a transient error, then
/// yields `value`.
fn flaky<T: Clone + Send + Sync + 'static>(
    failures: u32,
    value: T,
) -> (Arc<AtomicU32>, impl Fn() -> Attempt<T> + Send + Sync + 'static) {
    let calls = Arc::new(AtomicU32::new(0));
    let operation = {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move {
                if n < failures {
                    Err(BoxError::from(format!("transient failure {}", n + 1)))
                } else {
                    Ok(value)
                }
            }
            .boxed()
        }
    };
    (calls, operation)
}

/// A notifier that records every cause it sees.
fn recording_notifier() -> (Arc<Mutex<Vec<String>>>, impl Fn(Cause<'_>) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let notifier = {
        let seen = seen.clone();
        move |cause: Cause<'_>| seen.lock().unwrap().push(cause.to_string())
    };
    (seen, notifier)
}

#[tokio::test(start_paused = true)]
async fn test_success_on_first_attempt_schedules_no_wait() {
    let scheduler = Arc::new(RecordingScheduler::current().unwrap());
    let (calls, operation) = flaky(0, "value");

    let outcome = retry_to("fetch", operation, || false)
        .in_client_session("s-1")
        .with_scheduler(scheduler.clone())
        .execute()
        .await;

    assert_eq!(outcome.unwrap(), "value");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.submissions(), 1);
    assert!(scheduler.delays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success() {
    let scheduler = Arc::new(RecordingScheduler::current().unwrap());
    let (calls, operation) = flaky(2, "V");
    let (seen, notifier) = recording_notifier();
    let start = Instant::now();

    let outcome = retry_to("fetch", operation, || false)
        .in_client_session("s-1")
        .with_scheduler(scheduler.clone())
        .notify_on_error(notifier)
        .execute()
        .await;

    assert_eq!(outcome.unwrap(), "V");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        scheduler.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(1)]
    );
    assert_eq!(scheduler.total_delay(), Duration::from_secs(2));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "transient failure 1".to_string(),
            "transient failure 2".to_string()
        ]
    );

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_waits_follow_the_table_then_saturate() {
    let scheduler = Arc::new(RecordingScheduler::current().unwrap());
    let (calls, operation) = flaky(5, ());

    let outcome = retry_to("fetch", operation, || false)
        .in_client_session("s-1")
        .with_scheduler(scheduler.clone())
        .with_backoff(BackoffTable::from_millis(&[10, 20, 40]).unwrap())
        .execute()
        .await;

    assert!(outcome.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let millis: Vec<u128> = scheduler.delays().iter().map(Duration::as_millis).collect();
    assert_eq!(millis, vec![10, 20, 40, 40, 40]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_ends_run_immediately() {
    let scheduler = Arc::new(RecordingScheduler::current().unwrap());
    let calls = Arc::new(AtomicU32::new(0));
    let (seen, notifier) = recording_notifier();

    let outcome = retry_to(
        "log in",
        {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AuthError) }
            }
        },
        || false,
    )
    .in_client_session("s-1")
    .with_scheduler(scheduler.clone())
    .with_classifier(Classifier::fatal_on::<AuthError>())
    .notify_on_error(notifier)
    .execute()
    .await;

    let err = outcome.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.downcast_ref::<AuthError>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(scheduler.delays().is_empty());
    assert_eq!(*seen.lock().unwrap(), vec!["unauthorized".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_after_recoverable_failures() {
    let calls = Arc::new(AtomicU32::new(0));

    let outcome = retry_to(
        "log in",
        {
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err::<(), _>(BoxError::from("flaky"))
                    } else {
                        Err(BoxError::from(AuthError))
                    }
                }
            }
        },
        || false,
    )
    .in_client_session("s-1")
    .with_current_runtime()
    .unwrap()
    .is_recoverable(|cause| !cause.is::<AuthError>())
    .execute()
    .await;

    assert!(outcome.unwrap_err().downcast_ref::<AuthError>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_from_start_never_invokes_operation() {
    let (calls, operation) = flaky(0, 1u8);
    let (seen, notifier) = recording_notifier();
    let classified = Arc::new(AtomicBool::new(false));

    let outcome = retry_to("fetch", operation, || true)
        .in_client_session("session-9")
        .with_current_runtime()
        .unwrap()
        .notify_on_error(notifier)
        .is_recoverable({
            let classified = classified.clone();
            move |_| {
                classified.store(true, Ordering::SeqCst);
                true
            }
        })
        .execute()
        .await;

    match outcome {
        Err(RetryError::Cancelled(destroyed)) => assert_eq!(destroyed.session_id(), "session-9"),
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(seen.lock().unwrap().is_empty());
    assert!(!classified.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_between_attempts_stops_the_run() {
    let lifecycle = ManualCancellation::new();
    let (calls, operation) = flaky(u32::MAX, ());
    let failures = Arc::new(AtomicU32::new(0));

    let outcome = retry_to("fetch", operation, lifecycle.check())
        .in_client_session("s-2")
        .with_current_runtime()
        .unwrap()
        .notify_on_error({
            let lifecycle = lifecycle.clone();
            let failures = failures.clone();
            move |_| {
                if failures.fetch_add(1, Ordering::SeqCst) == 1 {
                    lifecycle.cancel();
                }
            }
        })
        .execute()
        .await;

    assert!(outcome.unwrap_err().is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn test_panicking_notifier_does_not_change_outcome() {
    let (calls, operation) = flaky(2, 10u32);

    let outcome = retry_to("fetch", operation, || false)
        .in_client_session("s-3")
        .with_current_runtime()
        .unwrap()
        .notify_on_error(|_| panic!("notifier blew up"))
        .execute()
        .await;

    assert_eq!(outcome.unwrap(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(logs_contain("error notifier panicked"));
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn test_failures_and_waits_are_logged_with_session_and_action() {
    let (_calls, operation) = flaky(1, ());

    let outcome = retry_to("sync inventory", operation, || false)
        .in_client_session("s-logs")
        .with_current_runtime()
        .unwrap()
        .execute()
        .await;

    assert!(outcome.is_ok());
    assert!(logs_contain("client <s-logs>: failed to <sync inventory>"));
    assert!(logs_contain("before retrying to <sync inventory>"));
    assert!(logs_contain("transient failure 1"));
}

#[tokio::test(start_paused = true)]
async fn test_wrapped_failure_is_unwrapped_for_classification_only() {
    let (seen, notifier) = recording_notifier();
    let classified_inner = Arc::new(AtomicBool::new(false));

    let outcome = retry_to(
        "log in",
        || async { Err::<(), _>(CompletionError::new(AuthError)) },
        || false,
    )
    .in_client_session("s-4")
    .with_current_runtime()
    .unwrap()
    .notify_on_error(notifier)
    .is_recoverable({
        let classified_inner = classified_inner.clone();
        move |cause| {
            classified_inner.store(cause.is::<AuthError>(), Ordering::SeqCst);
            !cause.is::<AuthError>()
        }
    })
    .execute()
    .await;

    assert!(classified_inner.load(Ordering::SeqCst));
    assert_eq!(*seen.lock().unwrap(), vec!["unauthorized".to_string()]);

    let err = outcome.unwrap_err();
    let cause = err.fatal_cause().unwrap();
    assert!(cause.is::<CompletionError>());
    assert!(err.downcast_ref::<AuthError>().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_panic_while_invoking_is_a_recoverable_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let (seen, notifier) = recording_notifier();

    let outcome = retry_to(
        "fetch",
        {
            let calls = calls.clone();
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("not ready");
                }
                async { Ok::<_, BoxError>("ready") }
            }
        },
        || false,
    )
    .in_client_session("s-5")
    .with_current_runtime()
    .unwrap()
    .notify_on_error(notifier)
    .execute()
    .await;

    assert_eq!(outcome.unwrap(), "ready");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock().unwrap(), vec!["panicked: not ready".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_panic_while_polling_arrives_wrapped() {
    let (seen, notifier) = recording_notifier();

    let outcome = retry_to(
        "fetch",
        || async {
            if true {
                panic!("lost connection");
            }
            Ok::<u32, BoxError>(0)
        },
        || false,
    )
    .in_client_session("s-6")
    .with_current_runtime()
    .unwrap()
    .with_classifier(Classifier::never())
    .notify_on_error(notifier)
    .execute()
    .await;

    // the notifier saw the panic itself, the caller sees the wrapper
    assert_eq!(*seen.lock().unwrap(), vec!["panicked: lost connection".to_string()]);
    let err = outcome.unwrap_err();
    assert!(err.fatal_cause().unwrap().is::<CompletionError>());
    assert_eq!(
        err.downcast_ref::<PanicError>().map(PanicError::message),
        Some("lost connection")
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cancellation_check_abandons_run() {
    let (calls, operation) = flaky(0, ());

    let outcome = retry_to("fetch", operation, || panic!("lifecycle unavailable"))
        .in_client_session("s-7")
        .with_current_runtime()
        .unwrap()
        .execute()
        .await;

    assert!(outcome.unwrap_err().is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_classifier_is_fatal() {
    let (calls, operation) = flaky(3, ());

    let outcome = retry_to("fetch", operation, || false)
        .in_client_session("s-8")
        .with_current_runtime()
        .unwrap()
        .is_recoverable(|_| panic!("classifier bug"))
        .execute()
        .await;

    assert!(outcome.unwrap_err().is_fatal());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_absent_value_is_a_success() {
    let (calls, operation) = flaky(0, None::<u32>);

    let outcome = retry_to("lookup", operation, || false)
        .in_client_session("s-9")
        .with_current_runtime()
        .unwrap()
        .execute()
        .await;

    assert_eq!(outcome.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_never_overlap() {
    let in_flight = Arc::new(AtomicU32::new(0));
    let max_in_flight = Arc::new(AtomicU32::new(0));
    let calls = Arc::new(AtomicU32::new(0));

    let outcome = retry_to(
        "fetch",
        {
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            let calls = calls.clone();
            move || {
                let in_flight = in_flight.clone();
                let max_in_flight = max_in_flight.clone();
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    if n < 3 {
                        Err(BoxError::from("slow failure"))
                    } else {
                        Ok(n)
                    }
                }
            }
        },
        || false,
    )
    .in_client_session("s-10")
    .with_current_runtime()
    .unwrap()
    .execute()
    .await;

    assert_eq!(outcome.unwrap(), 3);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_runs_are_independent() {
    let (calls, operation) = flaky(1, "ok");
    let config = retry_to("fetch", operation, || false)
        .in_client_session("s-11")
        .with_current_runtime()
        .unwrap()
        .build();

    let first = config.execute().await;
    let second = config.execute().await;

    assert_eq!(first.unwrap(), "ok");
    // the shared counter is past its failures, so the second run succeeds at once
    assert_eq!(second.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(config.session_id(), "s-11");
    assert_eq!(config.action(), "fetch");
}

#[tokio::test(start_paused = true)]
async fn test_shared_handle_delivers_to_every_observer() {
    let (_calls, operation) = flaky(1, 99u64);
    let shared = retry_to("fetch", operation, || false)
        .in_client_session("s-12")
        .with_current_runtime()
        .unwrap()
        .execute()
        .shared();

    let (a, b, c) = tokio::join!(shared.clone(), shared.clone(), shared);
    assert_eq!(a.unwrap(), 99);
    assert_eq!(b.unwrap(), 99);
    assert_eq!(c.unwrap(), 99);
}

#[tokio::test]
async fn test_execute_does_not_run_inline() {
    let (calls, operation) = flaky(0, ());
    let handle = retry_to("fetch", operation, || false)
        .in_client_session("s-13")
        .with_current_runtime()
        .unwrap()
        .execute();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(handle.await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Runs submissions on tokio but drops every delayed unit of work, like a
/// scheduler shutting down mid-run.
struct ForgetfulScheduler {
    inner: TokioScheduler,
}

impl Scheduler for ForgetfulScheduler {
    fn submit(&self, work: Work) {
        self.inner.submit(work);
    }

    fn schedule_after(&self, _delay: Duration, work: Work) {
        drop(work);
    }
}

#[tokio::test]
async fn test_dropped_work_interrupts_the_run() {
    let scheduler = Arc::new(ForgetfulScheduler {
        inner: TokioScheduler::current().unwrap(),
    });
    let (calls, operation) = flaky(1, ());

    let outcome = retry_to("fetch", operation, || false)
        .in_client_session("s-14")
        .with_scheduler(scheduler)
        .execute()
        .await;

    assert!(outcome.unwrap_err().is_interrupted());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
