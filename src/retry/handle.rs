//! The caller's view of a retry run.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

use super::error::RetryError;

/// Resolves once, with the outcome of a retry run.
///
/// The run settles exactly once: with the operation's value, with the fatal
/// failure, or with the cancellation failure. Await the handle directly for a
/// single observer, or call [`shared`](Self::shared) to hand clones of the
/// outcome to several.
#[must_use = "the outcome of a retry run is only observable through its handle"]
#[derive(Debug)]
pub struct RetryHandle<T> {
    receiver: oneshot::Receiver<Result<T, RetryError>>,
}

impl<T> RetryHandle<T> {
    /// Turn the handle into a cloneable future every observer can await.
    pub fn shared(self) -> Shared<Self>
    where
        T: Clone,
    {
        FutureExt::shared(self)
    }
}

impl<T> Future for RetryHandle<T> {
    type Output = Result<T, RetryError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(RetryError::Interrupted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The producing half: consumed by the single resolution of a run.
#[derive(Debug)]
pub(crate) struct Resolver<T> {
    sender: oneshot::Sender<Result<T, RetryError>>,
}

impl<T> Resolver<T> {
    pub(crate) fn resolve(self, outcome: Result<T, RetryError>) {
        if self.sender.send(outcome).is_err() {
            tracing::debug!("retry handle was dropped before the run settled");
        }
    }
}

pub(crate) fn channel<T>() -> (Resolver<T>, RetryHandle<T>) {
    let (sender, receiver) = oneshot::channel();
    (Resolver { sender }, RetryHandle { receiver })
}
