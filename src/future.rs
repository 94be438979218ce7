//! One-shot response futures.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::DapError;

/// The eventual outcome of a sent request.
///
/// Fulfilled exactly once: with the decoded response, with the peer's
/// error message, or with [`DapError::SessionClosed`] when the session
/// shuts down first. Awaiting it yields the outcome; dropping it discards
/// the response.
#[derive(Debug)]
pub struct ResponseFuture<T> {
    rx: oneshot::Receiver<Result<T, DapError>>,
}

impl<T> ResponseFuture<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, DapError>>) -> Self {
        Self { rx }
    }

    /// A future that is already fulfilled with `outcome`.
    pub(crate) fn ready(outcome: Result<T, DapError>) -> Self
    where
        T: Send,
    {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, DapError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the session went away without fulfilling
        // the slot.
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DapError::SessionClosed)))
    }
}
