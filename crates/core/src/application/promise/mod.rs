//! Enhanced Promise - a settle-once asynchronous result
//!
//! A body receives `{resolve, reject, reject_if}` and settles the promise at
//! most once. The first settlement raises a cancellation flag that any
//! late listener can check. Failures escaping the body are routed through
//! an explicit `on_uncaught` mapper instead of an ambient catch.

mod cancellation;
mod handlers;

pub use cancellation::{cancellation_channel, CancellationSender, CancellationToken};
pub use handlers::{Handlers, Message, RejectHandle, RejectIfOptions};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use crate::application::panic_guard::panic_message;
use crate::domain::{BoxError, ErrorDetails, ErrorKind, SysExecError};

pub(crate) type Settled<T, D> = Result<T, SysExecError<D>>;

/// The promise body panicked
#[derive(Error, Debug)]
#[error("promise body panicked: {0}")]
pub struct BodyPanicked(pub String);

/// Pending result of an enhanced promise body
///
/// Resolves to the first settlement made through its handlers.
pub struct EnhancedPromise<T, D = ()> {
    rx: oneshot::Receiver<Settled<T, D>>,
    cancellation: CancellationToken,
}

impl<T, D> EnhancedPromise<T, D>
where
    T: Send + 'static,
    D: Send + 'static,
{
    /// Start `body` on the tokio runtime
    ///
    /// If the body returns an error or panics, `on_uncaught` gets the
    /// failure and a reject-only handle so it can map it into the typed
    /// taxonomy. Must be called from within a tokio runtime.
    ///
    /// # Example
    /// ```text
    /// let promise = EnhancedPromise::run(
    ///     |h| async move {
    ///         h.resolve(42);
    ///         Ok(())
    ///     },
    ///     |err, h| { h.reject("uncaught exception", ErrorDetails::new(kind).with_source(err)); },
    /// );
    /// assert_eq!(promise.await.unwrap(), 42);
    /// ```
    pub fn run<B, Fut, U>(body: B, on_uncaught: U) -> Self
    where
        B: FnOnce(Handlers<T, D>) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
        U: FnOnce(BoxError, RejectHandle<T, D>) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let (cancel_tx, cancellation) = cancellation_channel();
        let handlers = Handlers::new(tx, cancel_tx);

        let body_task = tokio::spawn(body(handlers.clone()));

        tokio::spawn(async move {
            let failure: BoxError = match body_task.await {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(join_err) => match join_err.try_into_panic() {
                    Ok(payload) => Box::new(BodyPanicked(panic_message(payload.as_ref()))),
                    Err(join_err) => Box::new(join_err),
                },
            };

            if handlers.is_settled() {
                warn!(error = %failure, "Uncaught failure after settlement ignored");
                return;
            }
            on_uncaught(failure, handlers.reject_handle());
        });

        Self { rx, cancellation }
    }

    /// Token raised on first settlement
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

impl<T, D> Future for EnhancedPromise<T, D> {
    type Output = Settled<T, D>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(settled)) => Poll::Ready(settled),
            // Every handler dropped without settling
            Poll::Ready(Err(_)) => Poll::Ready(Err(SysExecError::new(
                "promise body finished without settling",
                ErrorDetails::new(ErrorKind::Uncaught {
                    parser_suspected: false,
                }),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
