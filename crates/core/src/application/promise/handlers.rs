// Settlement handlers handed to a promise body: resolve / reject / reject_if

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::trace;

use super::cancellation::{CancellationSender, CancellationToken};
use super::Settled;
use crate::domain::{ErrorDetails, SysExecError};

/// Failure message, literal or lazily built
///
/// The lazy form runs only when a rejection actually takes effect, so
/// expensive message construction is skipped on the success path.
pub enum Message {
    Literal(String),
    Lazy(Box<dyn FnOnce() -> String + Send>),
}

impl Message {
    pub fn lazy(f: impl FnOnce() -> String + Send + 'static) -> Self {
        Message::Lazy(Box::new(f))
    }

    fn render(self) -> String {
        match self {
            Message::Literal(text) => text,
            Message::Lazy(f) => f(),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Literal(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Literal(text)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Message::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

type PostHook = Box<dyn FnOnce() + Send>;

/// Options of a deferred conditional rejection
pub struct RejectIfOptions<D> {
    pub details: ErrorDetails<D>,
    /// Runs right after the rejection attempt (release timers, etc.)
    pub post: Option<PostHook>,
}

impl<D> RejectIfOptions<D> {
    pub fn new(details: ErrorDetails<D>) -> Self {
        Self {
            details,
            post: None,
        }
    }

    pub fn with_post(mut self, post: impl FnOnce() + Send + 'static) -> Self {
        self.post = Some(Box::new(post));
        self
    }
}

struct Shared<T, D> {
    sender: Mutex<Option<oneshot::Sender<Settled<T, D>>>>,
    cancel: CancellationSender,
}

/// `resolve` / `reject` / `reject_if` bundle
///
/// Cloneable; every clone settles the same promise. Only the first
/// settlement has an effect, every later call returns `false`.
pub struct Handlers<T, D = ()> {
    shared: Arc<Shared<T, D>>,
}

impl<T, D> Clone for Handlers<T, D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, D> Handlers<T, D>
where
    T: Send + 'static,
    D: Send + 'static,
{
    pub(super) fn new(sender: oneshot::Sender<Settled<T, D>>, cancel: CancellationSender) -> Self {
        Self {
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(sender)),
                cancel,
            }),
        }
    }

    /// Settle with success. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(|| Ok(value))
    }

    /// Settle with failure. Returns false if already settled.
    ///
    /// A lazy message is evaluated only if this call wins.
    pub fn reject(&self, message: impl Into<Message>, details: ErrorDetails<D>) -> bool {
        let message = message.into();
        self.settle(|| Err(SysExecError::new(message.render(), details)))
    }

    /// Reject on a later scheduling turn if `condition` holds
    ///
    /// Never evaluated inline with the caller: several calls issued in the
    /// same turn all observe the settlement state of the next turn. Must be
    /// called from within a tokio runtime.
    pub fn reject_if(
        &self,
        condition: bool,
        message: impl Into<Message>,
        options: RejectIfOptions<D>,
    ) {
        let handlers = self.clone();
        let message = message.into();

        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if !condition {
                return;
            }

            let RejectIfOptions { details, post } = options;
            handlers.reject(message, details);
            if let Some(post) = post {
                post();
            }
        });
    }

    /// Has any settlement happened yet?
    pub fn is_settled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.token()
    }

    /// Handle restricted to rejection (given to the uncaught-failure mapper)
    pub fn reject_handle(&self) -> RejectHandle<T, D> {
        RejectHandle {
            handlers: self.clone(),
        }
    }

    fn settle(&self, outcome: impl FnOnce() -> Settled<T, D>) -> bool {
        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(sender) = sender else {
            trace!("Settlement ignored: promise already settled");
            return false;
        };

        self.shared.cancel.cancel();
        // Awaiting side may be gone; settlement still counts
        let _ = sender.send(outcome());
        true
    }
}

/// Rejection-only capability
pub struct RejectHandle<T, D = ()> {
    handlers: Handlers<T, D>,
}

impl<T, D> RejectHandle<T, D>
where
    T: Send + 'static,
    D: Send + 'static,
{
    pub fn reject(&self, message: impl Into<Message>, details: ErrorDetails<D>) -> bool {
        self.handlers.reject(message, details)
    }

    pub fn is_settled(&self) -> bool {
        self.handlers.is_settled()
    }
}
