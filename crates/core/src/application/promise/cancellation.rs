// Cancellation Token - raised once, on the first settlement of a promise

use tokio::sync::watch;

/// Read side of the cancellation flag
///
/// Listeners that may fire after settlement (late stream events, a second
/// close notification) check this and become no-ops.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Check if the owning promise already settled
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the owning promise settles
    ///
    /// Also returns if the sender is gone, since nothing can settle anymore.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Write side, owned by the settlement logic
#[derive(Debug)]
pub struct CancellationSender {
    tx: watch::Sender<bool>,
}

impl CancellationSender {
    /// Raise the flag (idempotent)
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// New token observing this flag
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a cancellation channel
pub fn cancellation_channel() -> (CancellationSender, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationSender { tx }, CancellationToken { rx })
}
