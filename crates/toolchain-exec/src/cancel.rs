//! Cooperative cancellation threaded from the caller's request context

use async_channel::{Receiver, Sender, bounded};

/// Create a linked cancellation source and token.
///
/// The source side stays with the caller; the token side is cloned into every
/// operation that must observe cancellation. Dropping the source cancels the
/// token.
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = bounded::<()>(1);
    (
        CancelSource { tx },
        CancelToken {
            rx,
            _keep_open: None,
        },
    )
}

/// The caller-held side of a cancellation pair
#[derive(Debug)]
pub struct CancelSource {
    tx: Sender<()>,
}

impl CancelSource {
    /// Cancel every token linked to this source
    pub fn cancel(&self) {
        self.tx.close();
    }
}

/// A clonable token observed by cancellable operations
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
    // Held only by the never-cancelled token so the channel stays open.
    _keep_open: Option<std::sync::Arc<Sender<()>>>,
}

impl CancelToken {
    /// A token that never reports cancellation
    pub fn none() -> Self {
        let (tx, rx) = bounded::<()>(1);
        Self {
            rx,
            _keep_open: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.rx.is_closed()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        // recv only errors once the source has closed the channel
        let _ = self.rx.recv().await;
    }
}
