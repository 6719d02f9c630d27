use tokio::sync::watch;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    sender: watch::Sender<bool>,
}

/// Cloneable observer handed to executing edges.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelSource {
    pub fn new() -> (Self, CancelToken) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelToken { receiver })
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }
}

impl CancelToken {
    /// Token that never fires.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        // The receiver keeps the last value once the sender is gone.
        drop(sender);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the source
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
