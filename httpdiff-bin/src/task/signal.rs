use std::sync::Arc;
use tokio::sync::watch;

/// A one-shot broadcast flag. Firing is idempotent and wakes every waiter.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Signal::new()
    }
}

impl Signal {
    pub fn new() -> Signal {
        let (tx, _rx) = watch::channel(false);
        Signal { tx: Arc::new(tx) }
    }

    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// Wait until an external shutdown receiver flips to `true`.
///
/// A dropped sender means nobody can ask for shutdown any more, so this never resolves.
pub async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|requested| *requested).await.is_err() {
        futures::future::pending::<()>().await;
    }
}
