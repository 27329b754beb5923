use crate::task::signal::shutdown_requested;
use tokio::sync::watch;

/// Install the Ctrl+C handler. The first interrupt requests a graceful shutdown, the
/// second exits immediately.
pub fn register() -> Result<Interrupted, ctrlc::Error> {
    let (tx, rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let already_interrupted = tx.send_replace(true);
        if already_interrupted {
            println!("User requested abort (Ctrl+C twice)");
            std::process::exit(1);
        }
        println!("Stopping tasks, waiting for in-flight requests (Ctrl+C again to abort)...");
    })?;
    Ok(Interrupted { rx })
}

#[derive(Clone)]
pub struct Interrupted {
    rx: watch::Receiver<bool>,
}

impl From<watch::Receiver<bool>> for Interrupted {
    fn from(rx: watch::Receiver<bool>) -> Interrupted {
        Interrupted { rx }
    }
}

impl Interrupted {
    pub fn interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Shutdown channel to hand to the dispatcher.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    pub async fn wait(&self) {
        shutdown_requested(self.rx.clone()).await
    }
}
