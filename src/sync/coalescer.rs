use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Collapses bursts of requests into one run of `action` after the window is quiet
pub struct ReconcileCoalescer {
    tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReconcileCoalescer {
    /// Must be called inside a tokio runtime
    pub fn spawn<F, Fut>(window: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // one queued signal is enough to mark the burst
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut pending = false;
            let debounce = tokio::time::sleep(window);
            tokio::pin!(debounce);

            loop {
                tokio::select! {
                    request = rx.recv() => match request {
                        Some(()) => {
                            pending = true;
                            debounce.as_mut().reset(tokio::time::Instant::now() + window);
                        }
                        None => break,
                    },
                    _ = &mut debounce, if pending => {
                        pending = false;
                        debug!("Running coalesced reconciliation");
                        action().await;
                    }
                }
            }
            debug!("Reconcile coalescer stopped");
        });

        Self { tx, task }
    }

    pub fn request(&self) {
        // Full means a run is already queued for this burst
        let _ = self.tx.try_send(());
    }
}

impl Drop for ReconcileCoalescer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
