//! Cooperative shutdown for master and worker loops

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Fires a [`Shutdown`] and every clone of it.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cloneable listener handed to loops that wait on the store or a timer.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// A listener that never fires
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        // Dropping the sender leaves `recv` pending forever
        drop(tx);
        Shutdown { rx }
    }

    /// Listener fired on Ctrl+C or SIGTERM. Must be called inside a runtime.
    pub fn on_signal() -> Shutdown {
        let (trigger, shutdown) = Self::new();
        tokio::spawn(async move {
            wait_for_signal().await;
            trigger.fire();
        });
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested
    pub async fn recv(&mut self) {
        let fired = self.rx.wait_for(|fired| *fired).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_all_clones() {
        let (trigger, shutdown) = Shutdown::new();
        let mut a = shutdown.clone();
        let mut b = shutdown;

        assert!(!a.is_triggered());
        trigger.fire();

        a.recv().await;
        b.recv().await;
        assert!(a.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_stays_pending() {
        let mut shutdown = Shutdown::never();
        let waited = tokio::time::timeout(Duration::from_secs(5), shutdown.recv()).await;
        assert!(waited.is_err());
    }
}
