//! Cooperative shutdown for long-lived services.
//!
//! Every worker task holds a [`ShutdownSignal`] and polls it between batches;
//! the binary flips the flag on `SIGINT`/`SIGTERM`, then drains in-flight
//! handlers within a bounded grace period. No computation path blocks
//! indefinitely without being cancellable through this flag.

use tokio::sync::watch;

/// Receiving side of the shutdown flag. Cheap to clone; one per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&mut self) {
        // An error means the sender dropped, which is shutdown too.
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Sending side of the shutdown flag.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    /// Request shutdown. All [`ShutdownSignal`] clones observe the flag.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// A new receiver for another task.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create the shutdown flag pair.
#[must_use]
pub fn channel() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownSignal { rx })
}

/// Resolve when the process receives `SIGINT` or, on unix, `SIGTERM`.
pub async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn flag_flips_for_every_signal() {
        let (controller, signal) = channel();
        let mut second = controller.signal();
        assert!(!signal.is_shutdown());

        controller.shutdown();
        assert!(signal.is_shutdown());
        second.wait().await;
    }

    #[tokio::test]
    async fn wait_returns_when_controller_drops() {
        let (controller, mut signal) = channel();
        drop(controller);
        signal.wait().await;
    }
}
