//! Driver shutdown signalling shared by the listener and the negotiator.

use tokio::sync::watch;

/// Create a linked trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Held by the driver; fires once when shutdown begins.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cloneable observer of the shutdown state.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires, for components run without a driver.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Closed immediately; `wait` treats a closed channel as never firing.
        drop(tx);
        ShutdownSignal { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has begun. Pends forever if the trigger is
    /// dropped without firing.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let (trigger, mut signal) = shutdown_channel();
        assert!(!signal.is_triggered());
        trigger.trigger();
        signal.wait().await;
        assert!(signal.is_triggered());
        assert!(trigger.subscribe().is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_resolve() {
        let mut signal = ShutdownSignal::never();
        let waited = tokio::time::timeout(Duration::from_secs(60), signal.wait()).await;
        assert!(waited.is_err());
        assert!(!signal.is_triggered());
    }
}
