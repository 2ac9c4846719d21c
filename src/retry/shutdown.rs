use futures::future;
use tokio::select;
use tokio::signal;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// Cancellation handle observed by every wait loop.
///
/// Holds the reason (`"SIGINT"`, `"SIGTERM"`, ...) once cancellation was requested.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<Option<&'static str>>,
}

/// Sending half of a [`Shutdown`] created with [`Shutdown::manual`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<Option<&'static str>>,
}

impl Shutdown {
    /// Cancelled by the first SIGINT or SIGTERM. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (trigger, shutdown) = Self::manual();
        tokio::spawn(trigger.fire_on(next_signal()));
        shutdown
    }

    /// A handle cancelled only through the returned trigger.
    pub fn manual() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(None);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    pub fn requested(&self) -> Option<&'static str> {
        *self.rx.borrow()
    }

    /// Resolves with the reason once cancellation is requested; never resolves otherwise.
    pub async fn cancelled(&self) -> &'static str {
        let mut rx = self.rx.clone();
        loop {
            let current = *rx.borrow_and_update();
            if let Some(reason) = current {
                return reason;
            }
            if rx.changed().await.is_err() {
                return future::pending::<&'static str>().await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self, reason: &'static str) {
        let _ = self.tx.send(Some(reason));
    }

    /// Triggers with whatever reason `source` yields. A source yielding `None` drops the
    /// trigger, so the handle is never cancelled.
    pub async fn fire_on(self, source: impl Future<Output = Option<&'static str>>) {
        match source.await {
            Some(reason) => {
                info!("Received {}.", reason);
                self.trigger(reason);
            }
            None => warn!("Signal source closed; shutdown can no longer be requested."),
        }
    }
}

async fn next_signal() -> Option<&'static str> {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => Some("SIGINT"),
            Err(e) => {
                warn!("Failed to listen for SIGINT: {}", e);
                future::pending().await
            }
        }
    };
    let terminate = async {
        match unix::signal(SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await.map(|()| "SIGTERM"),
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                future::pending().await
            }
        }
    };

    select! {
        reason = interrupt => reason,
        reason = terminate => reason,
    }
}
