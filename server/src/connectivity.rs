use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::store::{EventStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Online,
    Offline,
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionState::Online)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Online => write!(f, "online"),
            ConnectionState::Offline => write!(f, "offline"),
        }
    }
}

async fn ping_with_timeout<F>(timeout: Duration, ping: F) -> ConnectionState
where
    F: Future<Output = StoreResult<()>>,
{
    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => ConnectionState::Online,
        Ok(Err(e)) => {
            warn!(error = %e, "Store ping failed");
            ConnectionState::Offline
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Store ping timed out");
            ConnectionState::Offline
        }
    }
}

/// Periodically pings the store and publishes the result on a watch channel.
///
/// Subscribers only see transitions: a check that confirms the current state
/// does not wake them.
pub struct ConnectivityMonitor {
    store: Arc<dyn EventStore>,
    timeout: Duration,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectivityMonitor {
    /// Starts out `Online`; the first check corrects that if needed.
    pub fn new(store: Arc<dyn EventStore>, timeout: Duration) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Online);
        Self { store, timeout, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Run one check and publish its outcome. Returns the resulting state.
    pub async fn check(&self) -> ConnectionState {
        let state = ping_with_timeout(self.timeout, self.store.ping()).await;

        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        if changed {
            match state {
                ConnectionState::Online => info!("Store connection restored"),
                ConnectionState::Offline => warn!("Store connection lost"),
            }
        }

        state
    }

    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Connectivity monitor stopped");
    }

    pub fn spawn(
        self: Arc<Self>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(period, shutdown))
    }
}
