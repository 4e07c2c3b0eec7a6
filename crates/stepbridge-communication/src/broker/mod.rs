//! Broker supervisor
//!
//! Runs the two forwarding loops on blocking worker threads, restarts a loop
//! that dies unexpectedly, and tears everything down on shutdown.

pub mod forwarding;

use crate::communication::link_manager::{LinkManager, LinkOpener};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use stepbridge_core::{AxisRegistry, Error, Result, ShutdownSignal};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Pause before restarting a worker that exited unexpectedly
const WORKER_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Forwarding direction handled by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host commands to the device
    HostToDevice,
    /// Device responses to the host
    DeviceToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostToDevice => write!(f, "host->device"),
            Self::DeviceToHost => write!(f, "device->host"),
        }
    }
}

/// Everything the workers share
pub struct BrokerState {
    /// The link pair and its reconnect logic
    pub links: LinkManager,
    /// Axis table for unit conversion
    pub axes: AxisRegistry,
    /// Process-wide shutdown flag
    pub shutdown: ShutdownSignal,
}

type WorkerOutcome = (Direction, std::thread::Result<()>);

/// Serial command broker
pub struct Broker {
    state: Arc<BrokerState>,
}

impl Broker {
    /// Create a broker; no port is opened until [`run`](Self::run)
    pub fn new(opener: impl LinkOpener + 'static, axes: AxisRegistry, backoff: Duration) -> Self {
        let shutdown = ShutdownSignal::new();
        Self {
            state: Arc::new(BrokerState {
                links: LinkManager::new(opener, backoff, shutdown.clone()),
                axes,
                shutdown,
            }),
        }
    }

    /// Shared state, for inspection
    pub fn state(&self) -> &Arc<BrokerState> {
        &self.state
    }

    /// Handle that stops the broker when triggered
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.state.shutdown.clone()
    }

    /// Open both links, forward until `shutdown` completes, then close them.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let signal = self.state.shutdown.clone();
        let watcher = tokio::spawn(async move {
            shutdown.await;
            signal.trigger();
        });

        let result = self.serve().await;
        watcher.abort();
        self.state.links.close_all();
        info!("Broker stopped");
        result
    }

    async fn serve(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let opened = tokio::task::spawn_blocking(move || state.links.open_all())
            .await
            .map_err(|e| Error::other(format!("Link open task failed: {}", e)))?;
        match opened {
            Ok(session) => info!(
                host = session.host().name(),
                device = session.device().name(),
                "Broker started"
            ),
            Err(e) if e.is_shutdown() => return Ok(()),
            Err(e) => return Err(e),
        }

        let mut workers = JoinSet::new();
        self.spawn_worker(&mut workers, Direction::HostToDevice);
        self.spawn_worker(&mut workers, Direction::DeviceToHost);

        while let Some(joined) = workers.join_next().await {
            let (direction, outcome) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    continue;
                }
            };
            if self.state.shutdown.is_triggered() {
                continue;
            }

            match outcome {
                Ok(()) => warn!(%direction, "Worker exited unexpectedly, restarting"),
                Err(_) => error!(%direction, "Worker panicked, restarting"),
            }
            tokio::time::sleep(WORKER_RESTART_DELAY).await;
            self.spawn_worker(&mut workers, direction);
        }
        Ok(())
    }

    fn spawn_worker(&self, workers: &mut JoinSet<WorkerOutcome>, direction: Direction) {
        let state = Arc::clone(&self.state);
        workers.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                forwarding::run_direction(direction, &state)
            }));
            (direction, outcome)
        });
    }
}
