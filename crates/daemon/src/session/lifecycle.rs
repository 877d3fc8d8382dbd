//! Periodic session maintenance.
//!
//! Two independent loops run for the lifetime of the server: the idle sweep
//! reaps detached sessions past their TTL, and the heartbeat pings every
//! attached connection. Both stop when the shutdown token is cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionRegistry;

/// Timing for the maintenance loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceConfig {
    /// Period of the idle sweep.
    pub cleanup_interval: Duration,
    /// Period of the connection heartbeat.
    pub heartbeat_interval: Duration,
}

/// Starts the idle sweep and heartbeat loops.
///
/// Returns the handles of both tasks; they finish once `shutdown` is
/// cancelled.
pub fn spawn_maintenance(
    registry: Arc<SessionRegistry>,
    config: MaintenanceConfig,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let sweep = {
        let registry = Arc::clone(&registry);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            run_every(config.cleanup_interval, shutdown, || {
                let reaped = registry.cleanup_idle(Instant::now());
                if reaped > 0 {
                    info!(reaped, remaining = registry.count(), "Idle sweep finished");
                }
            })
            .await;
            debug!("Idle sweep stopped");
        })
    };

    let heartbeat = tokio::spawn(async move {
        run_every(config.heartbeat_interval, shutdown, || {
            let pinged = registry.broadcast_heartbeat();
            if pinged > 0 {
                debug!(pinged, "Sent heartbeat pings");
            }
        })
        .await;
        debug!("Heartbeat stopped");
    });

    vec![sweep, heartbeat]
}

async fn run_every(period: Duration, shutdown: CancellationToken, mut tick: impl FnMut()) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => tick(),
        }
    }
}
