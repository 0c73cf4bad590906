//! Background expiry of unanswered intervention requests
//!
//! Expiry is already enforced when requests are read or answered; the
//! sweeper only rewrites past-due rows so that the stored status matches.

use crate::intervention::InterventionManager;
use crate::shutdown::ShutdownCoordinator;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically flips past-due `PENDING` requests to `EXPIRED`
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    interventions: InterventionManager,
    interval: Duration,
    shutdown: ShutdownCoordinator,
}

impl ExpirySweeper {
    pub fn new(interventions: InterventionManager, interval: Duration, shutdown: ShutdownCoordinator) -> Self {
        Self {
            interventions,
            interval,
            shutdown,
        }
    }

    /// Run one sweep
    pub async fn sweep_once(&self) -> u64 {
        match self.interventions.expire_overdue().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Expiry sweep failed");
                0
            }
        }
    }

    /// Sweep on every tick until shutdown is requested
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

            loop {
                tokio::select! {
                    _ = self.shutdown.wait_for_shutdown() => break,
                    _ = ticker.tick() => {
                        let expired = self.sweep_once().await;
                        debug!(expired, "Expiry sweep finished");
                    }
                }
            }
            info!("Expiry sweeper stopped");
        })
    }
}
