//! Storage Optimization Background Task
//!
//! Runs `optimize_storage` on a fixed interval - compaction, archival,
//! retention cleanup, orphan reconciliation and gauge refresh. Maintenance
//! is never on the request path; a failed cycle is logged and the next tick
//! tries again.
//!
//! Cancellation (shutdown signal or task abort) is safe at any point:
//! every destructive step inside `optimize_storage` happens only after its
//! replacement data is durably written and registered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

use crate::warehouse::LakeWarehouse;

/// Maintenance loop configuration.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often to run storage optimization
    pub run_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            run_interval: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Periodic storage optimization task.
pub struct MaintenanceTask {
    warehouse: Arc<LakeWarehouse>,
    config: MaintenanceConfig,
}

impl MaintenanceTask {
    pub fn new(warehouse: Arc<LakeWarehouse>, config: MaintenanceConfig) -> Self {
        Self { warehouse, config }
    }

    /// Start the background loop. Send on (or drop) the shutdown channel to
    /// stop it after the in-flight cycle, if any, completes its current
    /// await point.
    pub fn start(self, shutdown_rx: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.run_interval);
            let mut shutdown_rx = shutdown_rx;

            info!(
                interval_secs = self.config.run_interval.as_secs(),
                "Storage maintenance started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.warehouse.optimize_storage().await {
                            Ok(report) => {
                                if report.compacted_groups > 0
                                    || report.partitions_archived > 0
                                    || report.retention_removed > 0
                                    || report.orphans_removed > 0
                                {
                                    info!(
                                        compacted_groups = report.compacted_groups,
                                        archived = report.partitions_archived,
                                        retention_removed = report.retention_removed,
                                        orphans_removed = report.orphans_removed,
                                        "Maintenance cycle made progress"
                                    );
                                }
                            }
                            Err(e) => error!(error = %e, "Maintenance cycle failed"),
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Storage maintenance shutting down");
                        break;
                    }
                }
            }
        })
    }
}
