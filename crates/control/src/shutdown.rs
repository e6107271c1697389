use fc_local_invoker::ContainerManager;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Slack on top of the engine's own stop timeout before a container is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// What a cleanup pass managed to stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub stopped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Stops every live container once, on the first interrupt.
pub struct CleanupCoordinator {
    manager: Arc<ContainerManager>,
    stopping: AtomicBool,
}

impl CleanupCoordinator {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        Self {
            manager,
            stopping: AtomicBool::new(false),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Fans a stop out over the live set. A stop that outlives the engine
    /// timeout plus a grace period is abandoned for a kill and reported as
    /// failed. Returns `None` when there was nothing to stop or another pass
    /// already owns the cleanup.
    pub async fn cleanup(&self) -> Option<CleanupReport> {
        if self.manager.live().is_empty() {
            return None;
        }
        if self
            .stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("cleanup already in progress");
            return None;
        }

        println!("received cancel request, stopping running containers.....");

        let deadline = Duration::from_secs(self.manager.settings().stop_timeout_secs) + STOP_GRACE;
        let ids = self.manager.live().snapshot();
        let stops = ids.into_iter().map(|id| {
            let manager = self.manager.clone();
            async move {
                println!("stopping container {id}");
                let result = match timeout(deadline, manager.stop(&id)).await {
                    Ok(stopped) => stopped.map_err(|e| e.to_string()),
                    Err(_) => {
                        warn!(container_id = %id, timeout_secs = deadline.as_secs(), "stop timed out, killing container");
                        let message = format!("stop timed out after {}s", deadline.as_secs());
                        match manager.kill(&id).await {
                            Ok(()) => Err(message),
                            Err(e) => Err(format!("{message}; kill failed: {e}")),
                        }
                    }
                };
                (id, result)
            }
        });

        let mut report = CleanupReport::default();
        for (id, result) in join_all(stops).await {
            match result {
                Ok(()) => report.stopped.push(id),
                Err(e) => {
                    warn!(container_id = %id, "failed to stop container: {}", e);
                    report.failed.push((id, e));
                }
            }
        }

        println!("all containers stopped");
        info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            "cleanup finished"
        );
        Some(report)
    }
}
