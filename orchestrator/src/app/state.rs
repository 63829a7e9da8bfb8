//! Application state management

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::app::options::AppOptions;
use crate::cloud::client::CloudClient;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::OrchestratorError;
use crate::inspect::SshInspector;

/// Activity tracker for idle timeout detection
pub struct ActivityTracker {
    last_touched: AtomicU64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_touched: AtomicU64::new(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_secs(),
            ),
        }
    }

    pub fn touch(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        self.last_touched.store(now, Ordering::SeqCst);
    }

    pub fn last_touched(&self) -> u64 {
        self.last_touched.load(Ordering::SeqCst)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Main application state
pub struct AppState {
    /// Deployment orchestrator
    pub orchestrator: Arc<Orchestrator>,

    /// Activity tracker
    pub activity_tracker: Arc<ActivityTracker>,
}

impl AppState {
    /// Initialize application state
    pub fn init(options: &AppOptions) -> Result<Self, OrchestratorError> {
        info!("Initializing application state...");

        let provisioner = Arc::new(CloudClient::from_settings(&options.cloud)?);
        let inspector = Arc::new(SshInspector::new(&options.ssh, &options.provision)?);

        let orchestrator = Arc::new(Orchestrator::new(
            provisioner,
            inspector,
            options.cloud.clone(),
            options.provision.clone(),
        ));

        let activity_tracker = Arc::new(ActivityTracker::new());

        Ok(Self {
            orchestrator,
            activity_tracker,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        info!("Shutting down application state...");
        self.orchestrator.shutdown().await;
        Ok(())
    }
}
