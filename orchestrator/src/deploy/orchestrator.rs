//! Deployment orchestrator
//!
//! Owns the registry, the event hub, and one poller task per active
//! deployment. The HTTP layer talks to this type only.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cloud::client::Provisioner;
use crate::cloud::models::CreateInstanceRequest;
use crate::cloud::script::render_startup_script;
use crate::deploy::poller::{self, Handles};
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::OrchestratorError;
use crate::hub::EventHub;
use crate::inspect::Inspector;
use crate::models::deployment::{DeployEvent, Deployment};
use crate::settings::{CloudSettings, ProvisionSettings};
use crate::utils::generate_uuid;

/// How long a signaled poller may keep running before it is aborted
const POLLER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct PollerTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Deployment orchestrator
pub struct Orchestrator {
    handles: Handles,
    poller_options: poller::Options,
    cloud: CloudSettings,
    provision: ProvisionSettings,
    tasks: RwLock<HashMap<String, PollerTask>>,
}

impl Orchestrator {
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        inspector: Arc<dyn Inspector>,
        cloud: CloudSettings,
        provision: ProvisionSettings,
    ) -> Self {
        Self {
            handles: Handles {
                provisioner,
                inspector,
                registry: Arc::new(DeploymentRegistry::new()),
                hub: Arc::new(EventHub::new()),
            },
            poller_options: poller::Options::from_settings(&provision),
            cloud,
            provision,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Create an instance for the artifact and start polling it to
    /// readiness. Returns the initial deployment snapshot.
    pub async fn deploy(
        &self,
        artifact_url: &str,
        tag: Option<String>,
    ) -> Result<Deployment, OrchestratorError> {
        let script = render_startup_script(artifact_url, &self.provision.installer_url);
        let name = match &tag {
            Some(tag) => format!("nodeup-{}", tag),
            None => format!("nodeup-{}", &generate_uuid()[..8]),
        };
        let request = CreateInstanceRequest {
            name,
            region: self.cloud.region.clone(),
            size: self.cloud.size.clone(),
            image: self.cloud.image.clone(),
            ssh_keys: self.cloud.ssh_key_ids.clone(),
            tags: vec!["nodeup".to_string()],
            user_data: script,
        };

        let instance = self.handles.provisioner.create(&request).await?;
        let id = instance.id.to_string();

        let deployment = Deployment::new(&id, instance.created_at, tag);
        self.handles.registry.insert(deployment.clone());
        self.handles
            .hub
            .publish(&id, DeployEvent::snapshot(deployment.clone()));

        self.spawn_poller(&id);

        info!("Deployment {} started for artifact {}", id, artifact_url);
        Ok(deployment)
    }

    /// Current snapshot of one deployment
    pub fn status(&self, id: &str) -> Option<Deployment> {
        self.handles.registry.get(id)
    }

    /// Snapshots of all tracked deployments
    pub fn list(&self) -> Vec<Deployment> {
        self.handles.registry.all()
    }

    pub fn registry(&self) -> &Arc<DeploymentRegistry> {
        &self.handles.registry
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.handles.hub
    }

    /// Tear down a deployment: stop its poller, close its event stream,
    /// destroy the instance, drop the record. Unknown ids are a no-op
    /// success and never reach the control plane.
    pub async fn destroy(&self, id: &str) -> Result<bool, OrchestratorError> {
        if !self.handles.registry.contains(id) {
            debug!("Destroy for unknown deployment {}; nothing to do", id);
            return Ok(false);
        }

        info!("Destroying deployment {}", id);

        // Stop the poller first so no further transitions race the teardown
        let task = {
            let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
            tasks.remove(id)
        };
        if let Some(task) = task {
            let _ = task.stop.send(());
            let abort = task.handle.abort_handle();
            if tokio::time::timeout(POLLER_STOP_TIMEOUT, task.handle)
                .await
                .is_err()
            {
                warn!("Poller for {} did not stop in time; aborting", id);
                abort.abort();
            }
        }

        self.handles.hub.close(id);

        // The control plane answering "already gone" still means gone
        if let Err(e) = self.handles.provisioner.destroy(id).await {
            warn!("Control-plane destroy for {} failed: {}", id, e);
        }

        self.handles.registry.remove(id);
        info!("Deployment {} destroyed", id);
        Ok(true)
    }

    /// Signal every poller and wait for them to wind down
    pub async fn shutdown(&self) {
        let tasks: Vec<(String, PollerTask)> = {
            let mut map = self.tasks.write().unwrap_or_else(|e| e.into_inner());
            map.drain().collect()
        };

        let mut handles = Vec::new();
        for (id, task) in tasks {
            let _ = task.stop.send(());
            handles.push((id, task.handle));
        }
        for (id, handle) in handles {
            if tokio::time::timeout(POLLER_STOP_TIMEOUT, handle).await.is_err() {
                warn!("Poller for {} did not stop in time during shutdown", id);
            }
        }

        // End every event stream so attached followers disconnect
        for deployment in self.handles.registry.all() {
            self.handles.hub.close(&deployment.id);
        }
    }

    fn spawn_poller(&self, id: &str) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let options = self.poller_options.clone();
        let handles = self.handles.clone();
        let id_owned = id.to_string();

        let handle = tokio::spawn(async move {
            poller::run(
                &options,
                &id_owned,
                handles,
                |duration| tokio::time::sleep(duration),
                Box::pin(async move {
                    let _ = stop_rx.await;
                }),
            )
            .await;
        });

        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(id.to_string(), PollerTask { stop: stop_tx, handle });
    }
}
