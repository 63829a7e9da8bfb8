//! Deployment orchestrator unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use nodeup::cloud::client::Provisioner;
use nodeup::cloud::models::{CreateInstanceRequest, Instance, NetworkV4, Networks};
use nodeup::deploy::orchestrator::Orchestrator;
use nodeup::errors::OrchestratorError;
use nodeup::hub::STREAM_CLOSED_MESSAGE;
use nodeup::inspect::{Inspector, Progress};
use nodeup::models::deployment::{Deployment, DeploymentStatus};
use nodeup::settings::{CloudSettings, ProvisionSettings};

fn instance(id: u64, status: &str, public_ip: Option<&str>) -> Instance {
    Instance {
        id,
        status: status.to_string(),
        created_at: Utc::now(),
        networks: Networks {
            v4: public_ip
                .map(|ip| {
                    vec![NetworkV4 {
                        ip_address: ip.to_string(),
                        kind: "public".to_string(),
                    }]
                })
                .unwrap_or_default(),
        },
    }
}

/// Provisioner counting calls and capturing the last create request
struct StubProvisioner {
    instance: Instance,
    fail_create: bool,
    fail_destroy: bool,
    create_calls: AtomicUsize,
    describe_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    last_create: Mutex<Option<CreateInstanceRequest>>,
}

impl StubProvisioner {
    fn new(instance: Instance) -> Self {
        Self {
            instance,
            fail_create: false,
            fail_destroy: false,
            create_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            last_create: Mutex::new(None),
        }
    }

    fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    fn with_failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }
}

#[async_trait]
impl Provisioner for StubProvisioner {
    async fn create(&self, request: &CreateInstanceRequest) -> Result<Instance, OrchestratorError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_create.lock().unwrap() = Some(request.clone());
        if self.fail_create {
            return Err(OrchestratorError::ProvisioningError(
                "control-plane API token is not configured".to_string(),
            ));
        }
        Ok(self.instance.clone())
    }

    async fn describe(&self, _id: &str) -> Result<Instance, OrchestratorError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.instance.clone())
    }

    async fn destroy(&self, _id: &str) -> Result<(), OrchestratorError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy {
            return Err(OrchestratorError::ProvisioningError(
                "404: instance not found".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inspector with a fixed answer for every check
struct StubInspector {
    ready: bool,
    url: Option<String>,
}

#[async_trait]
impl Inspector for StubInspector {
    async fn check_progress(&self, _ip: &str) -> Result<Progress, OrchestratorError> {
        Ok(Progress {
            sentinel_found: self.ready,
            log_tail: String::new(),
        })
    }

    async fn extract_service_url(&self, _ip: &str) -> Result<Option<String>, OrchestratorError> {
        Ok(self.url.clone())
    }

    fn tail_install_log(&self, _ip: &str) -> mpsc::UnboundedReceiver<String> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }
}

fn ready_inspector(url: Option<&str>) -> Arc<StubInspector> {
    Arc::new(StubInspector {
        ready: true,
        url: url.map(|u| u.to_string()),
    })
}

fn fast_settings() -> ProvisionSettings {
    ProvisionSettings {
        network_poll_attempts: 5,
        network_poll_interval_secs: 0,
        install_poll_attempts: 5,
        install_poll_interval_secs: 0,
        ..ProvisionSettings::default()
    }
}

fn slow_settings() -> ProvisionSettings {
    ProvisionSettings {
        network_poll_attempts: 10,
        network_poll_interval_secs: 30,
        ..ProvisionSettings::default()
    }
}

fn build(
    provisioner: Arc<StubProvisioner>,
    inspector: Arc<StubInspector>,
    provision: ProvisionSettings,
) -> Orchestrator {
    Orchestrator::new(provisioner, inspector, CloudSettings::default(), provision)
}

async fn wait_for_terminal(orchestrator: &Orchestrator, id: &str) -> Deployment {
    for _ in 0..200 {
        if let Some(deployment) = orchestrator.status(id) {
            if deployment.status.is_terminal() {
                return deployment;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("deployment {id} never reached a terminal state");
}

#[tokio::test]
async fn test_deploy_runs_to_ready() {
    let provisioner = Arc::new(StubProvisioner::new(instance(42, "active", Some("10.0.0.5"))));
    let orchestrator = build(
        provisioner.clone(),
        ready_inspector(Some("https://abc123.example")),
        fast_settings(),
    );

    let deployment = orchestrator
        .deploy("https://artifacts.example/node.tar.gz", Some("alpha".to_string()))
        .await
        .unwrap();
    assert_eq!(deployment.id, "42");
    assert_eq!(deployment.status, DeploymentStatus::Creating);
    assert_eq!(deployment.tag.as_deref(), Some("alpha"));

    let request = provisioner.last_create.lock().unwrap().clone().unwrap();
    assert_eq!(request.name, "nodeup-alpha");
    assert!(request.user_data.contains("https://artifacts.example/node.tar.gz"));
    assert_eq!(request.tags, vec!["nodeup".to_string()]);

    let final_state = wait_for_terminal(&orchestrator, "42").await;
    assert_eq!(final_state.status, DeploymentStatus::Ready);
    assert_eq!(final_state.ip.as_deref(), Some("10.0.0.5"));
    assert_eq!(final_state.service_url.as_deref(), Some("https://abc123.example"));
    assert_eq!(provisioner.create_calls.load(Ordering::SeqCst), 1);

    // The stream opens with the accepted-state snapshot
    let (events, _, _) = orchestrator.hub().history_from("42", 0);
    let first = events.first().unwrap();
    assert_eq!(first.snapshot.as_ref().unwrap().status, DeploymentStatus::Creating);
}

#[tokio::test]
async fn test_deploy_without_tag_generates_name() {
    let provisioner = Arc::new(StubProvisioner::new(instance(7, "active", Some("10.0.0.9"))));
    let orchestrator = build(provisioner.clone(), ready_inspector(None), fast_settings());

    let deployment = orchestrator
        .deploy("https://artifacts.example/node.tar.gz", None)
        .await
        .unwrap();
    assert!(deployment.tag.is_none());

    let request = provisioner.last_create.lock().unwrap().clone().unwrap();
    assert!(request.name.starts_with("nodeup-"));
    assert_eq!(request.name.len(), "nodeup-".len() + 8);
}

#[tokio::test]
async fn test_deploy_failure_surfaces_error() {
    let provisioner =
        Arc::new(StubProvisioner::new(instance(42, "active", None)).with_failing_create());
    let orchestrator = build(provisioner.clone(), ready_inspector(None), fast_settings());

    let result = orchestrator.deploy("https://artifacts.example/node.tar.gz", None).await;

    assert!(matches!(result, Err(OrchestratorError::ProvisioningError(_))));
    assert!(orchestrator.list().is_empty());
}

#[tokio::test]
async fn test_destroy_unknown_id_skips_control_plane() {
    let provisioner = Arc::new(StubProvisioner::new(instance(42, "active", Some("10.0.0.5"))));
    let orchestrator = build(provisioner.clone(), ready_inspector(None), fast_settings());

    let destroyed = orchestrator.destroy("999").await.unwrap();

    assert!(!destroyed);
    assert_eq!(provisioner.destroy_calls.load(Ordering::SeqCst), 0);
    assert_eq!(provisioner.describe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_destroy_tracked_deployment() {
    let provisioner = Arc::new(StubProvisioner::new(instance(42, "active", Some("10.0.0.5"))));
    let orchestrator = build(
        provisioner.clone(),
        ready_inspector(Some("https://abc123.example")),
        fast_settings(),
    );

    orchestrator
        .deploy("https://artifacts.example/node.tar.gz", None)
        .await
        .unwrap();
    wait_for_terminal(&orchestrator, "42").await;

    let destroyed = orchestrator.destroy("42").await.unwrap();
    assert!(destroyed);
    assert_eq!(provisioner.destroy_calls.load(Ordering::SeqCst), 1);
    assert!(orchestrator.status("42").is_none());

    // The event stream is closed out with the final sentinel
    let (events, _, closed) = orchestrator.hub().history_from("42", 0);
    assert!(closed);
    assert_eq!(
        events.last().unwrap().message.as_deref(),
        Some(STREAM_CLOSED_MESSAGE)
    );
    assert!(orchestrator.hub().subscribe("42").is_none());

    // Destroying again is a tracked no-op
    let destroyed = orchestrator.destroy("42").await.unwrap();
    assert!(!destroyed);
    assert_eq!(provisioner.destroy_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_destroy_cancels_active_poller() {
    let provisioner = Arc::new(StubProvisioner::new(instance(42, "new", None)));
    let inspector = Arc::new(StubInspector { ready: false, url: None });
    let orchestrator = build(provisioner.clone(), inspector, slow_settings());

    orchestrator
        .deploy("https://artifacts.example/node.tar.gz", None)
        .await
        .unwrap();

    // Give the poller a beat to enter its first waiting period
    tokio::time::sleep(Duration::from_millis(10)).await;

    let destroyed = orchestrator.destroy("42").await.unwrap();
    assert!(destroyed);
    assert!(orchestrator.status("42").is_none());
    assert_eq!(provisioner.destroy_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provisioner.describe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_destroy_swallows_control_plane_errors() {
    let provisioner = Arc::new(
        StubProvisioner::new(instance(42, "active", Some("10.0.0.5"))).with_failing_destroy(),
    );
    let orchestrator = build(provisioner.clone(), ready_inspector(None), fast_settings());

    orchestrator
        .deploy("https://artifacts.example/node.tar.gz", None)
        .await
        .unwrap();
    wait_for_terminal(&orchestrator, "42").await;

    // "Already gone" from the control plane still counts as destroyed
    let destroyed = orchestrator.destroy("42").await.unwrap();
    assert!(destroyed);
    assert!(orchestrator.status("42").is_none());
    assert_eq!(provisioner.destroy_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_stops_pollers_and_closes_streams() {
    let provisioner = Arc::new(StubProvisioner::new(instance(42, "new", None)));
    let inspector = Arc::new(StubInspector { ready: false, url: None });
    let orchestrator = build(provisioner.clone(), inspector, slow_settings());

    orchestrator
        .deploy("https://artifacts.example/node.tar.gz", None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    orchestrator.shutdown().await;

    // The record survives shutdown; only the stream ends
    assert!(orchestrator.status("42").is_some());
    let (_, _, closed) = orchestrator.hub().history_from("42", 0);
    assert!(closed);
}
