//! Readiness polling worker
//!
//! One worker runs per deployment and drives it to a terminal state: wait
//! for a public address, then for the install completion sentinel, then
//! extract the service URL. Every transition and progress note is written
//! to the registry and published to the event hub, in that order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cloud::client::Provisioner;
use crate::deploy::lifecycle::{self, LifecycleEvent};
use crate::deploy::registry::DeploymentRegistry;
use crate::deploy::retry::RetryPolicy;
use crate::hub::EventHub;
use crate::inspect::Inspector;
use crate::models::deployment::DeployEvent;
use crate::settings::ProvisionSettings;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Budget for the wait-for-address phase
    pub network: RetryPolicy,

    /// Budget for the wait-for-sentinel phase
    pub install: RetryPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            network: RetryPolicy::fixed(30, Duration::from_secs(6)),
            install: RetryPolicy::fixed(120, Duration::from_secs(15)),
        }
    }
}

impl Options {
    pub fn from_settings(provision: &ProvisionSettings) -> Self {
        Self {
            network: RetryPolicy::fixed(
                provision.network_poll_attempts,
                Duration::from_secs(provision.network_poll_interval_secs),
            ),
            install: RetryPolicy::fixed(
                provision.install_poll_attempts,
                Duration::from_secs(provision.install_poll_interval_secs),
            ),
        }
    }
}

/// Shared components the worker writes through
#[derive(Clone)]
pub struct Handles {
    pub provisioner: Arc<dyn Provisioner>,
    pub inspector: Arc<dyn Inspector>,
    pub registry: Arc<DeploymentRegistry>,
    pub hub: Arc<EventHub>,
}

/// Run the readiness poller for one deployment
pub async fn run<S, F>(
    options: &Options,
    id: &str,
    handles: Handles,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Readiness poller starting for {}", id);

    record(&handles, id, LifecycleEvent::Provisioned);

    // Phase 1: wait for a public address
    let mut ip: Option<String> = None;
    for attempt in 1..=options.network.max_attempts {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Readiness poller for {} shutting down...", id);
                return;
            }
            _ = sleep_fn(options.network.delay_for(attempt)) => {}
        }

        debug!(
            "Network poll {}/{} for {}",
            attempt, options.network.max_attempts, id
        );

        match handles.provisioner.describe(id).await {
            Ok(instance) => {
                if instance.is_failed() {
                    note(&handles, id, &format!("instance entered status '{}'", instance.status));
                    record(
                        &handles,
                        id,
                        LifecycleEvent::InstanceFailed(format!(
                            "control plane reports status '{}'",
                            instance.status
                        )),
                    );
                    return;
                }
                if instance.is_active() {
                    if let Some(address) = instance.public_ipv4() {
                        let address = address.to_string();
                        note(&handles, id, &format!("network address assigned: {}", address));
                        ip = Some(address);
                        break;
                    }
                }
                debug!("Instance {} not network-ready yet (status '{}')", id, instance.status);
            }
            Err(e) => {
                note(&handles, id, &format!("status check failed: {}", e));
                warn!("Describe failed for {}: {}", id, e);
            }
        }
    }

    let Some(ip) = ip else {
        note(&handles, id, "timed out waiting for a network address");
        record(
            &handles,
            id,
            LifecycleEvent::AttemptsExhausted(
                "no public address within the polling budget".to_string(),
            ),
        );
        return;
    };

    record(&handles, id, LifecycleEvent::AddressAssigned(ip.clone()));

    // Phase 2: wait for the install sentinel. The live tail is advisory;
    // terminal decisions come from the single-shot progress checks only.
    info!("Instance {} at {}; waiting for installation", id, ip);

    let tail_handles = handles.clone();
    let tail_id = id.to_string();
    let mut tail_rx = handles.inspector.tail_install_log(&ip);
    let tail_task = tokio::spawn(async move {
        while let Some(line) = tail_rx.recv().await {
            tail_handles.hub.publish(&tail_id, DeployEvent::message(line));
        }
    });

    let mut outcome: Option<LifecycleEvent> = None;
    for attempt in 1..=options.install.max_attempts {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Readiness poller for {} shutting down...", id);
                tail_task.abort();
                return;
            }
            _ = sleep_fn(options.install.delay_for(attempt)) => {}
        }

        debug!(
            "Install poll {}/{} for {}",
            attempt, options.install.max_attempts, id
        );

        let progress = match handles.inspector.check_progress(&ip).await {
            Ok(progress) => progress,
            Err(e) => {
                note(&handles, id, &format!("progress check failed: {}", e));
                warn!("Progress check failed for {}: {}", id, e);

                // A dead instance explains the failure better than a
                // flaky network would
                if let Ok(instance) = handles.provisioner.describe(id).await {
                    if instance.is_failed() {
                        record(
                            &handles,
                            id,
                            LifecycleEvent::InstanceFailed(format!(
                                "control plane reports status '{}'",
                                instance.status
                            )),
                        );
                        tail_task.abort();
                        return;
                    }
                }
                continue;
            }
        };

        if !progress.sentinel_found {
            let summary = last_line(&progress.log_tail);
            if !summary.is_empty() {
                note(&handles, id, &format!("installing: {}", summary));
            }
            continue;
        }

        note(&handles, id, "install sentinel observed");

        match handles.inspector.extract_service_url(&ip).await {
            Ok(Some(url)) => {
                note(&handles, id, &format!("service URL extracted: {}", url));
                outcome = Some(LifecycleEvent::InstallCompleted {
                    service_url: Some(url),
                });
            }
            Ok(None) => {
                note(&handles, id, "installation complete, service URL not found");
                outcome = Some(LifecycleEvent::InstallCompleted { service_url: None });
            }
            Err(e) => {
                // Sentinel seen but the instance went quiet; burn the
                // attempt and look again
                note(&handles, id, &format!("URL extraction failed: {}", e));
                warn!("URL extraction failed for {}: {}", id, e);
                continue;
            }
        }
        break;
    }

    tail_task.abort();

    match outcome {
        Some(event) => record(&handles, id, event),
        None => {
            note(&handles, id, "timed out waiting for installation to finish");
            record(
                &handles,
                id,
                LifecycleEvent::AttemptsExhausted(
                    "install sentinel not observed within the polling budget".to_string(),
                ),
            );
        }
    }

    info!("Readiness poller finished for {}", id);
}

/// Publish a progress note and keep it on the record
fn note(handles: &Handles, id: &str, text: &str) {
    handles.registry.update(id, |deployment| {
        deployment.detail = Some(text.to_string());
    });
    handles.hub.publish(id, DeployEvent::message(text));
}

/// Apply a lifecycle event and publish the updated snapshot
fn record(handles: &Handles, id: &str, event: LifecycleEvent) {
    let mut applied = Ok(());
    let found = handles.registry.update(id, |deployment| {
        applied = lifecycle::apply(deployment, event);
    });
    if !found {
        debug!("Deployment {} no longer tracked", id);
        return;
    }
    if let Err(e) = applied {
        warn!("Ignored lifecycle event for {}: {}", id, e);
        return;
    }
    if let Some(snapshot) = handles.registry.get(id) {
        handles.hub.publish(id, DeployEvent::snapshot(snapshot));
    }
}

fn last_line(tail: &str) -> &str {
    tail.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}
