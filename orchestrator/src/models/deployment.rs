//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Create call accepted by the control plane
    Creating,

    /// Waiting for the instance to report active with a public address
    NetworkPending,

    /// Startup script running, waiting for the completion sentinel
    Installing,

    /// Installation finished; `service_url` is set when one was extracted
    Ready,

    /// An attempt budget ran out before the next milestone
    Timeout,

    /// The control plane reported the instance itself failed
    Error,
}

impl DeploymentStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Ready | DeploymentStatus::Timeout | DeploymentStatus::Error
        )
    }
}

/// One tracked provisioning attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Instance identifier assigned by the control plane
    pub id: String,

    /// Current status; mutated only by the readiness poller
    pub status: DeploymentStatus,

    /// Public IPv4 address, set once the instance reports active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Ready-service URL, set at install completion when one was extracted;
    /// never cleared once set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    /// Creation timestamp from the control plane
    pub created_at: DateTime<Utc>,

    /// Caller-supplied deploy tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Most recent progress note from the poller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Terminal error description, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Deployment {
    /// Create a record for a freshly accepted instance
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, tag: Option<String>) -> Self {
        Self {
            id: id.into(),
            status: DeploymentStatus::Creating,
            ip: None,
            service_url: None,
            created_at,
            tag,
            detail: None,
            error: None,
        }
    }
}

/// One event published to a deployment's stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployEvent {
    /// Publish timestamp
    pub ts: DateTime<Utc>,

    /// Progress or log line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Full deployment snapshot, emitted on attach and at every transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Deployment>,
}

impl DeployEvent {
    /// Build a message event stamped now
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            message: Some(text.into()),
            snapshot: None,
        }
    }

    /// Build a snapshot event stamped now
    pub fn snapshot(deployment: Deployment) -> Self {
        Self {
            ts: Utc::now(),
            message: None,
            snapshot: Some(deployment),
        }
    }
}
