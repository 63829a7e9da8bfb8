//! Control-plane wire models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Create-instance request body
#[derive(Debug, Clone, Serialize)]
pub struct CreateInstanceRequest {
    /// Instance name shown in the control plane
    pub name: String,

    /// Region slug
    pub region: String,

    /// Size slug
    pub size: String,

    /// Base image slug
    pub image: String,

    /// Control-plane identifiers of SSH keys to inject
    pub ssh_keys: Vec<String>,

    /// Tags attached to the instance
    pub tags: Vec<String>,

    /// Startup script executed on first boot
    pub user_data: String,
}

/// Instance record returned by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Numeric instance identifier
    pub id: u64,

    /// Control-plane status: "new", "provisioning", "active", "error", ...
    pub status: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Attached network addresses
    #[serde(default)]
    pub networks: Networks,
}

impl Instance {
    /// Whether the control plane reports the instance running
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Whether the control plane reports the instance failed
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "error" | "failed")
    }

    /// First public IPv4 address, if one is attached yet
    pub fn public_ipv4(&self) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|network| network.kind == "public")
            .map(|network| network.ip_address.as_str())
    }
}

/// Network addresses attached to an instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Networks {
    /// IPv4 interfaces
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

/// One IPv4 interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkV4 {
    /// Dotted-quad address
    pub ip_address: String,

    /// Interface visibility: "public" or "private"
    #[serde(rename = "type")]
    pub kind: String,
}

/// Envelope the control plane wraps single-instance responses in
#[derive(Debug, Deserialize)]
pub struct InstanceEnvelope {
    pub instance: Instance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_envelope_parsing() {
        let raw = r#"{
            "instance": {
                "id": 42,
                "status": "active",
                "created_at": "2025-11-04T09:30:00Z",
                "networks": {
                    "v4": [
                        {"ip_address": "10.128.0.3", "type": "private"},
                        {"ip_address": "10.0.0.5", "type": "public"}
                    ]
                }
            }
        }"#;

        let envelope: InstanceEnvelope = serde_json::from_str(raw).unwrap();
        let instance = envelope.instance;

        assert_eq!(instance.id, 42);
        assert!(instance.is_active());
        assert!(!instance.is_failed());
        assert_eq!(instance.public_ipv4(), Some("10.0.0.5"));
    }

    #[test]
    fn test_instance_without_networks() {
        let raw = r#"{"instance": {"id": 7, "status": "new", "created_at": "2025-11-04T09:30:00Z"}}"#;
        let envelope: InstanceEnvelope = serde_json::from_str(raw).unwrap();

        assert!(envelope.instance.public_ipv4().is_none());
        assert!(!envelope.instance.is_active());
    }
}
