//! Application configuration options

use std::time::Duration;

use crate::settings::{CloudSettings, ProvisionSettings, Settings, SshSettings};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Control-plane configuration
    pub cloud: CloudSettings,

    /// SSH access configuration
    pub ssh: SshSettings,

    /// Provisioning and polling configuration
    pub provision: ProvisionSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            enable_socket_server: true,
            server: ServerOptions::default(),
            cloud: CloudSettings::default(),
            ssh: SshSettings::default(),
            provision: ProvisionSettings::default(),
        }
    }
}

impl AppOptions {
    /// Build runtime options from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                is_persistent: settings.is_persistent,
                ..LifecycleOptions::default()
            },
            enable_socket_server: true,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            cloud: settings.cloud.clone(),
            ssh: settings.ssh.clone(),
            provision: settings.provision.clone(),
        }
    }
}

/// Lifecycle options for the orchestrator
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Whether the orchestrator runs persistently (as a service)
    pub is_persistent: bool,

    /// Idle timeout before shutdown (non-persistent mode)
    pub idle_timeout: Duration,

    /// Interval to check for idle timeout
    pub idle_timeout_poll_interval: Duration,

    /// Maximum runtime before shutdown (non-persistent mode)
    pub max_runtime: Duration,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            is_persistent: true,
            idle_timeout: Duration::from_secs(1800), // 30 minutes
            idle_timeout_poll_interval: Duration::from_secs(10),
            max_runtime: Duration::from_secs(14400), // 4 hours
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
