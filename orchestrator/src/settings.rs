//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::OrchestratorError;
use crate::logs::LogLevel;

/// Default settings file location
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/nodeup/settings.json";

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Whether the orchestrator runs persistently
    #[serde(default = "default_true")]
    pub is_persistent: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Cloud control-plane configuration
    #[serde(default)]
    pub cloud: CloudSettings,

    /// SSH access configuration for provisioned instances
    #[serde(default)]
    pub ssh: SshSettings,

    /// Provisioning and polling configuration
    #[serde(default)]
    pub provision: ProvisionSettings,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            is_persistent: true,
            server: ServerSettings::default(),
            cloud: CloudSettings::default(),
            ssh: SshSettings::default(),
            provision: ProvisionSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, OrchestratorError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let settings = serde_json::from_str(&raw)?;
        Ok(settings)
    }

    /// Read settings from a JSON file, falling back to defaults when the
    /// file is missing or unreadable
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Unable to read settings file {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Cloud control-plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Base URL for the control-plane API
    #[serde(default = "default_cloud_url")]
    pub base_url: String,

    /// Environment variable holding the control-plane API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Region new instances are created in
    #[serde(default = "default_region")]
    pub region: String,

    /// Instance size slug
    #[serde(default = "default_size")]
    pub size: String,

    /// Base image slug
    #[serde(default = "default_image")]
    pub image: String,

    /// Control-plane identifiers of SSH keys injected at creation
    #[serde(default)]
    pub ssh_key_ids: Vec<String>,
}

fn default_cloud_url() -> String {
    "https://cloud.nodeup.io/v1".to_string()
}

fn default_token_env() -> String {
    "NODEUP_CLOUD_TOKEN".to_string()
}

fn default_region() -> String {
    "fra1".to_string()
}

fn default_size() -> String {
    "s-2vcpu-4gb".to_string()
}

fn default_image() -> String {
    "ubuntu-22-04-x64".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            base_url: default_cloud_url(),
            token_env: default_token_env(),
            region: default_region(),
            size: default_size(),
            image: default_image(),
            ssh_key_ids: Vec::new(),
        }
    }
}

/// SSH settings for inspecting provisioned instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Remote user
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Remote port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Path to the private key matching one of `cloud.ssh_key_ids`
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,

    /// Environment variable holding the key passphrase, if the key has one
    #[serde(default)]
    pub passphrase_env: Option<String>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_key_path() -> PathBuf {
    PathBuf::from("/etc/nodeup/keys/id_ed25519")
}

fn default_connect_timeout() -> u64 {
    15
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            key_path: default_key_path(),
            passphrase_env: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Provisioning and readiness-polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSettings {
    /// URL of the node installer script fetched by the startup script
    #[serde(default = "default_installer_url")]
    pub installer_url: String,

    /// Attempts while waiting for a public network address
    #[serde(default = "default_network_attempts")]
    pub network_poll_attempts: u32,

    /// Seconds between network polls
    #[serde(default = "default_network_interval")]
    pub network_poll_interval_secs: u64,

    /// Attempts while waiting for the install completion sentinel
    #[serde(default = "default_install_attempts")]
    pub install_poll_attempts: u32,

    /// Seconds between install polls
    #[serde(default = "default_install_interval")]
    pub install_poll_interval_secs: u64,

    /// Override the built-in service URL probes. Each entry pairs a remote
    /// command with the regex patterns applied to its output.
    #[serde(default)]
    pub url_probes: Option<Vec<UrlProbeSettings>>,
}

fn default_installer_url() -> String {
    "https://install.nodeup.io/install.sh".to_string()
}

fn default_network_attempts() -> u32 {
    30
}

fn default_network_interval() -> u64 {
    6
}

fn default_install_attempts() -> u32 {
    120
}

fn default_install_interval() -> u64 {
    15
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            installer_url: default_installer_url(),
            network_poll_attempts: default_network_attempts(),
            network_poll_interval_secs: default_network_interval(),
            install_poll_attempts: default_install_attempts(),
            install_poll_interval_secs: default_install_interval(),
            url_probes: None,
        }
    }
}

/// One configurable service URL probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlProbeSettings {
    /// Remote command whose output is scanned
    pub command: String,

    /// Regex patterns tried against the output, in order
    pub patterns: Vec<String>,
}
