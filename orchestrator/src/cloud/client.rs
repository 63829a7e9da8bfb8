//! Cloud control-plane client

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use crate::cloud::models::{CreateInstanceRequest, Instance, InstanceEnvelope};
use crate::errors::OrchestratorError;
use crate::settings::CloudSettings;

/// Control-plane operations the orchestrator depends on
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create an instance and return the authoritative record
    async fn create(&self, request: &CreateInstanceRequest) -> Result<Instance, OrchestratorError>;

    /// Fetch the current record for an instance. Side-effect-free.
    async fn describe(&self, id: &str) -> Result<Instance, OrchestratorError>;

    /// Destroy an instance
    async fn destroy(&self, id: &str) -> Result<(), OrchestratorError>;
}

/// REST client for the cloud control plane
pub struct CloudClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl CloudClient {
    /// Create a new control-plane client
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, OrchestratorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from settings, reading the API token from the
    /// environment variable the settings name
    pub fn from_settings(settings: &CloudSettings) -> Result<Self, OrchestratorError> {
        let token = std::env::var(&settings.token_env).ok().map(SecretString::from);
        Self::new(&settings.base_url, token)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token(&self) -> Result<&SecretString, OrchestratorError> {
        self.token.as_ref().ok_or_else(|| {
            OrchestratorError::ProvisioningError(
                "control-plane API token is not configured".to_string(),
            )
        })
    }
}

#[async_trait]
impl Provisioner for CloudClient {
    async fn create(&self, request: &CreateInstanceRequest) -> Result<Instance, OrchestratorError> {
        let token = self.token()?;
        let url = format!("{}/instances", self.base_url);
        debug!("POST {} (create instance {})", url, request.name);

        let response = self
            .client
            .post(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            )
            .json(request)
            .send()
            .await
            .map_err(|e| {
                OrchestratorError::ProvisioningError(format!("create request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Instance create failed: {} - {}", status, body);
            return Err(OrchestratorError::ProvisioningError(format!(
                "{}: {}",
                status, body
            )));
        }

        let envelope: InstanceEnvelope = response.json().await.map_err(|e| {
            OrchestratorError::ProvisioningError(format!("malformed create response: {e}"))
        })?;
        Ok(envelope.instance)
    }

    async fn describe(&self, id: &str) -> Result<Instance, OrchestratorError> {
        let token = self.token()?;
        let url = format!("{}/instances/{}", self.base_url, id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::ProvisioningError(format!(
                "{}: {}",
                status, body
            )));
        }

        let envelope: InstanceEnvelope = response.json().await?;
        Ok(envelope.instance)
    }

    async fn destroy(&self, id: &str) -> Result<(), OrchestratorError> {
        let token = self.token()?;
        let url = format!("{}/instances/{}", self.base_url, id);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| {
                OrchestratorError::ProvisioningError(format!("destroy request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Instance destroy failed: {} - {}", status, body);
            return Err(OrchestratorError::ProvisioningError(format!(
                "{}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
