//! Remote progress inspection
//!
//! Watches installation progress on provisioned instances over SSH: a
//! one-shot sentinel check with log context, ordered service URL probes,
//! and a live install log tail.

pub mod extract;
pub mod session;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cloud::script::{INSTALL_LOG_PATH, READY_SENTINEL};
use crate::errors::OrchestratorError;
use crate::inspect::extract::{build_probes, match_service_url, UrlProbe};
use crate::inspect::session::{exec, spawn_tail, SshAccess};
use crate::settings::{ProvisionSettings, SshSettings};

/// First line of progress output when the completion sentinel is present
const SENTINEL_MARKER: &str = "__NODEUP_INSTALL_DONE__";

/// Install log lines captured per progress check
const TAIL_LINES: u32 = 20;

/// Result of a single progress check
#[derive(Debug, Clone)]
pub struct Progress {
    /// Whether the install completion sentinel is in the log
    pub sentinel_found: bool,
    /// Recent install log lines, empty while the instance is still booting
    pub log_tail: String,
}

/// Remote inspection operations the readiness poller depends on
#[async_trait]
pub trait Inspector: Send + Sync {
    /// One-shot check of install progress on an instance
    async fn check_progress(&self, ip: &str) -> Result<Progress, OrchestratorError>;

    /// Try the URL probes in order. `Ok(None)` means the probes ran and
    /// nothing matched.
    async fn extract_service_url(&self, ip: &str) -> Result<Option<String>, OrchestratorError>;

    /// Start following the install log. Lines arrive on the returned
    /// channel until the remote session ends or the receiver is dropped.
    fn tail_install_log(&self, ip: &str) -> mpsc::UnboundedReceiver<String>;
}

/// Inspector backed by direct SSH sessions
pub struct SshInspector {
    access: SshAccess,
    probes: Vec<UrlProbe>,
}

impl SshInspector {
    pub fn new(
        ssh: &SshSettings,
        provision: &ProvisionSettings,
    ) -> Result<Self, OrchestratorError> {
        Ok(Self {
            access: SshAccess::from_settings(ssh),
            probes: build_probes(provision.url_probes.as_deref())?,
        })
    }
}

/// The sentinel check and log tail run as one remote command so a single
/// session answers both. A missing log file yields empty output, not an
/// error.
fn progress_command() -> String {
    format!(
        "grep -qsF '{READY_SENTINEL}' {INSTALL_LOG_PATH} && echo '{SENTINEL_MARKER}'; \
         tail -n {TAIL_LINES} {INSTALL_LOG_PATH} 2>/dev/null; true"
    )
}

fn parse_progress(stdout: &str) -> Progress {
    match stdout.strip_prefix(SENTINEL_MARKER) {
        Some(rest) => Progress {
            sentinel_found: true,
            log_tail: rest.trim_start_matches('\n').to_string(),
        },
        None => Progress {
            sentinel_found: false,
            log_tail: stdout.to_string(),
        },
    }
}

#[async_trait]
impl Inspector for SshInspector {
    async fn check_progress(&self, ip: &str) -> Result<Progress, OrchestratorError> {
        let output = exec(&self.access, ip, &progress_command()).await?;
        let progress = parse_progress(&output.stdout);
        debug!(
            "Progress check on {}: sentinel={} tail_bytes={}",
            ip,
            progress.sentinel_found,
            progress.log_tail.len()
        );
        Ok(progress)
    }

    async fn extract_service_url(&self, ip: &str) -> Result<Option<String>, OrchestratorError> {
        let mut first_err = None;
        let mut any_ran = false;

        for probe in &self.probes {
            match exec(&self.access, ip, &probe.command).await {
                Ok(output) => {
                    any_ran = true;
                    if let Some(url) = match_service_url(probe, &output.stdout) {
                        debug!("Service URL for {} found via '{}'", ip, probe.command);
                        return Ok(Some(url));
                    }
                }
                Err(e) => {
                    debug!("URL probe '{}' on {} failed: {}", probe.command, ip, e);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match (any_ran, first_err) {
            // Nothing was reachable at all; let the caller retry instead
            // of recording the URL as absent
            (false, Some(e)) => Err(e),
            _ => Ok(None),
        }
    }

    fn tail_install_log(&self, ip: &str) -> mpsc::UnboundedReceiver<String> {
        spawn_tail(&self.access, ip, INSTALL_LOG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_command_shape() {
        let command = progress_command();

        assert!(command.contains("grep -qsF 'NODE INSTALL COMPLETE'"));
        assert!(command.contains("/var/log/node-install.log"));
        assert!(command.ends_with("true"));
    }

    #[test]
    fn test_parse_progress_with_sentinel() {
        let stdout = format!("{SENTINEL_MARKER}\n[nodeup 5/5] done\nNODE INSTALL COMPLETE\n");

        let progress = parse_progress(&stdout);
        assert!(progress.sentinel_found);
        assert_eq!(progress.log_tail, "[nodeup 5/5] done\nNODE INSTALL COMPLETE\n");
    }

    #[test]
    fn test_parse_progress_without_sentinel() {
        let stdout = "[nodeup 2/5] fetching installer\n";

        let progress = parse_progress(stdout);
        assert!(!progress.sentinel_found);
        assert_eq!(progress.log_tail, stdout);
    }

    #[test]
    fn test_parse_progress_empty_output() {
        let progress = parse_progress("");

        assert!(!progress.sentinel_found);
        assert!(progress.log_tail.is_empty());
    }
}
