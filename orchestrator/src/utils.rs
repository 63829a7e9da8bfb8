//! Utility functions

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Version information for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn check_line(ok: bool, label: &str, detail: &str) -> bool {
    if ok {
        println!("{} {} {}", "✓".green(), label, detail.dimmed());
    } else {
        println!("{} {} {}", "✗".red(), label, detail.red());
    }
    ok
}

/// Check the local environment: credentials, SSH key material, and
/// control-plane reachability. Prints one line per check.
pub async fn run_diagnostic(settings: &Settings) -> bool {
    println!("nodeup diagnostic");
    println!("-----------------");

    let token = std::env::var(&settings.cloud.token_env).ok();
    let mut ok = check_line(
        token.is_some(),
        "control-plane token",
        &format!("env {}", settings.cloud.token_env),
    );

    let key_exists = tokio::fs::metadata(&settings.ssh.key_path).await.is_ok();
    ok &= check_line(
        key_exists,
        "SSH private key",
        &settings.ssh.key_path.display().to_string(),
    );

    let endpoint = format!("{}/instances", settings.cloud.base_url.trim_end_matches('/'));
    let reachable = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
    {
        Ok(client) => {
            let mut request = client.get(&endpoint);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) => {
                    check_line(true, "control plane", &format!("{} ({})", endpoint, response.status()))
                }
                Err(e) => check_line(false, "control plane", &format!("{} ({})", endpoint, e)),
            }
        }
        Err(e) => check_line(false, "control plane", &e.to_string()),
    };
    ok &= reachable;

    if ok {
        println!("{}", "all checks passed".green());
    } else {
        println!("{}", "one or more checks failed".red());
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid() {
        let a = generate_uuid();
        let b = generate_uuid();

        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
        assert_ne!(a, b);
    }

    #[test]
    fn test_version_info() {
        let version = version_info();
        assert!(!version.version.is_empty());
    }
}
