//! Startup script template injected at instance creation

/// Install log the startup script writes and the inspector reads
pub const INSTALL_LOG_PATH: &str = "/var/log/node-install.log";

/// Marker the script emits as its final line on success. The whole readiness
/// contract hangs on this string staying in sync with the progress check.
pub const READY_SENTINEL: &str = "NODE INSTALL COMPLETE";

/// Prefix of the line where the script echoes the public service URL
pub const SERVICE_URL_PREFIX: &str = "SERVICE URL:";

/// Render the startup script for one deployment. The script is
/// self-verifying: it logs numbered milestones to the install log and emits
/// the sentinel only after every step succeeded.
pub fn render_startup_script(artifact_url: &str, installer_url: &str) -> String {
    format!(
        r#"#!/bin/bash
set -eu
exec >> {log} 2>&1

echo "[nodeup 1/5] bootstrap started at $(date -u +%FT%TZ)"
export HOME=/root
curl -sSfL '{installer}' | bash

echo "[nodeup 2/5] installer finished"
source /root/.bashrc >/dev/null 2>&1 || true
export PATH="$HOME/nodectl/bin:$PATH"

echo "[nodeup 3/5] configuring node with artifact"
nodectl config --artifact '{artifact}'

echo "[nodeup 4/5] initializing node"
nodectl init

echo "[nodeup 5/5] starting node"
nodectl start

echo "{url_prefix} $(nodectl info --url 2>/dev/null)"
echo "{sentinel}"
"#,
        log = INSTALL_LOG_PATH,
        installer = installer_url,
        artifact = artifact_url,
        url_prefix = SERVICE_URL_PREFIX,
        sentinel = READY_SENTINEL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_embeds_artifact_and_contract_markers() {
        let script = render_startup_script(
            "https://snapshots.example/kb-7.tar.gz",
            "https://install.nodeup.io/install.sh",
        );

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("https://snapshots.example/kb-7.tar.gz"));
        assert!(script.contains("https://install.nodeup.io/install.sh"));
        assert!(script.contains(INSTALL_LOG_PATH));
        assert!(script.contains(SERVICE_URL_PREFIX));

        // The sentinel must be the last thing the script emits
        assert_eq!(script.trim_end().lines().last(), Some(r#"echo "NODE INSTALL COMPLETE""#));
    }

    #[test]
    fn test_script_aborts_before_sentinel_on_failure() {
        let script = render_startup_script("https://a.example/x", "https://b.example/y");

        // set -e makes any failed step abort the script before the sentinel
        assert!(script.contains("set -eu"));
        let sentinel_line = script
            .lines()
            .position(|line| line.contains(READY_SENTINEL))
            .unwrap();
        let start_line = script
            .lines()
            .position(|line| line.contains("nodectl start"))
            .unwrap();
        assert!(start_line < sentinel_line);
    }
}
