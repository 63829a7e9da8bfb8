//! Service URL extraction from remote command output
//!
//! Each probe pairs a remote command with regex patterns applied to its
//! output. Probes run in order and the first capturing match that parses
//! as a valid http(s) URL wins.

use regex::Regex;
use url::Url;

use crate::errors::OrchestratorError;
use crate::settings::UrlProbeSettings;

/// Matches the `SERVICE URL:` line the startup script writes, and the
/// `URL:` line of `nodectl info` output.
pub const URL_LINE_PATTERN: &str = r"(?im)^\s*(?:service\s+)?url:\s*(https?://\S+)";

/// Matches a `--public-url` flag in a process listing.
pub const PUBLIC_URL_FLAG_PATTERN: &str = r"--public-url[=\s](https?://\S+)";

/// Last-resort match on any http(s) URL in the output.
pub const BARE_URL_PATTERN: &str = r#"(https?://[^\s"']+)"#;

/// One service URL lookup: a remote command and the patterns tried
/// against its output, in order
#[derive(Debug)]
pub struct UrlProbe {
    pub command: String,
    pub patterns: Vec<Regex>,
}

fn default_probe_settings() -> Vec<UrlProbeSettings> {
    vec![
        UrlProbeSettings {
            command: "nodectl info 2>/dev/null".to_string(),
            patterns: vec![URL_LINE_PATTERN.to_string(), BARE_URL_PATTERN.to_string()],
        },
        UrlProbeSettings {
            command: format!(
                "grep -F '{}' {} 2>/dev/null | tail -n 1",
                crate::cloud::script::SERVICE_URL_PREFIX,
                crate::cloud::script::INSTALL_LOG_PATH
            ),
            patterns: vec![URL_LINE_PATTERN.to_string()],
        },
        UrlProbeSettings {
            command: "ps axww 2>/dev/null | grep -F nodectl | grep -v grep".to_string(),
            patterns: vec![PUBLIC_URL_FLAG_PATTERN.to_string()],
        },
    ]
}

/// Compile probe settings into runnable probes
pub fn compile_probes(entries: &[UrlProbeSettings]) -> Result<Vec<UrlProbe>, OrchestratorError> {
    entries
        .iter()
        .map(|entry| {
            let patterns = entry
                .patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        OrchestratorError::ConfigError(format!("invalid URL pattern '{p}': {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(UrlProbe {
                command: entry.command.clone(),
                patterns,
            })
        })
        .collect()
}

/// Build the probe list, preferring the configured override when present
pub fn build_probes(
    overrides: Option<&[UrlProbeSettings]>,
) -> Result<Vec<UrlProbe>, OrchestratorError> {
    match overrides {
        Some(entries) => compile_probes(entries),
        None => compile_probes(&default_probe_settings()),
    }
}

/// Apply one probe's patterns to captured output. Returns the first
/// candidate that is a well-formed http(s) URL.
pub fn match_service_url(probe: &UrlProbe, output: &str) -> Option<String> {
    for pattern in &probe.patterns {
        let Some(captures) = pattern.captures(output) else {
            continue;
        };
        let candidate = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())?;
        if let Some(url) = normalize_url(candidate) {
            return Some(url);
        }
    }
    None
}

/// Strip trailing punctuation picked up by greedy patterns, then validate.
/// Returns the trimmed original text, not a re-serialized URL, so the
/// stored value matches what the instance printed.
fn normalize_url(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim_end_matches(['"', '\'', ')', ',', '.', ';']);
    let parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(trimmed.to_string())
}
