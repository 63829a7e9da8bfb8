//! Blocking SSH session plumbing
//!
//! ssh2 sessions are synchronous, so every remote operation runs on the
//! blocking thread pool. One-shot commands open a session, run, and tear
//! it down; the log tail holds its session open and bridges lines back
//! over a channel.

use std::io::{BufRead, BufReader, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use ssh2::Session;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::errors::OrchestratorError;
use crate::settings::SshSettings;

/// Connection parameters for instance SSH access
#[derive(Clone)]
pub struct SshAccess {
    pub user: String,
    pub port: u16,
    pub key_path: PathBuf,
    pub passphrase: Option<SecretString>,
    pub connect_timeout: Duration,
}

impl SshAccess {
    pub fn from_settings(settings: &SshSettings) -> Self {
        let passphrase = settings
            .passphrase_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .map(SecretString::from);

        Self {
            user: settings.user.clone(),
            port: settings.port,
            key_path: settings.key_path.clone(),
            passphrase,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        }
    }
}

/// Captured output of a one-shot remote command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// Open an authenticated session. Blocking; call from the blocking pool.
fn connect(access: &SshAccess, ip: &str) -> Result<Session, OrchestratorError> {
    let addr = (ip, access.port)
        .to_socket_addrs()
        .map_err(|e| OrchestratorError::ConnectivityError(format!("resolve {ip}: {e}")))?
        .next()
        .ok_or_else(|| {
            OrchestratorError::ConnectivityError(format!("no address for {ip}:{}", access.port))
        })?;

    let tcp = TcpStream::connect_timeout(&addr, access.connect_timeout)
        .map_err(|e| OrchestratorError::ConnectivityError(format!("connect {addr}: {e}")))?;

    let mut session = Session::new()
        .map_err(|e| OrchestratorError::ConnectivityError(format!("session init: {e}")))?;
    session.set_tcp_stream(tcp);
    // Bounds the handshake and auth exchange; cleared for long-lived tails
    session.set_timeout(access.connect_timeout.as_millis() as u32);
    session
        .handshake()
        .map_err(|e| OrchestratorError::ConnectivityError(format!("handshake with {addr}: {e}")))?;
    session
        .userauth_pubkey_file(
            &access.user,
            None,
            &access.key_path,
            access.passphrase.as_ref().map(|p| p.expose_secret()),
        )
        .map_err(|e| {
            OrchestratorError::ConnectivityError(format!(
                "authenticate as {} on {addr}: {e}",
                access.user
            ))
        })?;

    Ok(session)
}

fn exec_blocking(
    access: &SshAccess,
    ip: &str,
    command: &str,
) -> Result<CommandOutput, OrchestratorError> {
    let session = connect(access, ip)?;
    let mut channel = session
        .channel_session()
        .map_err(|e| OrchestratorError::ProgressError(format!("open channel to {ip}: {e}")))?;
    channel
        .exec(command)
        .map_err(|e| OrchestratorError::ProgressError(format!("exec on {ip}: {e}")))?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| OrchestratorError::ProgressError(format!("read output from {ip}: {e}")))?;
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    let _ = channel.wait_close();
    let exit_status = channel.exit_status().unwrap_or(-1);

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_status,
    })
}

/// Run a one-shot command against an instance
pub async fn exec(
    access: &SshAccess,
    ip: &str,
    command: &str,
) -> Result<CommandOutput, OrchestratorError> {
    let access = access.clone();
    let ip = ip.to_string();
    let command = command.to_string();

    tokio::task::spawn_blocking(move || exec_blocking(&access, &ip, &command))
        .await
        .map_err(|e| OrchestratorError::Internal(format!("ssh exec task failed: {e}")))?
}

fn tail_blocking(
    access: &SshAccess,
    ip: &str,
    path: &str,
    tx: &mpsc::UnboundedSender<String>,
) -> Result<(), OrchestratorError> {
    let session = connect(access, ip)?;
    // Reads must block for as long as the file stays quiet
    session.set_timeout(0);
    let mut channel = session
        .channel_session()
        .map_err(|e| OrchestratorError::ProgressError(format!("open channel to {ip}: {e}")))?;
    channel
        .exec(&format!("tail -n +1 -F {path} 2>/dev/null"))
        .map_err(|e| OrchestratorError::ProgressError(format!("start tail on {ip}: {e}")))?;

    let reader = BufReader::new(channel);
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading install log from {}: {}", ip, e);
                break;
            }
        }
    }

    Ok(())
}

/// Follow a remote file, forwarding each line over the returned channel.
/// The stream ends when the receiver is dropped or the session dies; it
/// starts from the top of the file and keeps retrying until the file
/// exists.
pub fn spawn_tail(access: &SshAccess, ip: &str, path: &str) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let access = access.clone();
    let ip = ip.to_string();
    let path = path.to_string();

    tokio::task::spawn_blocking(move || {
        info!("Install log tail started for {}", ip);
        if let Err(e) = tail_blocking(&access, &ip, &path, &tx) {
            warn!("Install log tail for {} stopped: {}", ip, e);
        }
        info!("Install log tail ended for {}", ip);
    });

    rx
}
