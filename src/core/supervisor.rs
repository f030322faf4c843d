//! Lifecycle of the local development node.
//!
//! The supervisor owns at most one node process. It is shared between the
//! shell thread and the shutdown handler, so the process lives in a
//! mutex-guarded slot and `stop()` takes it out exactly once.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::credentials::{CredentialStore, Credentials, UNKNOWN_ADDRESS};
use crate::core::errors::NodeError;
use crate::core::scanner;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// A running node and the credentials captured from it.
pub struct NodeInstance {
    child: Child,
    /// File receiving the node's merged stdout and stderr.
    pub log: PathBuf,
    pub port: u16,
    pub credentials: Credentials,
}

struct Slot {
    state: NodeState,
    instance: Option<NodeInstance>,
}

pub struct NodeSupervisor {
    config: Config,
    slot: Mutex<Slot>,
}

pub fn rpc_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

impl NodeSupervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slot: Mutex::new(Slot {
                state: NodeState::NotStarted,
                instance: None,
            }),
        }
    }

    pub fn binary(&self) -> &str {
        &self.config.node_binary
    }

    pub fn state(&self) -> NodeState {
        self.lock().state
    }

    /// Where the running node's output goes.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.lock().instance.as_ref().map(|i| i.log.clone())
    }

    #[cfg(test)]
    pub fn credentials(&self) -> Option<Credentials> {
        self.lock().instance.as_ref().map(|i| i.credentials.clone())
    }

    /// Launch the node on `port` and capture its first account.
    ///
    /// On success the credentials are also published into `store`. Any error
    /// leaves no process behind.
    pub fn start(&self, port: u16, store: &mut CredentialStore) -> Result<Credentials, NodeError> {
        let mut slot = self.lock();
        if let Some(instance) = &slot.instance {
            return Err(NodeError::AlreadyRunning {
                rpc_url: instance.credentials.rpc_url.clone(),
            });
        }
        slot.state = NodeState::Starting;

        let result = self.launch(port);
        match result {
            Ok(instance) => {
                let credentials = instance.credentials.clone();
                store.publish(&credentials);
                info!(
                    port,
                    address = %credentials.address,
                    pid = instance.child.id(),
                    "node running"
                );
                slot.instance = Some(instance);
                slot.state = NodeState::Running;
                Ok(credentials)
            }
            Err(e) => {
                slot.state = NodeState::Stopped;
                Err(e)
            }
        }
    }

    fn launch(&self, port: u16) -> Result<NodeInstance, NodeError> {
        let binary = self.config.node_binary.clone();
        self.probe_version()?;

        let log = self.config.node_log(port);
        let log_error = |source: io::Error| NodeError::Log {
            path: log.clone(),
            source,
        };
        if let Some(dir) = log.parent() {
            fs::create_dir_all(dir).map_err(log_error)?;
        }
        let output = File::create(&log).map_err(log_error)?;
        let mut reader = BufReader::new(File::open(&log).map_err(log_error)?);

        let mut command = Command::new(&binary);
        command
            .args(&self.config.node_args)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(output.try_clone().map_err(log_error)?)
            .stderr(output);

        // Own process group: a terminal Ctrl+C reaches us, not the node.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| NodeError::Spawn {
            binary: binary.clone(),
            source,
        })?;

        let launched = Instant::now();
        debug!(pid = child.id(), port, log = %log.display(), "node spawned, scanning output");

        let outcome = scanner::scan(&mut reader, launched + self.config.capture_timeout(), || {
            matches!(child.try_wait(), Ok(None))
        });

        let Some(private_key) = outcome.private_key else {
            warn!(lines = outcome.lines_read, "no private key in node output, terminating");
            if let Err(e) = terminate(&mut child, self.config.stop_timeout()) {
                warn!(error = %e, "failed to terminate node after capture failure");
            }
            return Err(NodeError::CaptureTimeout {
                binary,
                waited: launched.elapsed(),
                lines: outcome.lines_read,
            });
        };

        if !outcome.ready {
            debug!("ready marker not seen before capture ended");
        }

        let address = outcome.address.unwrap_or_else(|| {
            warn!("no address in node output");
            UNKNOWN_ADDRESS.to_string()
        });

        Ok(NodeInstance {
            child,
            log,
            port,
            credentials: Credentials {
                private_key,
                address,
                rpc_url: rpc_url(port),
            },
        })
    }

    fn probe_version(&self) -> Result<(), NodeError> {
        let binary = &self.config.node_binary;
        let status = Command::new(binary)
            .args(&self.config.node_args)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) => {
                debug!(binary = %binary, %status, "version probe finished");
                Ok(())
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => Err(NodeError::BinaryNotFound {
                binary: binary.clone(),
                source,
            }),
            Err(source) => Err(NodeError::Spawn {
                binary: binary.clone(),
                source,
            }),
        }
    }

    /// Stop the node if one is running.
    ///
    /// Returns `true` only for the call that actually stopped it; later calls,
    /// including one racing in from the shutdown handler, are no-ops.
    pub fn stop(&self) -> bool {
        let mut instance = {
            let mut slot = self.lock();
            match slot.instance.take() {
                Some(instance) => {
                    slot.state = NodeState::Stopping;
                    instance
                }
                None => return false,
            }
        };

        match terminate(&mut instance.child, self.config.stop_timeout()) {
            Ok(status) => info!(%status, port = instance.port, "node stopped"),
            Err(e) => warn!(error = %e, port = instance.port, "error while stopping node"),
        }

        self.lock().state = NodeState::Stopped;
        true
    }

    /// Non-blocking liveness check.
    pub fn is_running(&self) -> bool {
        match self.lock().instance.as_mut() {
            Some(instance) => matches!(instance.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Block until the node exits on its own or is stopped elsewhere.
    pub fn wait(&self) {
        while self.is_running() {
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NodeSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ask the process to exit, escalating to a kill after `timeout`.
fn terminate(child: &mut Child, timeout: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    request_exit(child);

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }

    warn!(pid = child.id(), ?timeout, "node ignored termination request, killing");
    if let Err(e) = child.kill() {
        // Exited between the last poll and the kill.
        debug!(error = %e, "kill failed");
    }
    child.wait()
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    if let Err(e) = kill(pid, Signal::SIGTERM) {
        debug!(error = %e, pid = child.id(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, pid = child.id(), "terminate failed");
    }
}
