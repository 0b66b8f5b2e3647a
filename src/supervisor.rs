use nix::sys::signal::Signal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::readiness::{LogMarker, Readiness, ReadinessGate};
use crate::utils::{signal_process, SignalOutcome};

/// Everything needed to launch a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables merged over the inherited environment
    pub env: BTreeMap<String, String>,
    /// Log file polled for the readiness marker
    pub log_path: PathBuf,
}

impl ProcessSpec {
    pub fn cmdline(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Readiness and shutdown tuning
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub readiness_marker: String,
    pub poll_interval: Duration,
    pub max_lines: usize,
    pub startup_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for SupervisorOptions {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            readiness_marker: config.readiness_marker.clone(),
            poll_interval: config.poll_interval(),
            max_lines: config.max_log_lines,
            startup_timeout: config.startup_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Lifecycle of a supervised process.
///
/// `Created -> Starting -> Active -> Terminated`, or
/// `Starting -> Failed -> Terminated`. Nothing leaves `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Created,
    Starting,
    Active,
    Failed,
    Terminated,
}

/// A background process that is only handed to callers once it has written
/// its readiness marker.
///
/// Callers must call [`shutdown`](Self::shutdown) on every exit path. `Drop`
/// only sends SIGKILL to a child that is still running.
#[derive(Debug)]
pub struct SupervisedProcess {
    name: String,
    spec: ProcessSpec,
    options: SupervisorOptions,
    state: ProcessState,
    child: Option<Child>,
    pid: Option<u32>,
}

impl SupervisedProcess {
    pub fn new(name: impl Into<String>, spec: ProcessSpec, options: SupervisorOptions) -> Self {
        Self {
            name: name.into(),
            spec,
            options,
            state: ProcessState::Created,
            child: None,
            pid: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// PID of the spawned process (kept after it exits, for diagnostics)
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.spec.log_path
    }

    /// Spawn the process and wait until its log contains the readiness marker.
    pub async fn run(&mut self) -> Result<()> {
        if self.state != ProcessState::Created {
            return Err(HarnessError::InvalidState {
                action: "run",
                state: self.state,
            });
        }
        self.state = ProcessState::Starting;

        debug!(target: "supervisor", process = %self.name, cmdline = %self.spec.cmdline(), "spawning");
        debug!(target: "supervisor", process = %self.name, env = ?self.spec.env, "patched env");

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state = ProcessState::Failed;
                error!(target: "supervisor", process = %self.name, error = %source, "spawn failed");
                return Err(HarnessError::StartupFailed {
                    program: self.spec.program.display().to_string(),
                    source,
                });
            }
        };
        self.pid = child.id();
        stream_output(&self.name, &mut child);
        // Owned by self before polling so a cancelled run() still leaves
        // the child reachable from shutdown() and Drop
        self.child = Some(child);
        info!(target: "supervisor", process = %self.name, pid = ?self.pid, "process spawned, waiting for readiness");

        let gate = ReadinessGate::new(
            LogMarker::new(
                &self.spec.log_path,
                &self.options.readiness_marker,
                self.options.max_lines,
            ),
            self.options.poll_interval,
            self.options.startup_timeout,
        );

        let child = &mut self.child;
        let outcome = gate
            .wait(|| match child.as_mut().map(Child::try_wait) {
                Some(Ok(Some(status))) => Some(status.to_string()),
                Some(Ok(None)) => None,
                Some(Err(e)) => Some(format!("unknown ({})", e)),
                None => Some("unknown (child handle released)".to_string()),
            })
            .await;

        let pid = self.pid.unwrap_or_default();
        match outcome {
            Ok(Readiness::Ready { line, elapsed }) => {
                self.state = ProcessState::Active;
                info!(target: "supervisor", process = %self.name, pid, line, elapsed_ms = elapsed.as_millis() as u64, "process is ready");
                Ok(())
            }
            Ok(Readiness::Exited { status }) => {
                self.state = ProcessState::Failed;
                self.child = None;
                error!(target: "supervisor", process = %self.name, pid, %status, "process died before creating its log");
                Err(HarnessError::ProcessDied { pid, status })
            }
            Ok(Readiness::TimedOut) => {
                self.state = ProcessState::Failed;
                error!(target: "supervisor", process = %self.name, pid, "initialization timeout exceeded");
                let err = HarnessError::StartupTimeout {
                    marker: self.options.readiness_marker.clone(),
                    log_path: self.spec.log_path.clone(),
                    timeout: self.options.startup_timeout,
                };
                Err(self.fail_startup(err).await)
            }
            Err(e) => {
                self.state = ProcessState::Failed;
                error!(target: "supervisor", process = %self.name, pid, error = %e, "cannot read log file");
                Err(self.fail_startup(HarnessError::Io(e)).await)
            }
        }
    }

    /// Terminate the process: SIGTERM, then SIGKILL once the grace period
    /// expires. Safe to call repeatedly and after a failed `run()`.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.state {
            ProcessState::Terminated => return Ok(()),
            ProcessState::Created => {}
            // Starting: a run() that was cancelled while waiting for readiness
            ProcessState::Starting | ProcessState::Active | ProcessState::Failed => {
                debug!(target: "supervisor", process = %self.name, "terminating");
                self.stop().await?;
            }
        }
        self.state = ProcessState::Terminated;
        Ok(())
    }

    /// Stop the child after a failed startup and hand back the startup error.
    async fn fail_startup(&mut self, err: HarnessError) -> HarnessError {
        let cleanup = self.stop().await;
        keep_startup_error(&self.name, err, cleanup)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(()),
        };

        // id() is None once tokio has reaped the child
        if let Some(pid) = child.id() {
            match terminate(pid) {
                Ok(()) => {}
                Err(race @ HarnessError::ShutdownRace { .. }) => {
                    debug!(target: "supervisor", process = %self.name, "{}", race)
                }
                Err(e) => return Err(e),
            }
        }

        match tokio::time::timeout(self.options.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(target: "supervisor", process = %self.name, %status, "process exited");
                Ok(())
            }
            Ok(Err(e)) if e.raw_os_error() == Some(libc::ECHILD) => {
                debug!(target: "supervisor", process = %self.name, "process already reaped");
                Ok(())
            }
            Ok(Err(e)) => Err(HarnessError::Io(e)),
            Err(_) => {
                warn!(
                    target: "supervisor",
                    process = %self.name,
                    grace_ms = self.options.shutdown_grace.as_millis() as u64,
                    "process ignored SIGTERM, sending SIGKILL"
                );
                child.kill().await?;
                Ok(())
            }
        }
    }
}

/// A cleanup failure is logged; the startup error is what the caller sees.
fn keep_startup_error(name: &str, err: HarnessError, cleanup: Result<()>) -> HarnessError {
    if let Err(e) = cleanup {
        warn!(target: "supervisor", process = %name, error = %e, "cleanup after failed startup failed");
    }
    err
}

fn terminate(pid: u32) -> Result<()> {
    match signal_process(pid, Signal::SIGTERM) {
        Ok(SignalOutcome::Delivered) => Ok(()),
        Ok(SignalOutcome::AlreadyGone) => Err(HarnessError::ShutdownRace { pid }),
        Err(errno) => Err(HarnessError::Io(errno.into())),
    }
}

/// Forward child stdout/stderr to tracing, line by line.
fn stream_output(name: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "supervisor::output", process = %name, "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "supervisor::output", process = %name, "{}", line);
            }
        });
    }
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Ok(None) = child.try_wait() {
                warn!(target: "supervisor", process = %self.name, pid = ?self.pid, "dropped while running, killing");
                let _ = child.start_kill();
            }
        }
    }
}
