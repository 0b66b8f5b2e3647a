//! Wrappers that run client programs with the interception library preloaded.

use io_proto::{Decoder, OpResult, Operation};
use nix::sys::signal::Signal;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::config::HarnessConfig;
use crate::daemon::HOSTS_FILE;
use crate::error::{HarnessError, Result};
use crate::shell_parse::{self, ShellOutput};
use crate::utils::{join_search_path, signal_name, signal_process_group};
use crate::workspace::Workspace;

/// The I/O client binary: one filesystem operation per invocation
pub const CLIENT_PROGRAM: &str = "gkfs.io";
pub const CLIENT_LIBRARY: &str = "libgkfs_intercept.so";
pub const FWD_CLIENT_LIBRARY: &str = "libgkfwd_intercept.so";
pub const CLIENT_LOG_FILE: &str = "gkfs_client.log";
pub const FWD_CLIENT_LOG_FILE: &str = "gkfwd_client.log";
pub const FORWARDING_MAP_FILE: &str = "gkfs_forwarding.map";

/// The interception library must exist in exactly one bin dir, so tests never
/// pick up a stale installed copy.
pub fn find_preload_library(workspace: &Workspace, library: &str) -> Result<PathBuf> {
    let mut found = workspace.find_all(library);
    if found.len() != 1 {
        if found.is_empty() {
            error!(target: "client", library, "no client libraries found in the binary directories");
        } else {
            error!(target: "client", library, "multiple client libraries found in the binary directories:");
            for p in &found {
                error!(target: "client", "  {}", p.display());
            }
        }
        return Err(HarnessError::PreloadLibrary {
            library: library.to_string(),
            found,
        });
    }
    Ok(found.remove(0))
}

fn client_env(
    workspace: &Workspace,
    config: &HarnessConfig,
    preload: &Path,
    log_output: &Path,
    forwarding_map: Option<&Path>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        "LD_LIBRARY_PATH".to_string(),
        join_search_path(
            std::env::var("LD_LIBRARY_PATH").ok().as_deref(),
            workspace.lib_dirs(),
        ),
    );
    env.insert("LD_PRELOAD".to_string(), preload.display().to_string());
    env.insert(
        "LIBGKFS_HOSTS_FILE".to_string(),
        workspace.twd().join(HOSTS_FILE).display().to_string(),
    );
    if let Some(map) = forwarding_map {
        env.insert(
            "LIBGKFS_FORWARDING_MAP_FILE".to_string(),
            map.display().to_string(),
        );
    }
    env.insert("LIBGKFS_LOG".to_string(), config.client_log_level.clone());
    env.insert(
        "LIBGKFS_LOG_OUTPUT".to_string(),
        log_output.display().to_string(),
    );
    env
}

fn arg(value: impl Display) -> String {
    value.to_string()
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Runs `gkfs.io` and decodes its output.
#[derive(Debug, Clone)]
pub struct Client {
    program: PathBuf,
    preload: PathBuf,
    env: BTreeMap<String, String>,
    decoder: Decoder,
}

impl Client {
    pub fn new(workspace: &Workspace, config: &HarnessConfig) -> Result<Self> {
        let preload = find_preload_library(workspace, CLIENT_LIBRARY)?;
        let env = client_env(
            workspace,
            config,
            &preload,
            &workspace.log_dir().join(CLIENT_LOG_FILE),
            None,
        );
        Ok(Self {
            program: workspace.find_program(CLIENT_PROGRAM)?,
            preload,
            env,
            decoder: Decoder::new(),
        })
    }

    pub fn preload_library(&self) -> &Path {
        &self.preload
    }

    pub fn patched_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Run an operation by name. Unknown names fail before anything is spawned.
    pub async fn run_named(&self, op: &str, args: &[String]) -> Result<OpResult> {
        let op: Operation = op.parse()?;
        self.run(op, args).await
    }

    /// Run one operation and decode its result.
    pub async fn run(&self, op: Operation, args: &[String]) -> Result<OpResult> {
        debug!(target: "client", cmdline = %format!("{} {} {}", self.program.display(), op, args.join(" ")), "running client");
        debug!(target: "client", env = ?self.env, "patched env");

        let output = Command::new(&self.program)
            .arg(op.as_str())
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| HarnessError::StartupFailed {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(target: "client", %op, "command output: {}", stdout);

        if !output.status.success() {
            return Err(HarnessError::CommandFailed {
                command: format!("{} {}", CLIENT_PROGRAM, op),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(self.decoder.parse(op.as_str(), &stdout)?)
    }

    pub async fn mkdir(&self, path: &Path, mode: u32) -> Result<OpResult> {
        self.run(Operation::Mkdir, &[path_arg(path), arg(mode)]).await
    }

    pub async fn rmdir(&self, path: &Path) -> Result<OpResult> {
        self.run(Operation::Rmdir, &[path_arg(path)]).await
    }

    pub async fn open(&self, path: &Path, flags: i32, mode: u32) -> Result<OpResult> {
        self.run(Operation::Open, &[path_arg(path), arg(flags), arg(mode)])
            .await
    }

    pub async fn opendir(&self, path: &Path) -> Result<OpResult> {
        self.run(Operation::Opendir, &[path_arg(path)]).await
    }

    pub async fn readdir(&self, path: &Path) -> Result<OpResult> {
        self.run(Operation::Readdir, &[path_arg(path)]).await
    }

    pub async fn read(&self, path: &Path, count: usize) -> Result<OpResult> {
        self.run(Operation::Read, &[path_arg(path), arg(count)]).await
    }

    pub async fn pread(&self, path: &Path, count: usize, offset: i64) -> Result<OpResult> {
        self.run(Operation::Pread, &[path_arg(path), arg(count), arg(offset)])
            .await
    }

    pub async fn readv(&self, path: &Path, count_0: usize, count_1: usize) -> Result<OpResult> {
        self.run(
            Operation::Readv,
            &[path_arg(path), arg(count_0), arg(count_1)],
        )
        .await
    }

    pub async fn preadv(
        &self,
        path: &Path,
        count_0: usize,
        count_1: usize,
        offset: i64,
    ) -> Result<OpResult> {
        self.run(
            Operation::Preadv,
            &[path_arg(path), arg(count_0), arg(count_1), arg(offset)],
        )
        .await
    }

    pub async fn write(&self, path: &Path, data: &str, count: usize) -> Result<OpResult> {
        self.run(Operation::Write, &[path_arg(path), arg(data), arg(count)])
            .await
    }

    pub async fn pwrite(&self, path: &Path, data: &str, count: usize, offset: i64) -> Result<OpResult> {
        self.run(
            Operation::Pwrite,
            &[path_arg(path), arg(data), arg(count), arg(offset)],
        )
        .await
    }

    pub async fn writev(&self, path: &Path, data_0: &str, data_1: &str, count: usize) -> Result<OpResult> {
        self.run(
            Operation::Writev,
            &[path_arg(path), arg(data_0), arg(data_1), arg(count)],
        )
        .await
    }

    pub async fn stat(&self, path: &Path) -> Result<OpResult> {
        self.run(Operation::Stat, &[path_arg(path)]).await
    }

    pub async fn statx(&self, dirfd: i32, path: &Path, flags: i32, mask: u32) -> Result<OpResult> {
        self.run(
            Operation::Statx,
            &[arg(dirfd), path_arg(path), arg(flags), arg(mask)],
        )
        .await
    }

    pub async fn lseek(&self, path: &Path, offset: i64, whence: i32) -> Result<OpResult> {
        self.run(Operation::Lseek, &[path_arg(path), arg(offset), arg(whence)])
            .await
    }

    pub async fn truncate(&self, path: &Path, length: i64) -> Result<OpResult> {
        self.run(Operation::Truncate, &[path_arg(path), arg(length)])
            .await
    }

    pub async fn write_random(&self, path: &Path, count: usize) -> Result<OpResult> {
        self.run(Operation::WriteRandom, &[path_arg(path), arg(count)])
            .await
    }

    pub async fn write_validate(&self, path: &Path, count: usize) -> Result<OpResult> {
        self.run(Operation::WriteValidate, &[path_arg(path), arg(count)])
            .await
    }

    pub async fn file_compare(&self, path_1: &Path, path_2: &Path, count: usize) -> Result<OpResult> {
        self.run(
            Operation::FileCompare,
            &[path_arg(path_1), path_arg(path_2), arg(count)],
        )
        .await
    }
}

/// Forwarding map line: `<hostname> <n>` where `n` follows the first '-'
/// of the identifier (`client-3` maps to 3).
fn forwarding_map_line(identifier: &str) -> Result<String> {
    let target: u32 = identifier
        .split('-')
        .nth(1)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| HarnessError::InvalidIdentifier(identifier.to_string()))?;
    let host = nix::unistd::gethostname().map_err(std::io::Error::from)?;
    Ok(format!("{} {}\n", host.to_string_lossy(), target))
}

/// Client for the forwarding build: owns a per-client forwarding map and log.
#[derive(Debug, Clone)]
pub struct FwdClient {
    client: Client,
    identifier: String,
    map_path: PathBuf,
    log_path: PathBuf,
}

impl FwdClient {
    pub fn new(workspace: &Workspace, config: &HarnessConfig, identifier: &str) -> Result<Self> {
        let map_path = workspace
            .twd()
            .join(format!("{}-{}", identifier, FORWARDING_MAP_FILE));
        std::fs::write(&map_path, forwarding_map_line(identifier)?)?;

        let log_path = workspace
            .log_dir()
            .join(format!("{}-{}", identifier, FWD_CLIENT_LOG_FILE));

        let preload = find_preload_library(workspace, FWD_CLIENT_LIBRARY)?;
        let env = client_env(workspace, config, &preload, &log_path, Some(&map_path));

        Ok(Self {
            client: Client {
                program: workspace.find_program(CLIENT_PROGRAM)?,
                preload,
                env,
                decoder: Decoder::new(),
            },
            identifier: identifier.to_string(),
            map_path,
            log_path,
        })
    }

    /// Point this client at the daemon named by `identifier`.
    pub fn remap(&self, identifier: &str) -> Result<()> {
        std::fs::write(&self.map_path, forwarding_map_line(identifier)?)?;
        debug!(target: "client", client = %self.identifier, remap_to = identifier, "forwarding map updated");
        Ok(())
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn map_path(&self) -> &Path {
        &self.map_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl Deref for FwdClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

/// Options for one `bash -c` invocation
#[derive(Debug, Clone, Copy)]
pub struct ShellOptions {
    /// Run the shell itself with the interception library preloaded
    pub intercept_shell: bool,
    pub timeout: Duration,
    /// Sent to the shell when `timeout` expires
    pub timeout_signal: Signal,
}

impl ShellOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            intercept_shell: true,
            timeout: config.shell_timeout(),
            timeout_signal: Signal::SIGKILL,
        }
    }
}

/// Result of a finished shell invocation. Non-zero exits are data, not errors.
#[derive(Debug, Clone)]
pub struct ShellResult {
    /// Command name used to pick an output parser
    pub command: String,
    pub status: ExitStatus,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ShellResult {
    /// Exit code, `None` when the shell was killed by a signal
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn parsed_stdout(&self) -> Result<ShellOutput> {
        shell_parse::parse(&self.command, &self.stdout)
    }

    pub fn parsed_stderr(&self) -> Result<ShellOutput> {
        shell_parse::parse(&self.command, &self.stderr)
    }
}

/// Runs shell commands and scripts through `bash -c`.
#[derive(Debug, Clone)]
pub struct ShellClient {
    preload: PathBuf,
    env: BTreeMap<String, String>,
    defaults: ShellOptions,
}

impl ShellClient {
    pub fn new(workspace: &Workspace, config: &HarnessConfig) -> Result<Self> {
        let preload = find_preload_library(workspace, CLIENT_LIBRARY)?;
        let env = client_env(
            workspace,
            config,
            &preload,
            &workspace.log_dir().join(CLIENT_LOG_FILE),
            None,
        );
        Ok(Self {
            preload,
            env,
            defaults: ShellOptions::from_config(config),
        })
    }

    /// Shell client for the forwarding build. All shells share one
    /// forwarding map that points at daemon 0.
    pub fn forwarding(workspace: &Workspace, config: &HarnessConfig) -> Result<Self> {
        let map_path = workspace.twd().join(FORWARDING_MAP_FILE);
        std::fs::write(&map_path, forwarding_map_line("shell-0")?)?;

        let preload = find_preload_library(workspace, FWD_CLIENT_LIBRARY)?;
        let env = client_env(
            workspace,
            config,
            &preload,
            &workspace.log_dir().join(FWD_CLIENT_LOG_FILE),
            Some(&map_path),
        );
        Ok(Self {
            preload,
            env,
            defaults: ShellOptions::from_config(config),
        })
    }

    pub fn preload_library(&self) -> &Path {
        &self.preload
    }

    pub fn options(&self) -> ShellOptions {
        self.defaults
    }

    /// The patched environment as `K="V"` pairs that can prefix a command line.
    pub fn patched_environ(&self) -> String {
        self.env
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run `code` with `bash -c` using the default options.
    pub async fn script(&self, code: &str) -> Result<ShellResult> {
        self.script_with(code, self.defaults).await
    }

    pub async fn script_with(&self, code: &str, options: ShellOptions) -> Result<ShellResult> {
        self.bash("script", code, options).await
    }

    /// Run `cmd args...` with `bash -c`.
    pub async fn run<A: Display>(&self, cmd: &str, args: &[A]) -> Result<ShellResult> {
        self.run_with(cmd, args, self.defaults).await
    }

    pub async fn run_with<A: Display>(
        &self,
        cmd: &str,
        args: &[A],
        options: ShellOptions,
    ) -> Result<ShellResult> {
        let line = std::iter::once(cmd.to_string())
            .chain(args.iter().map(|a| a.to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        self.bash(cmd, &line, options).await
    }

    async fn bash(&self, command: &str, code: &str, options: ShellOptions) -> Result<ShellResult> {
        debug!(target: "client", "cmd: bash -c '{}'", code);
        debug!(
            target: "client",
            timeout_secs = options.timeout.as_secs_f64(),
            timeout_signal = signal_name(options.timeout_signal),
            intercept = options.intercept_shell,
            "running bash"
        );

        let mut cmd = Command::new("bash");
        // Own process group: the timeout signal must also reach whatever the
        // script forked, or the pipes stay open after bash is gone
        cmd.arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if options.intercept_shell {
            cmd.envs(&self.env);
        }

        let mut child = cmd.spawn().map_err(|source| HarnessError::StartupFailed {
            program: "bash".to_string(),
            source,
        })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(err) = stderr.as_mut() {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let (status, timed_out) = match tokio::time::timeout(options.timeout, child.wait()).await {
            Ok(status) => (status?, false),
            Err(_) => {
                warn!(
                    target: "client",
                    signal = signal_name(options.timeout_signal),
                    "bash timed out after {:?}",
                    options.timeout
                );
                if let Some(pgid) = child.id() {
                    signal_process_group(pgid, options.timeout_signal)
                        .map_err(std::io::Error::from)?;
                }
                (child.wait().await?, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ShellResult {
            command: command.to_string(),
            status,
            timed_out,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}
