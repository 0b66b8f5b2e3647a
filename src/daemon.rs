use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::network::{ephemeral_address, Endpoint};
use crate::supervisor::{ProcessSpec, ProcessState, SupervisedProcess, SupervisorOptions};
use crate::utils::join_search_path;
use crate::workspace::Workspace;

/// Hosts file shared by daemons and clients, relative to the workspace root
pub const HOSTS_FILE: &str = "gkfs_hosts.txt";

/// Daemon build to launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonFlavor {
    /// `gkfs_daemon`
    Standard,
    /// `gkfwd_daemon`, used with I/O forwarding clients
    Forwarding,
}

impl DaemonFlavor {
    pub fn program(self) -> &'static str {
        match self {
            DaemonFlavor::Standard => "gkfs_daemon",
            DaemonFlavor::Forwarding => "gkfwd_daemon",
        }
    }

    pub fn log_file(self) -> &'static str {
        match self {
            DaemonFlavor::Standard => "gkfs_daemon.log",
            DaemonFlavor::Forwarding => "gkfwd_daemon.log",
        }
    }
}

/// A filesystem daemon supervised inside a workspace.
#[derive(Debug)]
pub struct Daemon {
    flavor: DaemonFlavor,
    endpoint: Endpoint,
    hosts_file: PathBuf,
    process: SupervisedProcess,
}

impl Daemon {
    /// Prepare a daemon listening on an ephemeral endpoint of
    /// `config.interface`. Nothing is spawned until [`run`](Self::run).
    pub fn new(flavor: DaemonFlavor, workspace: &Workspace, config: &HarnessConfig) -> Result<Self> {
        let program = workspace.find_program(flavor.program())?;
        let endpoint = ephemeral_address(&config.interface)?;
        let spec = daemon_spec(flavor, program, workspace, config, &endpoint);

        Ok(Self {
            flavor,
            hosts_file: workspace.twd().join(HOSTS_FILE),
            process: SupervisedProcess::new(
                flavor.program(),
                spec,
                SupervisorOptions::from(config),
            ),
            endpoint,
        })
    }

    /// Create a daemon and wait until it is ready.
    pub async fn start(
        flavor: DaemonFlavor,
        workspace: &Workspace,
        config: &HarnessConfig,
    ) -> Result<Self> {
        let mut daemon = Self::new(flavor, workspace, config)?;
        daemon.run().await?;
        Ok(daemon)
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(target: "daemon", flavor = ?self.flavor, endpoint = %self.endpoint, "starting daemon");
        self.process.run().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.process.shutdown().await
    }

    pub fn flavor(&self) -> DaemonFlavor {
        self.flavor
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn hosts_file(&self) -> &Path {
        &self.hosts_file
    }

    pub fn log_path(&self) -> &Path {
        self.process.log_path()
    }

    pub fn state(&self) -> ProcessState {
        self.process.state()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn spec(&self) -> &ProcessSpec {
        self.process.spec()
    }
}

/// Command line and patched environment for a daemon.
pub fn daemon_spec(
    flavor: DaemonFlavor,
    program: PathBuf,
    workspace: &Workspace,
    config: &HarnessConfig,
    endpoint: &Endpoint,
) -> ProcessSpec {
    let log_path = workspace.log_dir().join(flavor.log_file());

    let mut env = BTreeMap::new();
    env.insert(
        "LD_LIBRARY_PATH".to_string(),
        join_search_path(
            std::env::var("LD_LIBRARY_PATH").ok().as_deref(),
            workspace.lib_dirs(),
        ),
    );
    env.insert(
        "GKFS_HOSTS_FILE".to_string(),
        workspace.twd().join(HOSTS_FILE).display().to_string(),
    );
    env.insert(
        "GKFS_DAEMON_LOG_PATH".to_string(),
        log_path.display().to_string(),
    );
    env.insert(
        "GKFS_LOG_LEVEL".to_string(),
        config.daemon_log_level.clone(),
    );

    let args = vec![
        "--mountdir".to_string(),
        workspace.mount_dir().display().to_string(),
        "--metadir".to_string(),
        workspace.meta_dir().display().to_string(),
        "--rootdir".to_string(),
        workspace.root_dir().display().to_string(),
        "-l".to_string(),
        endpoint.to_string(),
    ];

    ProcessSpec {
        program,
        args,
        env,
        log_path,
    }
}
