use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::HarnessConfig;

#[derive(Parser, Debug)]
#[command(name = "gkfs-harness", version, about = "Integration test harness for the GekkoFS daemon and I/O client")]
pub struct Cli {
    /// Harness config file (TOML). Defaults to $GKFS_HARNESS_CONFIG
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Network interface used for communications
    #[arg(long, global = true)]
    pub interface: Option<String>,

    /// Directory searched for programs and the interception library (repeatable)
    #[arg(long = "bin-dir", global = true)]
    pub bin_dirs: Vec<PathBuf>,

    /// Directory added to LD_LIBRARY_PATH (repeatable)
    #[arg(long = "lib-dir", global = true)]
    pub lib_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply(&self, mut config: HarnessConfig) -> HarnessConfig {
        if let Some(iface) = &self.interface {
            config.interface = iface.clone();
        }
        if !self.bin_dirs.is_empty() {
            config.bin_dirs = self.bin_dirs.clone();
        }
        if !self.lib_dirs.is_empty() {
            config.lib_dirs = self.lib_dirs.clone();
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a daemon in a workspace and keep it running until interrupted
    Daemon(DaemonArgs),
    /// Run one client operation and print the decoded result as JSON
    Io(IoArgs),
    /// Decode client output read from stdin (or a file)
    Decode(DecodeArgs),
    /// Print an ephemeral listen endpoint
    Endpoint(EndpointArgs),
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Test working directory (must exist)
    #[arg(long)]
    pub workdir: PathBuf,

    /// Launch the forwarding daemon build
    #[arg(long)]
    pub forwarding: bool,
}

#[derive(Args, Debug)]
pub struct IoArgs {
    /// Test working directory of a running daemon
    #[arg(long)]
    pub workdir: PathBuf,

    /// Run as a forwarding client with this identifier (e.g. client-0)
    #[arg(long)]
    pub forwarding_id: Option<String>,

    /// Operation name (mkdir, open, read, stat, ...)
    pub op: String,

    /// Operation arguments, passed through unchanged
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Operation the output belongs to
    pub op: String,

    /// Read output from this file instead of stdin
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Print a random loopback host and free port instead of an interface address
    #[arg(long)]
    pub loopback: bool,
}
