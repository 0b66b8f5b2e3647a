pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod network;
pub mod readiness;
pub mod reporter;
pub mod shell_parse;
pub mod supervisor;
pub mod utils;
pub mod workspace;

// Re-export core types for convenience
pub use client::{Client, FwdClient, ShellClient, ShellOptions, ShellResult};
pub use config::HarnessConfig;
pub use daemon::{Daemon, DaemonFlavor};
pub use error::{HarnessError, Result};
pub use io_proto::{decode, DecodeError, Decoder, OpResult, Operation};
pub use supervisor::{ProcessSpec, ProcessState, SupervisedProcess, SupervisorOptions};
pub use workspace::{FileCreator, SizeUnit, TestFile, Workspace};
