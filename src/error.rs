use std::io;
use std::path::PathBuf;
use std::time::Duration;

use io_proto::DecodeError;

use crate::supervisor::ProcessState;

/// Harness error types.
///
/// Decode and startup errors are hard failures. The only absorbed class is a
/// shutdown race (the process was already gone), which never leaves
/// `SupervisedProcess::shutdown`.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("process {pid} is not running ({status})")]
    ProcessDied { pid: u32, status: String },

    #[error("initialization timeout exceeded: no '{marker}' in {} after {timeout:?}", .log_path.display())]
    StartupTimeout {
        marker: String,
        log_path: PathBuf,
        timeout: Duration,
    },

    #[error("failed to start {program}: {source}")]
    StartupFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("signal raced with process {pid} exit")]
    ShutdownRace { pid: u32 },

    #[error("cannot create workspace directory {}: {source}", .path.display())]
    WorkspaceCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("expected exactly one {library} in the binary directories, found {}", .found.len())]
    PreloadLibrary {
        library: String,
        found: Vec<PathBuf>,
    },

    #[error("executable '{program}' not found in {searched:?}")]
    ExecutableNotFound {
        program: String,
        searched: Vec<PathBuf>,
    },

    #[error("'{command}' failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("invalid client identifier '{0}': expected '<name>-<number>'")]
    InvalidIdentifier(String),

    #[error("cannot parse '{command}' output: {reason}")]
    MalformedShellOutput { command: String, reason: String },

    #[error("output parser for '{0}' not implemented")]
    UnsupportedCommand(String),

    #[error("cannot {action} a process in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: ProcessState,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
