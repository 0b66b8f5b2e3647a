//! Process helpers shared by the supervisor and the shell client.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;

/// Check if a process is alive by reading /proc/{pid}/stat.
///
/// Works for any user, unlike sending signal 0. Zombies count as dead: an
/// unreaped child that already exited is not a running daemon.
pub fn is_process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // comm may contain spaces and parens; the state follows the last ')'
        Ok(stat) => !matches!(
            stat.rsplit(')').next().and_then(|rest| rest.trim_start().chars().next()),
            Some('Z') | Some('X') | None
        ),
        Err(_) => false,
    }
}

/// Outcome of delivering a signal to a process that may already be gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// ESRCH: the process exited (or was reaped) before the signal landed
    AlreadyGone,
}

/// Send `signal` to `pid`, treating ESRCH as a successful no-op.
pub fn signal_process(pid: u32, signal: Signal) -> nix::Result<SignalOutcome> {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(SignalOutcome::Delivered),
        Err(Errno::ESRCH) => Ok(SignalOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}

/// Send `signal` to every process in group `pgid`, treating ESRCH as a
/// successful no-op.
pub fn signal_process_group(pgid: u32, signal: Signal) -> nix::Result<SignalOutcome> {
    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) => Ok(SignalOutcome::Delivered),
        Err(Errno::ESRCH) => Ok(SignalOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}

/// Human-readable signal name for logs (`SIGKILL`, `SIGTERM`, ...).
pub fn signal_name(signal: Signal) -> &'static str {
    signal.as_str()
}

/// Join a base search path with extra directories using ':' and skipping empties.
pub fn join_search_path(base: Option<&str>, extra: &[impl AsRef<Path>]) -> String {
    base.into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .chain(extra.iter().map(|p| p.as_ref().display().to_string()))
        .collect::<Vec<_>>()
        .join(":")
}
