pub mod log;

pub use log::{LogMarker, LogStatus};

use std::io;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

/// How a readiness wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready { line: usize, elapsed: Duration },
    /// The log never appeared and the process is gone
    Exited { status: String },
    TimedOut,
}

/// Polls a log marker at a fixed cadence until it shows up, the process
/// exits without ever creating its log, or the wall-clock timeout expires.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    pub probe: LogMarker,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl ReadinessGate {
    pub fn new(probe: LogMarker, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            probe,
            poll_interval,
            timeout,
        }
    }

    /// Wait for readiness. `exited` is consulted only while the log is
    /// missing and returns the exit status once the process is gone.
    pub async fn wait<F>(&self, mut exited: F) -> io::Result<Readiness>
    where
        F: FnMut() -> Option<String>,
    {
        let start = Instant::now();
        loop {
            debug!(target: "readiness", path = %self.probe.path().display(), "checking log file");
            match self.probe.check().await? {
                LogStatus::Ready { line } => {
                    return Ok(Readiness::Ready {
                        line,
                        elapsed: start.elapsed(),
                    })
                }
                LogStatus::Missing => {
                    if let Some(status) = exited() {
                        return Ok(Readiness::Exited { status });
                    }
                    debug!(target: "readiness", "log file missing but process alive, retrying");
                }
                LogStatus::Pending => {}
            }

            if start.elapsed() >= self.timeout {
                return Ok(Readiness::TimedOut);
            }
            sleep(self.poll_interval).await;
        }
    }
}
