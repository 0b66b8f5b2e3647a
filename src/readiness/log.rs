use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Result of one scan of a daemon log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    /// Log file not created yet
    Missing,
    /// Log exists but the marker is not within the scanned lines
    Pending,
    /// Marker found on this (1-based) line
    Ready { line: usize },
}

/// Scans the head of a log file for a literal marker.
#[derive(Debug, Clone)]
pub struct LogMarker {
    path: PathBuf,
    marker: String,
    max_lines: usize,
}

impl LogMarker {
    pub fn new(path: impl Into<PathBuf>, marker: impl Into<String>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            marker: marker.into(),
            max_lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Scan at most `max_lines` lines. A line is matched as a substring, and
    /// lines are decoded lossily so binary noise in the log is harmless.
    pub async fn check(&self) -> io::Result<LogStatus> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LogStatus::Missing),
            Err(e) => return Err(e),
        };

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        for line in 1..=self.max_lines {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if String::from_utf8_lossy(&buf).contains(&self.marker) {
                return Ok(LogStatus::Ready { line });
            }
        }
        Ok(LogStatus::Pending)
    }
}
