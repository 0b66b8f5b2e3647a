//! Per-test log file kept next to the daemon and client logs.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::workspace::Workspace;

/// Test log that writes a detailed plain-text transcript to a file while
/// the console only sees the tracing output.
///
/// Usage:
/// ```ignore
/// let log = TestLog::create(&workspace, "test_mkdir")?;
/// log.info("creating directory");
/// log.finish(true);
/// ```
#[derive(Clone)]
pub struct TestLog {
    test_name: String,
    log_path: PathBuf,
    file: Arc<Mutex<File>>,
    start_time: Instant,
}

impl TestLog {
    /// Create `<workspace>/logs/<test_name>.log`.
    pub fn create(workspace: &Workspace, test_name: &str) -> io::Result<Self> {
        Self::at(workspace.log_dir().join(format!("{}.log", test_name)), test_name)
    }

    pub fn at(log_path: PathBuf, test_name: &str) -> io::Result<Self> {
        let file = File::create(&log_path)?;
        let log = Self {
            test_name: test_name.to_string(),
            log_path,
            file: Arc::new(Mutex::new(file)),
            start_time: Instant::now(),
        };

        log.log_raw(&format!(
            "=== Test: {} ===\nStarted: {}\n",
            test_name,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        Ok(log)
    }

    /// Log a raw message (no prefix)
    pub fn log_raw(&self, msg: &str) {
        if let Ok(mut file) = self.file.lock() {
            writeln!(file, "{}", msg).ok();
        }
    }

    fn log_level(&self, level: &str, msg: &str) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        self.log_raw(&format!("[{:>8.3}s] {:<5} {}", elapsed, level, msg));
    }

    pub fn info(&self, msg: &str) {
        self.log_level("INFO", msg);
    }

    pub fn debug(&self, msg: &str) {
        self.log_level("DEBUG", msg);
    }

    pub fn warn(&self, msg: &str) {
        self.log_level("WARN", msg);
    }

    pub fn error(&self, msg: &str) {
        self.log_level("ERROR", msg);
    }

    pub fn section(&self, name: &str) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        self.log_raw(&format!("\n[{:>8.3}s] === {} ===", elapsed, name));
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Write the closing line. Call at the end of the test.
    pub fn finish(&self, success: bool) {
        let status = if success { "PASSED" } else { "FAILED" };
        self.log_raw(&format!(
            "\n=== Test {} in {:.2}s ===",
            status,
            self.start_time.elapsed().as_secs_f64()
        ));
    }
}
