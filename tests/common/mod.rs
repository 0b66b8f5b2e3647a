// Common test utilities for gkfs-harness integration tests
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use gkfs_harness::config::READINESS_MARKER;
use gkfs_harness::{HarnessConfig, Workspace};
use tempfile::TempDir;

/// Global counter for unique test IDs
static TEST_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber once per test binary. `RUST_LOG` controls
/// verbosity; output goes through the test writer so it is captured.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            )
            .with_target(true)
            .with_test_writer()
            .try_init();
    });
}

/// Unique name for a test artifact, safe across parallel tests.
pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

/// Daemon that logs the readiness marker after `lines_before` noise lines
/// and exits cleanly on SIGTERM.
pub fn ready_daemon_body(lines_before: usize) -> String {
    format!(
        r#"i=0
while [ $i -lt {n} ]; do
    echo "[info] init step $i" >> "$GKFS_DAEMON_LOG_PATH"
    i=$((i + 1))
done
echo "[info] {marker}" >> "$GKFS_DAEMON_LOG_PATH"
trap 'exit 0' TERM
while :; do sleep 0.1; done
"#,
        n = lines_before,
        marker = READINESS_MARKER
    )
}

/// Daemon that writes a log but never becomes ready.
pub const SILENT_DAEMON: &str = r#"echo "[info] loading" >> "$GKFS_DAEMON_LOG_PATH"
trap 'exit 0' TERM
while :; do sleep 0.1; done
"#;

/// Daemon that exits before creating its log.
pub const DYING_DAEMON: &str = "echo 'cannot bind' >&2\nexit 3\n";

/// Daemon that becomes ready and then ignores SIGTERM.
pub fn stubborn_daemon_body() -> String {
    format!(
        r#"trap '' TERM
echo "{marker}" >> "$GKFS_DAEMON_LOG_PATH"
while :; do sleep 0.1; done
"#,
        marker = READINESS_MARKER
    )
}

/// Fake `gkfs.io`: answers a handful of operations in both output encodings
/// and records the environment it saw.
pub const FAKE_GKFS_IO: &str = r#"op="$1"
shift
env > "$(dirname "$LIBGKFS_LOG_OUTPUT")/last-client-env"
case "$op" in
    mkdir)
        if [ "$1" = "/missing/dir" ]; then echo "-1 2"; else echo "0 0"; fi ;;
    open) echo '{"retval": 3, "errnum": 0}' ;;
    read) echo "[104 105] 2 0" ;;
    readv) echo '{"buf_0": [1, 2], "buf_1": null, "retval": 2, "errnum": 0}' ;;
    opendir) echo "null 2" ;;
    readdir) echo "[ {1 0 24 4 .} {7 1 32 8 file_a} ] 0" ;;
    write) echo "$3 0" ;;
    rmdir) echo "boom" >&2; exit 4 ;;
    truncate) echo "not a record" ;;
    *) echo "unknown op $op" >&2; exit 1 ;;
esac
"#;

/// A workspace backed by temp dirs plus a bin dir holding fake programs.
pub struct Fixture {
    pub twd: TempDir,
    pub bin: TempDir,
    pub config: HarnessConfig,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let twd = tempfile::tempdir().expect("twd");
        let bin = tempfile::tempdir().expect("bin dir");

        let mut config = HarnessConfig::default();
        config.bin_dirs = vec![bin.path().to_path_buf()];
        config.lib_dirs = vec![bin.path().to_path_buf()];
        config.startup_timeout_ms = 3_000;
        config.poll_interval_ms = 20;
        config.shutdown_grace_ms = 1_000;
        config.shell_timeout_secs = 10;

        Self { twd, bin, config }
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::from_config(self.twd.path(), &self.config).expect("workspace")
    }

    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        write_script(self.bin.path(), name, body)
    }

    /// Empty stand-in for an interception library.
    pub fn library(&self, name: &str) -> PathBuf {
        let path = self.bin.path().join(name);
        std::fs::write(&path, b"").expect("write library");
        path
    }

    pub fn with_fake_client(self) -> Self {
        self.script("gkfs.io", FAKE_GKFS_IO);
        self
    }
}

/// Poll until `pid` is gone or `timeout` expires.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !gkfs_harness::utils::is_process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
