use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an optional harness config file
pub const CONFIG_ENV: &str = "GKFS_HARNESS_CONFIG";

/// Literal line the daemon writes to its log once it accepts requests
pub const READINESS_MARKER: &str = "Startup successful. Daemon is ready.";

/// Harness configuration.
///
/// Built once (defaults, then TOML file, then CLI overrides) and handed to
/// every component at construction. Nothing reads it from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Network interface whose IPv4 address daemons listen on
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Directories searched for the daemon, client and interception library.
    /// Empty means the current directory.
    #[serde(default)]
    pub bin_dirs: Vec<PathBuf>,

    /// Directories appended to LD_LIBRARY_PATH. Empty means the current directory.
    #[serde(default)]
    pub lib_dirs: Vec<PathBuf>,

    #[serde(default = "default_readiness_marker")]
    pub readiness_marker: String,

    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Only the first N lines of the daemon log are scanned for the marker
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    /// Time between SIGTERM and SIGKILL on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,

    /// GKFS_LOG_LEVEL for daemons
    #[serde(default = "default_daemon_log_level")]
    pub daemon_log_level: String,

    /// LIBGKFS_LOG for clients
    #[serde(default = "default_client_log_level")]
    pub client_log_level: String,
}

fn default_interface() -> String {
    "lo".to_string()
}

fn default_readiness_marker() -> String {
    READINESS_MARKER.to_string()
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_log_lines() -> usize {
    50
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_shell_timeout_secs() -> u64 {
    60
}

fn default_daemon_log_level() -> String {
    "100".to_string()
}

fn default_client_log_level() -> String {
    "all".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            bin_dirs: Vec::new(),
            lib_dirs: Vec::new(),
            readiness_marker: default_readiness_marker(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_log_lines: default_max_log_lines(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            shell_timeout_secs: default_shell_timeout_secs(),
            daemon_log_level: default_daemon_log_level(),
            client_log_level: default_client_log_level(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from `explicit_path`, or from `$GKFS_HARNESS_CONFIG`
    /// when set, or fall back to defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading harness config {}", path.display()))?;
        let config: HarnessConfig = toml::from_str(&content)
            .with_context(|| format!("parsing harness config {}", path.display()))?;
        debug!(target: "config", path = %path.display(), "loaded harness config");
        Ok(config)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    /// Binary search path, defaulting to the current directory
    pub fn resolved_bin_dirs(&self) -> Vec<PathBuf> {
        or_cwd(&self.bin_dirs)
    }

    /// Library search path, defaulting to the current directory
    pub fn resolved_lib_dirs(&self) -> Vec<PathBuf> {
        or_cwd(&self.lib_dirs)
    }
}

fn or_cwd(dirs: &[PathBuf]) -> Vec<PathBuf> {
    if dirs.is_empty() {
        vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))]
    } else {
        dirs.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_daemon_contract() {
        let config = HarnessConfig::default();
        assert_eq!(config.interface, "lo");
        assert_eq!(config.readiness_marker, "Startup successful. Daemon is ready.");
        assert_eq!(config.startup_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.max_log_lines, 50);
        assert_eq!(config.shell_timeout(), Duration::from_secs(60));
        assert_eq!(config.daemon_log_level, "100");
        assert_eq!(config.client_log_level, "all");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: HarnessConfig = toml::from_str("").unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: HarnessConfig = toml::from_str(
            r#"
            interface = "eth0"
            bin_dirs = ["/opt/gkfs/bin", "/usr/local/bin"]
            startup_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.bin_dirs.len(), 2);
        assert_eq!(config.startup_timeout(), Duration::from_millis(2500));
        assert_eq!(config.max_log_lines, 50);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_log_lines = 5").unwrap();
        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_log_lines, 5);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_log_lines = \"many\"").unwrap();
        let err = HarnessConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing harness config"));
    }

    #[test]
    fn test_resolved_dirs_default_to_cwd() {
        let config = HarnessConfig::default();
        assert_eq!(
            config.resolved_bin_dirs(),
            vec![std::env::current_dir().unwrap()]
        );
    }
}
