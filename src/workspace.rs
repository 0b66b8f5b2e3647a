//! Per-test workspace and input file fixtures.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Exit status used when a workspace cannot be created
pub const WORKSPACE_ABORT_STATUS: i32 = 2;

const BLOCK_SIZE: usize = 64 * 1024;

/// Self-contained directory tree for one test.
///
/// ```text
/// <twd>/
/// ├── logs/
/// ├── meta/
/// ├── mnt/
/// ├── root/
/// └── tmp/
/// ```
///
/// The directories are never removed here; the owner of `twd` cleans up.
#[derive(Debug, Clone)]
pub struct Workspace {
    twd: PathBuf,
    bin_dirs: Vec<PathBuf>,
    lib_dirs: Vec<PathBuf>,
    log_dir: PathBuf,
    root_dir: PathBuf,
    meta_dir: PathBuf,
    mount_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl Workspace {
    /// Create the workspace, aborting the whole process on failure.
    ///
    /// A broken workspace invalidates every test that would run in it.
    pub fn new(twd: impl Into<PathBuf>, bin_dirs: Vec<PathBuf>, lib_dirs: Vec<PathBuf>) -> Self {
        match Self::try_create(twd, bin_dirs, lib_dirs) {
            Ok(ws) => ws,
            Err(e) => {
                error!(target: "workspace", "{}", e);
                error!(target: "workspace", "aborted due to initialization error");
                std::process::exit(WORKSPACE_ABORT_STATUS);
            }
        }
    }

    /// Create the workspace and report failure to the caller.
    pub fn try_create(
        twd: impl Into<PathBuf>,
        bin_dirs: Vec<PathBuf>,
        lib_dirs: Vec<PathBuf>,
    ) -> Result<Self> {
        let twd = twd.into();
        if !twd.is_dir() {
            return Err(HarnessError::WorkspaceCreationFailed {
                source: io::Error::new(io::ErrorKind::NotFound, "test working directory missing"),
                path: twd,
            });
        }

        let ws = Self {
            log_dir: twd.join("logs"),
            root_dir: twd.join("root"),
            meta_dir: twd.join("meta"),
            mount_dir: twd.join("mnt"),
            tmp_dir: twd.join("tmp"),
            twd,
            bin_dirs,
            lib_dirs,
        };

        for dir in [
            &ws.log_dir,
            &ws.root_dir,
            &ws.meta_dir,
            &ws.mount_dir,
            &ws.tmp_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|source| HarnessError::WorkspaceCreationFailed {
                path: dir.clone(),
                source,
            })?;
        }

        debug!(target: "workspace", twd = %ws.twd.display(), "workspace created");
        Ok(ws)
    }

    /// Create a workspace using the search paths from `config`.
    pub fn from_config(twd: impl Into<PathBuf>, config: &HarnessConfig) -> Result<Self> {
        Self::try_create(twd, config.resolved_bin_dirs(), config.resolved_lib_dirs())
    }

    pub fn twd(&self) -> &Path {
        &self.twd
    }

    pub fn bin_dirs(&self) -> &[PathBuf] {
        &self.bin_dirs
    }

    pub fn lib_dirs(&self) -> &[PathBuf] {
        &self.lib_dirs
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn mount_dir(&self) -> &Path {
        &self.mount_dir
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Every existing `<bin_dir>/<name>`, in search order
    pub fn find_all(&self, name: &str) -> Vec<PathBuf> {
        self.bin_dirs
            .iter()
            .map(|d| d.join(name))
            .filter(|p| p.exists())
            .collect()
    }

    /// First `<bin_dir>/<name>`
    pub fn find_program(&self, name: &str) -> Result<PathBuf> {
        self.find_all(name)
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::ExecutableNotFound {
                program: name.to_string(),
                searched: self.bin_dirs.clone(),
            })
    }
}

/// Multiplicative size units understood by [`FileCreator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    /// c = 1
    Byte,
    /// w = 2
    Word,
    /// b = 512
    Block,
    /// kB = 1000
    KiloByte,
    /// K = 1024
    KibiByte,
    /// MB = 1000^2
    MegaByte,
    /// M = 1024^2
    MebiByte,
    /// GB = 1000^3
    GigaByte,
    /// G = 1024^3
    GibiByte,
}

impl SizeUnit {
    pub fn multiplier(self) -> u64 {
        match self {
            SizeUnit::Byte => 1,
            SizeUnit::Word => 2,
            SizeUnit::Block => 512,
            SizeUnit::KiloByte => 1000,
            SizeUnit::KibiByte => 1024,
            SizeUnit::MegaByte => 1000 * 1000,
            SizeUnit::MebiByte => 1024 * 1024,
            SizeUnit::GigaByte => 1000 * 1000 * 1000,
            SizeUnit::GibiByte => 1024 * 1024 * 1024,
        }
    }
}

impl FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "c" => SizeUnit::Byte,
            "w" => SizeUnit::Word,
            "b" => SizeUnit::Block,
            "kB" => SizeUnit::KiloByte,
            "K" => SizeUnit::KibiByte,
            "MB" => SizeUnit::MegaByte,
            "M" => SizeUnit::MebiByte,
            "GB" => SizeUnit::GigaByte,
            "G" => SizeUnit::GibiByte,
            other => return Err(format!("unknown size unit '{}'", other)),
        })
    }
}

/// A file created by [`FileCreator`]
///
/// Integrity checks through the shell must run `sha256sum`, not `md5sum`:
/// [`TestFile::sha256sum`] is the only digest kept for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
    pub pathname: PathBuf,
    pub size: u64,
}

impl TestFile {
    /// Hex SHA-256 of the file contents
    pub fn sha256sum(&self) -> io::Result<String> {
        let mut file = File::open(&self.pathname)?;
        let mut hasher = Sha256::new();
        let mut block = vec![0u8; BLOCK_SIZE];
        loop {
            let n = file.read(&mut block)?;
            if n == 0 {
                break;
            }
            hasher.update(&block[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Creates random binary input files in a workspace's `tmp` directory.
#[derive(Debug, Clone)]
pub struct FileCreator {
    tmp_dir: PathBuf,
}

impl FileCreator {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            tmp_dir: workspace.tmp_dir().to_path_buf(),
        }
    }

    /// Write `size * unit` random bytes to `<tmp>/<pathname>`.
    /// Fractional sizes are truncated to whole bytes.
    pub fn create(&self, pathname: &str, size: f64, unit: SizeUnit) -> Result<TestFile> {
        let total = (size * unit.multiplier() as f64) as u64;
        let full = self.tmp_dir.join(pathname);

        let mut out = BufWriter::new(File::create(&full)?);
        let mut rng = rand::thread_rng();
        let mut block = vec![0u8; BLOCK_SIZE];
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(BLOCK_SIZE as u64) as usize;
            rng.fill_bytes(&mut block[..n]);
            out.write_all(&block[..n])?;
            remaining -= n as u64;
        }
        out.flush()?;

        debug!(target: "workspace", path = %full.display(), size = total, "created input file");
        Ok(TestFile {
            pathname: full,
            size: total,
        })
    }
}
