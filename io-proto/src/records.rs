//! Typed result records produced by the decoder.

use serde::{Deserialize, Serialize};

use crate::Operation;

/// `struct timespec` / `struct statx_timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

/// `struct stat` as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub st_dev: i64,
    pub st_ino: i64,
    pub st_mode: i64,
    pub st_nlink: i64,
    pub st_uid: i64,
    pub st_gid: i64,
    pub st_rdev: i64,
    pub st_size: i64,
    pub st_blksize: i64,
    pub st_blocks: i64,
    pub st_atim: Timespec,
    pub st_mtim: Timespec,
    pub st_ctim: Timespec,
}

/// `struct statx` as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statx {
    pub stx_mask: i64,
    pub stx_blksize: i64,
    pub stx_attributes: i64,
    pub stx_nlink: i64,
    pub stx_uid: i64,
    pub stx_gid: i64,
    pub stx_mode: i64,
    pub stx_ino: i64,
    pub stx_size: i64,
    pub stx_blocks: i64,
    pub stx_attributes_mask: i64,
    pub stx_atime: Timespec,
    pub stx_btime: Timespec,
    pub stx_ctime: Timespec,
    pub stx_mtime: Timespec,
    pub stx_rdev_major: i64,
    pub stx_rdev_minor: i64,
    pub stx_dev_major: i64,
    pub stx_dev_minor: i64,
}

/// One `struct dirent`, in the order the daemon enumerated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirent {
    pub d_ino: i64,
    pub d_off: i64,
    pub d_reclen: i64,
    pub d_type: i64,
    pub d_name: String,
}

/// Plain `retval` + `errno` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Return {
    pub retval: i64,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpendirReturn {
    /// `None` when `opendir()` returned `NULL`.
    pub dirp: Option<u64>,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReturn {
    /// `None` when the client emitted no buffer, which is not the same as
    /// an empty read.
    pub buf: Option<Vec<u8>>,
    pub retval: i64,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

/// Vectored read: one buffer per iovec segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadvReturn {
    pub buf_0: Option<Vec<u8>>,
    pub buf_1: Option<Vec<u8>>,
    pub retval: i64,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaddirReturn {
    pub dirents: Option<Vec<Dirent>>,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatReturn {
    pub retval: i64,
    pub statbuf: Stat,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatxReturn {
    pub retval: i64,
    pub statbuf: Statx,
    #[serde(rename = "errnum")]
    pub errno: i64,
}

/// Decoded output of one client invocation, tagged by operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", content = "result", rename_all = "snake_case")]
pub enum OpResult {
    Mkdir(Return),
    Open(Return),
    Opendir(OpendirReturn),
    Read(ReadReturn),
    Pread(ReadReturn),
    Readv(ReadvReturn),
    Preadv(ReadvReturn),
    Readdir(ReaddirReturn),
    Rmdir(Return),
    Write(Return),
    Pwrite(Return),
    Writev(Return),
    Pwritev(Return),
    Stat(StatReturn),
    Statx(StatxReturn),
    Lseek(Return),
    WriteRandom(Return),
    WriteValidate(Return),
    Truncate(Return),
    FileCompare(Return),
}

impl OpResult {
    pub fn operation(&self) -> Operation {
        match self {
            OpResult::Mkdir(_) => Operation::Mkdir,
            OpResult::Open(_) => Operation::Open,
            OpResult::Opendir(_) => Operation::Opendir,
            OpResult::Read(_) => Operation::Read,
            OpResult::Pread(_) => Operation::Pread,
            OpResult::Readv(_) => Operation::Readv,
            OpResult::Preadv(_) => Operation::Preadv,
            OpResult::Readdir(_) => Operation::Readdir,
            OpResult::Rmdir(_) => Operation::Rmdir,
            OpResult::Write(_) => Operation::Write,
            OpResult::Pwrite(_) => Operation::Pwrite,
            OpResult::Writev(_) => Operation::Writev,
            OpResult::Pwritev(_) => Operation::Pwritev,
            OpResult::Stat(_) => Operation::Stat,
            OpResult::Statx(_) => Operation::Statx,
            OpResult::Lseek(_) => Operation::Lseek,
            OpResult::WriteRandom(_) => Operation::WriteRandom,
            OpResult::WriteValidate(_) => Operation::WriteValidate,
            OpResult::Truncate(_) => Operation::Truncate,
            OpResult::FileCompare(_) => Operation::FileCompare,
        }
    }

    /// POSIX-style return value.
    ///
    /// `opendir` reports the `DIR*` value (0 for `NULL`); `readdir` has no
    /// return value of its own and reports 0 for a listing, -1 when the
    /// client emitted `null` or a non-zero errno. A failed `opendir` inside
    /// the client prints an empty listing together with its errno.
    pub fn retval(&self) -> i64 {
        match self {
            OpResult::Opendir(r) => r.dirp.map_or(0, |p| p as i64),
            OpResult::Readdir(r) => {
                if r.dirents.is_some() && r.errno == 0 {
                    0
                } else {
                    -1
                }
            }
            OpResult::Read(r) | OpResult::Pread(r) => r.retval,
            OpResult::Readv(r) | OpResult::Preadv(r) => r.retval,
            OpResult::Stat(r) => r.retval,
            OpResult::Statx(r) => r.retval,
            OpResult::Mkdir(r)
            | OpResult::Open(r)
            | OpResult::Rmdir(r)
            | OpResult::Write(r)
            | OpResult::Pwrite(r)
            | OpResult::Writev(r)
            | OpResult::Pwritev(r)
            | OpResult::Lseek(r)
            | OpResult::WriteRandom(r)
            | OpResult::WriteValidate(r)
            | OpResult::Truncate(r)
            | OpResult::FileCompare(r) => r.retval,
        }
    }

    /// `errno` exactly as the client reported it (0 when unset).
    pub fn errno(&self) -> i64 {
        match self {
            OpResult::Opendir(r) => r.errno,
            OpResult::Readdir(r) => r.errno,
            OpResult::Read(r) | OpResult::Pread(r) => r.errno,
            OpResult::Readv(r) | OpResult::Preadv(r) => r.errno,
            OpResult::Stat(r) => r.errno,
            OpResult::Statx(r) => r.errno,
            OpResult::Mkdir(r)
            | OpResult::Open(r)
            | OpResult::Rmdir(r)
            | OpResult::Write(r)
            | OpResult::Pwrite(r)
            | OpResult::Writev(r)
            | OpResult::Pwritev(r)
            | OpResult::Lseek(r)
            | OpResult::WriteRandom(r)
            | OpResult::WriteValidate(r)
            | OpResult::Truncate(r)
            | OpResult::FileCompare(r) => r.errno,
        }
    }

    /// Buffer of a single-segment read, if any.
    pub fn buf(&self) -> Option<&[u8]> {
        match self {
            OpResult::Read(r) | OpResult::Pread(r) => r.buf.as_deref(),
            _ => None,
        }
    }

    /// Buffers of a vectored read, one per segment.
    pub fn bufs(&self) -> Option<[Option<&[u8]>; 2]> {
        match self {
            OpResult::Readv(r) | OpResult::Preadv(r) => {
                Some([r.buf_0.as_deref(), r.buf_1.as_deref()])
            }
            _ => None,
        }
    }

    pub fn dirents(&self) -> Option<&[Dirent]> {
        match self {
            OpResult::Readdir(r) => r.dirents.as_deref(),
            _ => None,
        }
    }

    pub fn stat(&self) -> Option<&Stat> {
        match self {
            OpResult::Stat(r) => Some(&r.statbuf),
            _ => None,
        }
    }

    pub fn statx(&self) -> Option<&Statx> {
        match self {
            OpResult::Statx(r) => Some(&r.statbuf),
            _ => None,
        }
    }
}
