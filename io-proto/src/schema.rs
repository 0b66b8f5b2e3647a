//! Static field schemas for every registered client operation.
//!
//! Field order matters: the positional encoding consumes tokens in exactly
//! the order declared here, and the JSON encoding is validated against the
//! same names.

use std::fmt;
use std::str::FromStr;

use crate::DecodeError;

/// Shape of a single schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Signed decimal integer.
    Int,
    /// Opaque pointer value (e.g. `DIR*`); `null` when the call failed.
    Handle,
    /// Single token string.
    Str,
    /// Byte buffer, `[ b0 b1 ... ]`. Nullable buffers also accept `null`.
    Bytes { nullable: bool },
    /// Nested record.
    Struct(&'static [Field]),
    /// Ordered sequence of nested records.
    List {
        item: &'static [Field],
        nullable: bool,
    },
}

/// A named, typed field in an operation schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
}

const fn int(name: &'static str) -> Field {
    Field {
        name,
        kind: Kind::Int,
    }
}

const fn nested(name: &'static str, fields: &'static [Field]) -> Field {
    Field {
        name,
        kind: Kind::Struct(fields),
    }
}

const fn buffer(name: &'static str) -> Field {
    Field {
        name,
        kind: Kind::Bytes { nullable: true },
    }
}

pub const TIMESPEC: &[Field] = &[int("tv_sec"), int("tv_nsec")];

pub const STAT: &[Field] = &[
    int("st_dev"),
    int("st_ino"),
    int("st_mode"),
    int("st_nlink"),
    int("st_uid"),
    int("st_gid"),
    int("st_rdev"),
    int("st_size"),
    int("st_blksize"),
    int("st_blocks"),
    nested("st_atim", TIMESPEC),
    nested("st_mtim", TIMESPEC),
    nested("st_ctim", TIMESPEC),
];

pub const STATX: &[Field] = &[
    int("stx_mask"),
    int("stx_blksize"),
    int("stx_attributes"),
    int("stx_nlink"),
    int("stx_uid"),
    int("stx_gid"),
    int("stx_mode"),
    int("stx_ino"),
    int("stx_size"),
    int("stx_blocks"),
    int("stx_attributes_mask"),
    nested("stx_atime", TIMESPEC),
    nested("stx_btime", TIMESPEC),
    nested("stx_ctime", TIMESPEC),
    nested("stx_mtime", TIMESPEC),
    int("stx_rdev_major"),
    int("stx_rdev_minor"),
    int("stx_dev_major"),
    int("stx_dev_minor"),
];

pub const DIRENT: &[Field] = &[
    int("d_ino"),
    int("d_off"),
    int("d_reclen"),
    int("d_type"),
    Field {
        name: "d_name",
        kind: Kind::Str,
    },
];

const RETURN: &[Field] = &[int("retval"), int("errnum")];

const OPENDIR: &[Field] = &[
    Field {
        name: "dirp",
        kind: Kind::Handle,
    },
    int("errnum"),
];

const READ: &[Field] = &[buffer("buf"), int("retval"), int("errnum")];

const READV: &[Field] = &[
    buffer("buf_0"),
    buffer("buf_1"),
    int("retval"),
    int("errnum"),
];

const READDIR: &[Field] = &[
    Field {
        name: "dirents",
        kind: Kind::List {
            item: DIRENT,
            nullable: true,
        },
    },
    int("errnum"),
];

const STAT_RETURN: &[Field] = &[int("retval"), nested("statbuf", STAT), int("errnum")];

const STATX_RETURN: &[Field] = &[int("retval"), nested("statbuf", STATX), int("errnum")];

/// The closed set of operations the `gkfs.io` client can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Mkdir,
    Open,
    Opendir,
    Read,
    Pread,
    Readv,
    Preadv,
    Readdir,
    Rmdir,
    Write,
    Pwrite,
    Writev,
    Pwritev,
    Stat,
    Statx,
    Lseek,
    WriteRandom,
    WriteValidate,
    Truncate,
    FileCompare,
}

impl Operation {
    pub const ALL: [Operation; 20] = [
        Operation::Mkdir,
        Operation::Open,
        Operation::Opendir,
        Operation::Read,
        Operation::Pread,
        Operation::Readv,
        Operation::Preadv,
        Operation::Readdir,
        Operation::Rmdir,
        Operation::Write,
        Operation::Pwrite,
        Operation::Writev,
        Operation::Pwritev,
        Operation::Stat,
        Operation::Statx,
        Operation::Lseek,
        Operation::WriteRandom,
        Operation::WriteValidate,
        Operation::Truncate,
        Operation::FileCompare,
    ];

    /// Subcommand name understood by the client binary.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Mkdir => "mkdir",
            Operation::Open => "open",
            Operation::Opendir => "opendir",
            Operation::Read => "read",
            Operation::Pread => "pread",
            Operation::Readv => "readv",
            Operation::Preadv => "preadv",
            Operation::Readdir => "readdir",
            Operation::Rmdir => "rmdir",
            Operation::Write => "write",
            Operation::Pwrite => "pwrite",
            Operation::Writev => "writev",
            Operation::Pwritev => "pwritev",
            Operation::Stat => "stat",
            Operation::Statx => "statx",
            Operation::Lseek => "lseek",
            Operation::WriteRandom => "write_random",
            Operation::WriteValidate => "write_validate",
            Operation::Truncate => "truncate",
            Operation::FileCompare => "file_compare",
        }
    }

    /// Ordered output schema for this operation.
    pub fn schema(self) -> &'static [Field] {
        match self {
            Operation::Mkdir
            | Operation::Open
            | Operation::Rmdir
            | Operation::Write
            | Operation::Pwrite
            | Operation::Writev
            | Operation::Pwritev
            | Operation::Lseek
            | Operation::WriteRandom
            | Operation::WriteValidate
            | Operation::Truncate
            | Operation::FileCompare => RETURN,
            Operation::Opendir => OPENDIR,
            Operation::Read | Operation::Pread => READ,
            Operation::Readv | Operation::Preadv => READV,
            Operation::Readdir => READDIR,
            Operation::Stat => STAT_RETURN,
            Operation::Statx => STATX_RETURN,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| DecodeError::UnsupportedOperation(s.to_string()))
    }
}
