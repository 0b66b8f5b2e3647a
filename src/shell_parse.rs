//! Parsers for the output of a few shell utilities run through the
//! interception library.

use serde::Serialize;
use std::str::FromStr;

use crate::error::{HarnessError, Result};

/// `md5sum FILE` / `sha256sum FILE`: `<digest>  <filename>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestOutput {
    pub digest: String,
    pub filename: String,
}

/// `stat --terse FILE`
///
/// Format: `%n %s %b %f %u %g %D %i %h %t %T %X %Y %Z %W %o`. Hex fields
/// (raw mode, device, major, minor) are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatOutput {
    pub filename: String,
    pub size: i64,
    pub blocks: i64,
    pub raw_mode: String,
    pub uid: i64,
    pub gid: i64,
    pub device: String,
    pub inode: i64,
    pub hard_links: i64,
    pub major: String,
    pub minor: String,
    pub last_access: i64,
    pub last_modification: i64,
    pub last_status_change: i64,
    /// 0 when unknown
    pub creation: i64,
    pub transfer_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShellOutput {
    Digest(DigestOutput),
    Stat(StatOutput),
}

/// Parse `output` of `command`. Only `md5sum`, `sha256sum` and `stat` are known.
pub fn parse(command: &str, output: &str) -> Result<ShellOutput> {
    match command {
        "md5sum" | "sha256sum" => parse_digest(command, output).map(ShellOutput::Digest),
        "stat" => parse_stat(output).map(ShellOutput::Stat),
        other => Err(HarnessError::UnsupportedCommand(other.to_string())),
    }
}

fn malformed(command: &str, reason: impl Into<String>) -> HarnessError {
    HarnessError::MalformedShellOutput {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn parse_digest(command: &str, output: &str) -> Result<DigestOutput> {
    let line = output.trim();
    let (digest, filename) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| malformed(command, format!("expected '<digest> <file>', got {:?}", line)))?;

    if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed(command, format!("not a hex digest: {:?}", digest)));
    }

    Ok(DigestOutput {
        digest: digest.to_string(),
        filename: filename.trim_start().to_string(),
    })
}

fn parse_stat(output: &str) -> Result<StatOutput> {
    let mut fields = output.split_whitespace();
    let mut next = |name: &str| {
        fields
            .next()
            .map(str::to_string)
            .ok_or_else(|| malformed("stat", format!("missing field '{}'", name)))
    };

    fn int<T: FromStr>(name: &str, value: String) -> Result<T> {
        value
            .parse()
            .map_err(|_| malformed("stat", format!("field '{}' is not a number: {:?}", name, value)))
    }

    Ok(StatOutput {
        filename: next("filename")?,
        size: int("size", next("size")?)?,
        blocks: int("blocks", next("blocks")?)?,
        raw_mode: next("raw_mode")?,
        uid: int("uid", next("uid")?)?,
        gid: int("gid", next("gid")?)?,
        device: next("device")?,
        inode: int("inode", next("inode")?)?,
        hard_links: int("hard_links", next("hard_links")?)?,
        major: next("major")?,
        minor: next("minor")?,
        last_access: int("last_access", next("last_access")?)?,
        last_modification: int("last_modification", next("last_modification")?)?,
        last_status_change: int("last_status_change", next("last_status_change")?)?,
        creation: int("creation", next("creation")?)?,
        transfer_size: int("transfer_size", next("transfer_size")?)?,
    })
}

impl ShellOutput {
    pub fn as_digest(&self) -> Option<&DigestOutput> {
        match self {
            ShellOutput::Digest(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stat(&self) -> Option<&StatOutput> {
        match self {
            ShellOutput::Stat(s) => Some(s),
            _ => None,
        }
    }
}
