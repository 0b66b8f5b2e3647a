//! Schema-driven decoding of client output.
//!
//! Both encodings are first normalised into a `serde_json::Value` object
//! keyed by schema field names and checked against the schema, then turned
//! into the typed record for the operation.

use serde_json::{Map, Number, Value};

use crate::records::OpResult;
use crate::schema::{Field, Kind};
use crate::{DecodeError, Operation};

/// Stateless decoder for `gkfs.io` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Decoder
    }

    /// Decode the output of `command`. Unknown commands are rejected before
    /// the output is looked at.
    pub fn parse(&self, command: &str, output: &str) -> Result<OpResult, DecodeError> {
        decode(command, output)
    }
}

/// Decode the output of the operation named `op_name`.
pub fn decode(op_name: &str, output: &str) -> Result<OpResult, DecodeError> {
    let op: Operation = op_name.parse()?;
    op.decode(output)
}

impl Operation {
    /// Decode one invocation's output for this operation.
    pub fn decode(self, output: &str) -> Result<OpResult, DecodeError> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(DecodeError::malformed(self, "empty output", output));
        }

        let record = if trimmed.starts_with('{') {
            let value: Value = serde_json::from_str(trimmed)
                .map_err(|e| DecodeError::malformed(self, format!("invalid JSON: {}", e), output))?;
            check_record(self.schema(), &value, "")
                .map_err(|reason| DecodeError::malformed(self, reason, output))?;
            value
        } else {
            let mut reader = Positional::new(trimmed);
            let map = reader
                .record(self.schema(), "")
                .and_then(|map| reader.finish().map(|_| map))
                .map_err(|reason| DecodeError::malformed(self, reason, output))?;
            Value::Object(map)
        };

        build(self, record).map_err(|e| DecodeError::malformed(self, e.to_string(), output))
    }
}

fn build(op: Operation, record: Value) -> serde_json::Result<OpResult> {
    use serde_json::from_value;

    Ok(match op {
        Operation::Mkdir => OpResult::Mkdir(from_value(record)?),
        Operation::Open => OpResult::Open(from_value(record)?),
        Operation::Opendir => OpResult::Opendir(from_value(record)?),
        Operation::Read => OpResult::Read(from_value(record)?),
        Operation::Pread => OpResult::Pread(from_value(record)?),
        Operation::Readv => OpResult::Readv(from_value(record)?),
        Operation::Preadv => OpResult::Preadv(from_value(record)?),
        Operation::Readdir => OpResult::Readdir(from_value(record)?),
        Operation::Rmdir => OpResult::Rmdir(from_value(record)?),
        Operation::Write => OpResult::Write(from_value(record)?),
        Operation::Pwrite => OpResult::Pwrite(from_value(record)?),
        Operation::Writev => OpResult::Writev(from_value(record)?),
        Operation::Pwritev => OpResult::Pwritev(from_value(record)?),
        Operation::Stat => OpResult::Stat(from_value(record)?),
        Operation::Statx => OpResult::Statx(from_value(record)?),
        Operation::Lseek => OpResult::Lseek(from_value(record)?),
        Operation::WriteRandom => OpResult::WriteRandom(from_value(record)?),
        Operation::WriteValidate => OpResult::WriteValidate(from_value(record)?),
        Operation::Truncate => OpResult::Truncate(from_value(record)?),
        Operation::FileCompare => OpResult::FileCompare(from_value(record)?),
    })
}

fn path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

// ============================================================================
// JSON encoding
// ============================================================================

fn check_record(fields: &[Field], value: &Value, prefix: &str) -> Result<(), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected object at '{}'", display_path(prefix)))?;

    for key in object.keys() {
        if !fields.iter().any(|f| f.name == key) {
            return Err(format!("unknown field '{}'", path(prefix, key)));
        }
    }

    for field in fields {
        let at = path(prefix, field.name);
        match object.get(field.name) {
            Some(v) => check_value(field.kind, v, &at)?,
            None if is_nullable(field.kind) => {}
            None => return Err(format!("missing field '{}'", at)),
        }
    }
    Ok(())
}

fn check_value(kind: Kind, value: &Value, at: &str) -> Result<(), String> {
    match kind {
        Kind::Int => {
            if value.as_i64().is_none() {
                return Err(format!("field '{}' is not a signed integer: {}", at, value));
            }
        }
        Kind::Handle => {
            if !value.is_null() && value.as_u64().is_none() {
                return Err(format!("field '{}' is not a pointer value: {}", at, value));
            }
        }
        Kind::Str => {
            if !value.is_string() {
                return Err(format!("field '{}' is not a string: {}", at, value));
            }
        }
        Kind::Bytes { nullable } => match value {
            Value::Null if nullable => {}
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if item.as_u64().map_or(true, |b| b > u8::MAX as u64) {
                        return Err(format!("field '{}[{}]' is not a byte: {}", at, i, item));
                    }
                }
            }
            _ => return Err(format!("field '{}' is not a byte buffer: {}", at, value)),
        },
        Kind::Struct(fields) => check_record(fields, value, at)?,
        Kind::List { item, nullable } => match value {
            Value::Null if nullable => {}
            Value::Array(items) => {
                for (i, entry) in items.iter().enumerate() {
                    check_record(item, entry, &format!("{}[{}]", at, i))?;
                }
            }
            _ => return Err(format!("field '{}' is not a list: {}", at, value)),
        },
    }
    Ok(())
}

fn is_nullable(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Bytes { nullable: true } | Kind::List { nullable: true, .. }
    )
}

fn display_path(prefix: &str) -> &str {
    if prefix.is_empty() {
        "<root>"
    } else {
        prefix
    }
}

// ============================================================================
// Positional encoding
// ============================================================================

/// Split a line into tokens. Block delimiters are tokens of their own even
/// when not surrounded by whitespace, so `{1 2}` and `{ 1 2 }` are equal.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for word in line.split_whitespace() {
        let mut start = 0;
        for (i, c) in word.char_indices() {
            if matches!(c, '{' | '}' | '[' | ']') {
                if start < i {
                    tokens.push(&word[start..i]);
                }
                tokens.push(&word[i..i + 1]);
                start = i + 1;
            }
        }
        if start < word.len() {
            tokens.push(&word[start..]);
        }
    }
    tokens
}

fn is_delimiter(token: &str) -> bool {
    matches!(token, "{" | "}" | "[" | "]")
}

struct Positional<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Positional<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            tokens: tokenize(line),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self, at: &str) -> Result<&'a str, String> {
        let token = self
            .peek()
            .ok_or_else(|| format!("missing field '{}'", at))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, delimiter: &str, at: &str) -> Result<(), String> {
        match self.next(at)? {
            t if t == delimiter => Ok(()),
            t => Err(format!(
                "expected '{}' at '{}', found '{}'",
                delimiter, at, t
            )),
        }
    }

    fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected trailing token '{}'", t)),
        }
    }

    fn record(&mut self, fields: &[Field], prefix: &str) -> Result<Map<String, Value>, String> {
        let mut map = Map::new();
        for field in fields {
            let at = path(prefix, field.name);
            let value = if self.peek().is_none() && is_nullable(field.kind) {
                Value::Null
            } else {
                self.value(field.kind, &at)?
            };
            map.insert(field.name.to_string(), value);
        }
        Ok(map)
    }

    fn value(&mut self, kind: Kind, at: &str) -> Result<Value, String> {
        match kind {
            Kind::Int => {
                let token = self.next(at)?;
                token
                    .parse::<i64>()
                    .map(|n| Value::Number(Number::from(n)))
                    .map_err(|_| format!("field '{}' is not a signed integer: '{}'", at, token))
            }
            Kind::Handle => {
                let token = self.next(at)?;
                if token == "null" {
                    return Ok(Value::Null);
                }
                token
                    .parse::<u64>()
                    .map(|n| Value::Number(Number::from(n)))
                    .map_err(|_| format!("field '{}' is not a pointer value: '{}'", at, token))
            }
            Kind::Str => {
                let token = self.next(at)?;
                if is_delimiter(token) {
                    return Err(format!("field '{}' expected a string, found '{}'", at, token));
                }
                Ok(Value::String(token.to_string()))
            }
            Kind::Bytes { nullable } => {
                if nullable && self.peek() == Some("null") {
                    self.pos += 1;
                    return Ok(Value::Null);
                }
                self.expect("[", at)?;
                let mut bytes = Vec::new();
                loop {
                    let token = self.next(at)?;
                    if token == "]" {
                        break;
                    }
                    let byte = token
                        .parse::<u8>()
                        .map_err(|_| format!("field '{}' has a non-byte element '{}'", at, token))?;
                    bytes.push(Value::Number(Number::from(byte)));
                }
                Ok(Value::Array(bytes))
            }
            Kind::Struct(fields) => {
                self.expect("{", at)?;
                let map = self.record(fields, at)?;
                self.expect("}", at)?;
                Ok(Value::Object(map))
            }
            Kind::List { item, nullable } => {
                if nullable && self.peek() == Some("null") {
                    self.pos += 1;
                    return Ok(Value::Null);
                }
                self.expect("[", at)?;
                let mut entries = Vec::new();
                while self.peek() != Some("]") {
                    let entry_at = format!("{}[{}]", at, entries.len());
                    self.expect("{", &entry_at)?;
                    let map = self.record(item, &entry_at)?;
                    self.expect("}", &entry_at)?;
                    entries.push(Value::Object(map));
                }
                self.expect("]", at)?;
                Ok(Value::Array(entries))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Dirent, Return, Timespec};

    const STAT_LINE: &str = "0 { 2049 1234 33188 1 1000 1000 0 4096 4096 8 \
                             { 1583160824 11 } { 1583160634 22 } { 1583160634 33 } } 0";

    #[test]
    fn test_tokenize_splits_delimiters() {
        assert_eq!(tokenize("{1 2}"), vec!["{", "1", "2", "}"]);
        assert_eq!(tokenize("[ ]"), vec!["[", "]"]);
        assert_eq!(tokenize("a[3]b"), vec!["a", "[", "3", "]", "b"]);
    }

    #[test]
    fn test_mkdir_honors_field_order() {
        let result = decode("mkdir", "0 5").unwrap();
        assert_eq!(
            result,
            OpResult::Mkdir(Return {
                retval: 0,
                errno: 5
            })
        );
    }

    #[test]
    fn test_errno_is_never_rewritten() {
        let result = decode("open", "3 2").unwrap();
        assert_eq!(result.retval(), 3);
        assert_eq!(result.errno(), 2);
    }

    #[test]
    fn test_unknown_operation_is_rejected_before_output() {
        let err = decode("chmod", "0 0").unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedOperation("chmod".into()));
    }

    #[test]
    fn test_missing_field_reports_op_and_raw_line() {
        let err = decode("rmdir", "0").unwrap_err();
        match err {
            DecodeError::MalformedOutput { op, reason, raw } => {
                assert_eq!(op, Operation::Rmdir);
                assert!(reason.contains("errnum"), "{}", reason);
                assert_eq!(raw, "0");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_trailing_tokens_are_malformed() {
        assert!(matches!(
            decode("lseek", "0 0 7"),
            Err(DecodeError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_non_integer_is_malformed() {
        assert!(matches!(
            decode("truncate", "zero 0"),
            Err(DecodeError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_empty_output_is_malformed() {
        assert!(matches!(
            decode("write", "  \n"),
            Err(DecodeError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_large_integers_keep_precision() {
        let result = decode("lseek", "9223372036854775807 0").unwrap();
        assert_eq!(result.retval(), i64::MAX);
        let result = decode("lseek", "-9223372036854775808 22").unwrap();
        assert_eq!(result.retval(), i64::MIN);
    }

    #[test]
    fn test_read_buffer_null_vs_empty() {
        let null = decode("read", "null -1 9").unwrap();
        assert_eq!(null.buf(), None);
        assert_eq!(null.errno(), 9);

        let empty = decode("read", "[ ] 0 0").unwrap();
        assert_eq!(empty.buf(), Some(&[][..]));
    }

    #[test]
    fn test_read_buffer_bytes_preserved() {
        let result = decode("pread", "[104 0 255 10] 4 0").unwrap();
        assert_eq!(result.buf(), Some(&[104u8, 0, 255, 10][..]));
    }

    #[test]
    fn test_byte_out_of_range_is_malformed() {
        assert!(decode("read", "[256] 1 0").is_err());
    }

    #[test]
    fn test_readv_one_buffer_per_segment() {
        let result = decode("readv", "[1 2] [3] 3 0").unwrap();
        let [first, second] = result.bufs().unwrap();
        assert_eq!(first, Some(&[1u8, 2][..]));
        assert_eq!(second, Some(&[3u8][..]));

        let failed = decode("preadv", "null null -1 14").unwrap();
        assert_eq!(failed.bufs().unwrap(), [None, None]);
    }

    #[test]
    fn test_stat_nested_timestamps() {
        let result = decode("stat", STAT_LINE).unwrap();
        let stat = result.stat().unwrap();
        assert_eq!(stat.st_ino, 1234);
        assert_eq!(stat.st_mode, 0o100644);
        assert_eq!(stat.st_size, 4096);
        assert_eq!(
            stat.st_atim,
            Timespec {
                tv_sec: 1583160824,
                tv_nsec: 11
            }
        );
        assert_eq!(stat.st_ctim.tv_nsec, 33);
    }

    #[test]
    fn test_stat_unbalanced_block_is_malformed() {
        let truncated = STAT_LINE.trim_end_matches(" } 0");
        assert!(decode("stat", truncated).is_err());
    }

    #[test]
    fn test_statx_positional() {
        let line = "0 { 4095 4096 0 1 0 0 16877 99 0 0 0 \
                    {1 0} {2 0} {3 0} {4 0} 0 0 8 1 } 0";
        let result = decode("statx", line).unwrap();
        let statx = result.statx().unwrap();
        assert_eq!(statx.stx_mask, 4095);
        assert_eq!(statx.stx_mode, 0o40755);
        assert_eq!(statx.stx_btime.tv_sec, 2);
        assert_eq!(statx.stx_mtime.tv_sec, 4);
        assert_eq!(statx.stx_dev_major, 8);
        assert_eq!(statx.stx_dev_minor, 1);
    }

    #[test]
    fn test_readdir_preserves_emission_order() {
        let forward = decode("readdir", "[ {1 0 24 4 top} {2 1 32 8 file_a} ] 0").unwrap();
        let names: Vec<_> = forward
            .dirents()
            .unwrap()
            .iter()
            .map(|d| (d.d_name.as_str(), d.d_type))
            .collect();
        assert_eq!(names, vec![("top", 4), ("file_a", 8)]);

        let reversed = decode("readdir", "[ {2 1 32 8 file_a} {1 0 24 4 top} ] 0").unwrap();
        let names: Vec<_> = reversed
            .dirents()
            .unwrap()
            .iter()
            .map(|d| d.d_name.as_str())
            .collect();
        assert_eq!(names, vec!["file_a", "top"]);
    }

    #[test]
    fn test_readdir_null_listing() {
        let result = decode("readdir", "null 2").unwrap();
        assert_eq!(result.dirents(), None);
        assert_eq!(result.retval(), -1);
        assert_eq!(result.errno(), 2);
    }

    #[test]
    fn test_readdir_failed_opendir_prints_empty_listing() {
        let result = decode("readdir", "{\n  \"dirents\": [],\n  \"errnum\": 2\n}").unwrap();
        assert_eq!(result.dirents(), Some(&[][..]));
        assert_eq!(result.retval(), -1);
        assert_eq!(result.errno(), 2);

        let empty_dir = decode("readdir", r#"{"dirents": [], "errnum": 0}"#).unwrap();
        assert_eq!(empty_dir.retval(), 0);
    }

    #[test]
    fn test_opendir_handle() {
        let ok = decode("opendir", "94251349471856 0").unwrap();
        assert_eq!(ok.retval(), 94251349471856);
        let failed = decode("opendir", "null 2").unwrap();
        assert_eq!(failed.retval(), 0);
    }

    #[test]
    fn test_json_matches_positional() {
        let json = r#"{
          "retval": 0,
          "errnum": 0,
          "statbuf": {
            "st_dev": 2049, "st_ino": 1234, "st_mode": 33188, "st_nlink": 1,
            "st_uid": 1000, "st_gid": 1000, "st_rdev": 0, "st_size": 4096,
            "st_blksize": 4096, "st_blocks": 8,
            "st_atim": {"tv_sec": 1583160824, "tv_nsec": 11},
            "st_mtim": {"tv_sec": 1583160634, "tv_nsec": 22},
            "st_ctim": {"tv_sec": 1583160634, "tv_nsec": 33}
          }
        }"#;
        assert_eq!(decode("stat", json).unwrap(), decode("stat", STAT_LINE).unwrap());
    }

    #[test]
    fn test_json_read_missing_buffer_is_null() {
        let result = decode("read", r#"{"retval": -1, "errnum": 2}"#).unwrap();
        assert_eq!(result.buf(), None);
        assert_eq!(result.retval(), -1);
    }

    #[test]
    fn test_json_missing_required_field() {
        let err = decode("stat", r#"{"retval": 0, "errnum": 0}"#).unwrap_err();
        match err {
            DecodeError::MalformedOutput { reason, .. } => {
                assert!(reason.contains("statbuf"), "{}", reason)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_json_unknown_field_rejected() {
        assert!(decode("mkdir", r#"{"retval": 0, "errnum": 0, "extra": 1}"#).is_err());
    }

    #[test]
    fn test_json_dirent_names_may_contain_spaces() {
        let json = r#"{"dirents": [{"d_ino": 7, "d_off": 1, "d_reclen": 32,
                       "d_type": 8, "d_name": "two words"}], "errnum": 0}"#;
        let result = decode("readdir", json).unwrap();
        assert_eq!(
            result.dirents().unwrap(),
            &[Dirent {
                d_ino: 7,
                d_off: 1,
                d_reclen: 32,
                d_type: 8,
                d_name: "two words".into()
            }]
        );
    }

    #[test]
    fn test_decoder_struct_delegates() {
        let decoder = Decoder::new();
        assert_eq!(decoder.parse("write_random", "1024 0").unwrap().retval(), 1024);
        assert!(decoder.parse("nope", "0 0").is_err());
    }
}
