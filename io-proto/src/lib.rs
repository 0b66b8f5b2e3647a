//! Decoder for the output of the `gkfs.io` test client
//!
//! Every client invocation runs exactly one operation and prints one result
//! record on stdout. Two encodings are accepted:
//!
//!   JSON       - an object keyed by schema field names (what the client
//!                prints with its default pretty printer)
//!   positional - whitespace separated tokens in schema field order:
//!                  integers  decimal, optionally signed
//!                  buffers   `[ b0 b1 ... ]` or `null`
//!                  records   `{ f0 f1 ... }`
//!                  lists     `[ { ... } { ... } ]` or `null`
//!
//! Output starting with `{` is treated as JSON. Both encodings decode into
//! the same [`OpResult`]. `errnum` is reported as-is; it is never checked
//! against `retval`.

mod decode;
mod error;
mod records;
mod schema;

pub use decode::{decode, Decoder};
pub use error::DecodeError;
pub use records::{
    Dirent, OpResult, OpendirReturn, ReadReturn, ReaddirReturn, ReadvReturn, Return, Stat,
    StatReturn, Statx, StatxReturn, Timespec,
};
pub use schema::{Field, Kind, Operation, DIRENT, STAT, STATX, TIMESPEC};
