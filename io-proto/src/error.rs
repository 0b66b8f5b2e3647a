use crate::Operation;

/// Errors produced while decoding client output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported operation '{0}'")]
    UnsupportedOperation(String),

    #[error("malformed output for '{op}': {reason} (raw: {raw:?})")]
    MalformedOutput {
        op: Operation,
        reason: String,
        raw: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(op: Operation, reason: impl Into<String>, raw: &str) -> Self {
        DecodeError::MalformedOutput {
            op,
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}
