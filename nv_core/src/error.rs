/// Errors raised while interpreting or framing note buffers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NoteError {
    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("truncated frame at offset {offset}: need {needed} bytes, {remaining} remaining")]
    TruncatedFrame {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("frame too large: {0} bytes (max: {max})", max = u32::MAX)]
    FrameTooLarge(usize),

    #[error("unknown byte decoding tag: {0:#04x}")]
    UnknownTag(u8),
}

impl NoteError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        NoteError::MalformedValue(msg.into())
    }
}
