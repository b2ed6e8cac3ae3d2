//! Error type shared by the codec and the instrumentation pass.
//!
//! Every failure aborts the current module. Variants that can be attributed to
//! a position in the input carry the absolute byte offset.

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("bad magic number {found:02x?}, expected \\0asm")]
    BadMagic { found: [u8; 4] },
    #[error("unsupported binary version {0}")]
    UnsupportedVersion(u32),
    #[error("malformed section {id} at offset {offset:#x}: {reason}")]
    MalformedSection {
        id: u8,
        offset: usize,
        reason: String,
    },
    #[error("unexpected end of input at offset {offset:#x} (wanted {wanted} more bytes)")]
    UnexpectedEnd { offset: usize, wanted: usize },
    #[error("invalid LEB128 integer at offset {offset:#x}")]
    InvalidLeb128 { offset: usize },
    #[error("unknown opcode {opcode:#04x}{} at offset {offset:#x}", .sub.map(|s| format!(" {s}")).unwrap_or_default())]
    UnknownOpcode {
        opcode: u8,
        sub: Option<u32>,
        offset: usize,
    },
    #[error("{reason} at offset {offset:#x}")]
    InvalidImmediate { offset: usize, reason: &'static str },
    #[error("block terminator without an open block at offset {offset:#x}")]
    UnmatchedBlockEnd { offset: usize },
    #[error("function body truncated at offset {offset:#x}")]
    TruncatedBody { offset: usize },
    #[error("instructions after the final `end` at offset {offset:#x}")]
    TrailingCode { offset: usize },
    #[error("module has no code section")]
    NoCodeSection,
    #[error("function section declares {declared} functions but code section has {bodies} bodies")]
    FunctionCountMismatch { declared: usize, bodies: usize },
    #[error("{space} index {index} out of range (len {len}) in {context}")]
    IndexOutOfRange {
        space: &'static str,
        index: u32,
        len: u32,
        context: String,
    },
}

impl Error {
    /// Absolute input offset the error was raised at, when one is known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::BadMagic { .. } => Some(0),
            Error::UnsupportedVersion(_) => Some(4),
            Error::MalformedSection { offset, .. }
            | Error::UnexpectedEnd { offset, .. }
            | Error::InvalidLeb128 { offset }
            | Error::UnknownOpcode { offset, .. }
            | Error::InvalidImmediate { offset, .. }
            | Error::UnmatchedBlockEnd { offset }
            | Error::TruncatedBody { offset }
            | Error::TrailingCode { offset } => Some(*offset),
            Error::NoCodeSection
            | Error::FunctionCountMismatch { .. }
            | Error::IndexOutOfRange { .. } => None,
        }
    }

    /// Rewrites a cursor underflow into the error kind of the enclosing
    /// structure; every other error passes through untouched.
    pub(crate) fn map_unexpected_end(self, f: impl FnOnce(usize) -> Error) -> Error {
        match self {
            Error::UnexpectedEnd { offset, .. } => f(offset),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_reported() {
        assert_eq!(Error::BadMagic { found: [0; 4] }.offset(), Some(0));
        assert_eq!(Error::TruncatedBody { offset: 17 }.offset(), Some(17));
        assert_eq!(Error::NoCodeSection.offset(), None);
    }

    #[test]
    fn unexpected_end_is_remapped() {
        let err = Error::UnexpectedEnd {
            offset: 9,
            wanted: 1,
        }
        .map_unexpected_end(|offset| Error::TruncatedBody { offset });
        assert_eq!(err, Error::TruncatedBody { offset: 9 });

        let untouched = Error::InvalidLeb128 { offset: 3 }
            .map_unexpected_end(|offset| Error::TruncatedBody { offset });
        assert_eq!(untouched, Error::InvalidLeb128 { offset: 3 });
    }

    #[test]
    fn unknown_opcode_message_includes_sub_opcode() {
        let err = Error::UnknownOpcode {
            opcode: 0xfc,
            sub: Some(99),
            offset: 0x10,
        };
        assert_eq!(err.to_string(), "unknown opcode 0xfc 99 at offset 0x10");
    }
}
