/*!
 Errors that can happen when decoding a Java object serialization stream.
*/

use thiserror::Error;

/// The reason a stream could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamErrorKind {
    /// The stream does not start with the expected magic number and version
    #[error("Invalid stream header: {field} was {found:#06x}, expected {expected:#06x}")]
    MalformedHeader {
        field: &'static str,
        found: u16,
        expected: u16,
    },
    /// A fixed-width or length-prefixed read ran past the end of the stream
    #[error("Needed {needed} bytes but only {available} remain")]
    TruncatedInput { needed: u64, available: usize },
    /// A back-reference points to a handle that was never assigned, or was discarded by a reset
    #[error("Handle {0:#x} does not refer to a previously decoded object")]
    UnresolvedReference(u32),
    /// The byte does not start any grammar that is legal in this position
    #[error("Unrecognized tag {tag:#04x} while reading {context}")]
    UnrecognizedTag { tag: u8, context: &'static str },
    /// The stream uses a layout this decoder does not interpret
    #[error("Unsupported stream feature: {0}")]
    UnsupportedFeature(String),
    /// A name or string is not valid modified UTF-8
    #[error("Failed to parse string data")]
    InvalidString,
    /// Objects are nested deeper than the configured limit
    #[error("Nesting exceeds the maximum depth of {0}")]
    DepthLimitExceeded(usize),
}

/// Errors that can happen when decoding a Java object serialization stream
///
/// Every error carries the position of the cursor at the point of failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (at byte {offset:#x})")]
pub struct StreamError {
    /// Byte offset into the stream where decoding stopped
    pub offset: usize,
    /// What went wrong
    pub kind: StreamErrorKind,
}

impl StreamError {
    pub(crate) fn new(offset: usize, kind: StreamErrorKind) -> Self {
        Self { offset, kind }
    }
}
