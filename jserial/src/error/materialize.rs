/*!
 Errors that can happen when turning decoded Java objects into native data.
*/

use thiserror::Error;

use crate::error::stream::StreamError;

/// Errors that can happen when turning decoded Java objects into native data
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The underlying stream could not be decoded
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// The byte source could not be read
    #[error("Unable to read stream: {0}")]
    CannotRead(#[from] std::io::Error),
    /// Top-level content at `index` is not an object instance
    #[error("Unhandled content type {kind} at position {index}")]
    UnexpectedContentKind { index: usize, kind: &'static str },
    /// A class handler could not interpret the data written by the class
    #[error("Malformed annotation for {class}: {reason}")]
    MalformedAnnotation { class: String, reason: String },
    /// The stream would produce more native values than the configured limit
    #[error("Materialized output exceeds {0} values")]
    TooManyValues(usize),
}
