//! Error types for the Hikvision demuxer.

use std::io;
use thiserror::Error;

/// Result type for demuxer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for demuxer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading the recording.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad magic, bad media info marker or a record that fails validation.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A record variant that is known to exist but is not decoded.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The walker ran out of stream. Not a failure.
    #[error("End of stream")]
    EndOfStream,
}

impl Error {
    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Fold a short read into [`Error::EndOfStream`].
    pub(crate) fn eof_as_end(self) -> Self {
        match self {
            Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => Self::EndOfStream,
            other => other,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_becomes_end_of_stream() {
        let err = Error::from(io::Error::from(io::ErrorKind::UnexpectedEof)).eof_as_end();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn other_errors_pass_through() {
        let err = Error::invalid_data("bad").eof_as_end();
        assert!(matches!(err, Error::InvalidData(_)));

        let err = Error::from(io::Error::from(io::ErrorKind::PermissionDenied)).eof_as_end();
        assert!(matches!(err, Error::Io(_)));
    }
}
