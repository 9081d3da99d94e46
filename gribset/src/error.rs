use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced by collections, records and the display layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong argument shape: unsupported selector, record from a foreign store, ...
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The codec reported the field absent on a record.
    #[error("key '{key}' not found in record")]
    KeyNotFound { key: String },

    #[error("index {index} out of range for collection of {len} records")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("decode error: {0}")]
    Decode(String),

    /// Operation attempted on a released record or collection.
    #[error("use after release: {0}")]
    UseAfterRelease(&'static str),

    /// Codec failure carried through unchanged.
    #[error(transparent)]
    Codec(CodecError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid display configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::KeyNotFound(key) => Error::KeyNotFound { key },
            CodecError::Decode(msg) => Error::Decode(msg),
            other => Error::Codec(other),
        }
    }
}

impl Error {
    /// Map a codec failure from `open`, turning a missing file into its own condition.
    pub(crate) fn from_open(path: PathBuf, e: CodecError) -> Self {
        match e {
            CodecError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::FileNotFound(path)
            }
            CodecError::Io(source) => Error::Io { path, source },
            other => other.into(),
        }
    }
}
