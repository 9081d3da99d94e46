//! The boundary to the external message codec.
//!
//! Everything behind [`Codec`] is a black box: the ownership layer only ever
//! sees [`Handle`] tokens and asks the codec to decode, read, write or free them.

pub mod frame;
pub mod framed;

use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::Path,
};

use thiserror::Error;

use crate::{
    handle::Handle,
    value::{KeyType, Value},
};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("invalid or released handle {0}")]
    InvalidHandle(u64),

    #[error("malformed message: {0}")]
    Decode(String),

    /// The message was decoded headers-only; its data payload is not available.
    #[error("data values not decoded for handle {0} (opened headers-only)")]
    HeadersOnly(u64),

    #[error("key '{0}' is read-only")]
    ReadOnly(String),

    #[error("key '{key}' cannot be represented as {ty:?}")]
    ValueType { key: String, ty: KeyType },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Byte stream a codec decodes messages from.
pub type MessageStream = Box<dyn Read + Send>;

/// Handle-based message codec.
///
/// Implementations own the global handle table; every method must be safe to
/// call from any thread. Callers guarantee a handle is never used after
/// [`release`](Codec::release).
pub trait Codec: Send + Sync {
    /// Open a file for sequential decoding.
    fn open(&self, path: &Path) -> CodecResult<MessageStream> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    /// Decode the next message. `Ok(None)` at a clean end of stream.
    fn decode_next(&self, stream: &mut dyn Read, headers_only: bool)
    -> CodecResult<Option<Handle>>;

    /// Deep copy of a message under a new handle.
    fn clone_handle(&self, handle: Handle) -> CodecResult<Handle>;

    fn get(&self, handle: Handle, key: &str, ty: KeyType) -> CodecResult<Value>;

    fn set(&self, handle: Handle, key: &str, value: Value) -> CodecResult<()>;

    fn get_values(&self, handle: Handle) -> CodecResult<Vec<f64>>;

    fn set_values(&self, handle: Handle, values: &[f64]) -> CodecResult<()>;

    /// Serialize the message onto `out`.
    fn write(&self, handle: Handle, out: &mut dyn Write) -> CodecResult<()>;

    /// Free the native resource behind `handle`.
    fn release(&self, handle: Handle) -> CodecResult<()>;

    /// Sentinel used for missing data points in this message.
    fn missing_value(&self, handle: Handle) -> CodecResult<f64>;

    /// Ordered key names in `namespace`.
    fn keys_in_namespace(&self, handle: Handle, namespace: &str) -> CodecResult<Vec<String>>;
}
