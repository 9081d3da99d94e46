//! Wire layout of the framed reference format.
//!
//! One message per frame, little-endian throughout:
//!
//! ```text
//!   0..4    magic "MSG1"
//!   4..8    total frame length (u32, includes magic and end marker)
//!   8..10   field count (u16)
//!           per field: key_len:u8, key[key_len], tag:u8, value
//!             tag 0: i64, tag 1: f64, tag 2: len:u16 + utf8[len]
//!           value count (u32), values: f64 * count
//!   ..      end marker "7777"
//! ```

use std::io::{self, Read, Write};

use crate::{
    codec::{CodecError, CodecResult},
    value::Value,
};

pub const MAGIC: &[u8; 4] = b"MSG1";
pub const END_MARKER: &[u8; 4] = b"7777";
/// magic + length + end marker.
const FRAME_OVERHEAD: usize = 12;
/// Upper bound on a single frame, guards allocation on corrupt length fields.
const MAX_FRAME_LEN: usize = 1 << 30;

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_STR: u8 = 2;

/// A decoded message. `values` is `None` when decoded headers-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub fields: Vec<(String, Value)>,
    pub values: Option<Vec<f64>>,
}

impl Message {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replace a field in place, or append it when new.
    pub fn set_field(&mut self, key: &str, value: Value) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key.to_owned(), value)),
        }
    }
}

#[inline]
fn u16le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}
#[inline]
fn u32le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
#[inline]
fn u64le(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

fn malformed(msg: impl Into<String>) -> CodecError {
    CodecError::Decode(msg.into())
}

/// Bounds-checked forward reader over one frame body.
struct Cursor<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> CodecResult<&'a [u8]> {
        let end = self
            .off
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                malformed(format!("{what} out of bounds at off={}", self.off))
            })?;
        let s = &self.buf[self.off..end];
        self.off = end;
        Ok(s)
    }

    fn u8(&mut self, what: &str) -> CodecResult<u8> {
        Ok(self.take(1, what)?[0])
    }
}

/// Read `buf.len()` bytes unless the stream ends first; returns bytes read.
fn read_full(stream: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match stream.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}

/// Pull the raw bytes of the next frame off `stream`. `Ok(None)` at a clean end.
pub fn read_frame(stream: &mut dyn Read) -> CodecResult<Option<Vec<u8>>> {
    let mut head = [0u8; 8];
    match read_full(stream, &mut head)? {
        0 => return Ok(None),
        8 => {}
        n => return Err(malformed(format!("truncated frame header ({n} bytes)"))),
    }
    if &head[0..4] != MAGIC {
        return Err(malformed(format!("bad magic {:02x?}", &head[0..4])));
    }
    let total = u32le(&head[4..8]) as usize;
    if !(FRAME_OVERHEAD..=MAX_FRAME_LEN).contains(&total) {
        return Err(malformed(format!("implausible frame length {total}")));
    }

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&head);
    frame.resize(total, 0);
    let rest = read_full(stream, &mut frame[8..])?;
    if rest != total - 8 {
        return Err(malformed(format!(
            "truncated frame: need {} more bytes",
            total - 8 - rest
        )));
    }
    if &frame[total - 4..] != END_MARKER {
        return Err(malformed("missing end marker"));
    }
    Ok(Some(frame))
}

/// Parse a complete frame as returned by [`read_frame`].
pub fn parse_frame(frame: &[u8], headers_only: bool) -> CodecResult<Message> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(malformed(format!("frame of {} bytes too short", frame.len())));
    }
    let body = &frame[8..frame.len() - 4];
    let mut cur = Cursor { buf: body, off: 0 };

    let nfields = u16le(cur.take(2, "field count")?) as usize;
    let mut fields = Vec::with_capacity(nfields);
    for _ in 0..nfields {
        let klen = cur.u8("key length")? as usize;
        let key = std::str::from_utf8(cur.take(klen, "key")?)
            .map_err(|_| malformed("key is not utf-8"))?
            .to_owned();
        let value = match cur.u8("value tag")? {
            TAG_INT => Value::Int(u64le(cur.take(8, "int value")?) as i64),
            TAG_FLOAT => {
                Value::Float(f64::from_bits(u64le(cur.take(8, "float value")?)))
            }
            TAG_STR => {
                let slen = u16le(cur.take(2, "string length")?) as usize;
                let s = std::str::from_utf8(cur.take(slen, "string value")?)
                    .map_err(|_| malformed(format!("value of '{key}' is not utf-8")))?;
                Value::Str(s.to_owned())
            }
            t => return Err(malformed(format!("unknown value tag {t} for '{key}'"))),
        };
        fields.push((key, value));
    }

    let nvalues = u32le(cur.take(4, "value count")?) as usize;
    let raw = cur.take(
        nvalues
            .checked_mul(8)
            .ok_or_else(|| malformed("value count overflow"))?,
        "data values",
    )?;
    if cur.off != body.len() {
        return Err(malformed(format!(
            "{} trailing bytes before end marker",
            body.len() - cur.off
        )));
    }

    let values = if headers_only {
        None
    } else {
        Some(
            raw.chunks_exact(8)
                .map(|c| f64::from_bits(u64le(c)))
                .collect(),
        )
    };
    Ok(Message { fields, values })
}

/// Serialize one message. Fields are written in the given order, so an
/// unmodified message re-encodes to identical bytes.
pub fn encode_message<K: AsRef<str>>(
    fields: &[(K, Value)],
    values: &[f64],
    out: &mut dyn Write,
) -> CodecResult<()> {
    let mut body = Vec::new();
    let nfields = u16::try_from(fields.len()).map_err(|_| malformed("too many fields"))?;
    body.extend_from_slice(&nfields.to_le_bytes());
    for (key, value) in fields {
        let key = key.as_ref();
        let klen = u8::try_from(key.len())
            .map_err(|_| malformed(format!("key '{key}' too long")))?;
        body.push(klen);
        body.extend_from_slice(key.as_bytes());
        match value {
            Value::Int(i) => {
                body.push(TAG_INT);
                body.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                body.push(TAG_FLOAT);
                body.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Value::Str(s) => {
                let slen = u16::try_from(s.len())
                    .map_err(|_| malformed(format!("value of '{key}' too long")))?;
                body.push(TAG_STR);
                body.extend_from_slice(&slen.to_le_bytes());
                body.extend_from_slice(s.as_bytes());
            }
        }
    }
    let nvalues = u32::try_from(values.len()).map_err(|_| malformed("too many data values"))?;
    body.extend_from_slice(&nvalues.to_le_bytes());
    for v in values {
        body.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    let total = body.len() + FRAME_OVERHEAD;
    if total > MAX_FRAME_LEN {
        return Err(malformed(format!("frame of {total} bytes too large")));
    }
    out.write_all(MAGIC)?;
    out.write_all(&(total as u32).to_le_bytes())?;
    out.write_all(&body)?;
    out.write_all(END_MARKER)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> Vec<u8> {
        let mut buf = Vec::new();
        encode_message(
            &[
                ("shortName", Value::from("t")),
                ("level", Value::Int(850)),
                ("missingValue", Value::Float(9999.0)),
            ],
            &[1.5, 2.5, 9999.0],
            &mut buf,
        )
        .unwrap();
        buf
    }

    #[test]
    fn decodes_fields_and_values() {
        let bytes = sample();
        let mut stream: &[u8] = &bytes;
        let frame = read_frame(&mut stream).unwrap().unwrap();
        assert_eq!(frame.len(), bytes.len());
        let msg = parse_frame(&frame, false).unwrap();
        assert_eq!(msg.field("level"), Some(&Value::Int(850)));
        assert_eq!(msg.values, Some(vec![1.5, 2.5, 9999.0]));
        assert!(read_frame(&mut stream).unwrap().is_none());
    }

    #[test]
    fn headers_only_skips_payload() {
        let bytes = sample();
        let msg = parse_frame(&bytes, true).unwrap();
        assert_eq!(msg.values, None);
        assert_eq!(msg.fields.len(), 3);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let bytes = sample();
        let mut stream: &[u8] = &bytes[..bytes.len() - 3];
        assert!(matches!(read_frame(&mut stream), Err(CodecError::Decode(_))));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample();
        bytes[0] = b'X';
        let mut stream: &[u8] = &bytes;
        assert!(matches!(read_frame(&mut stream), Err(CodecError::Decode(_))));
    }
}
