//! In-process reference codec for the framed message format.
//!
//! Stands in for a native decoding library: messages live in a handle table and
//! callers only ever see [`Handle`] tokens.

use std::{
    collections::HashMap,
    io::{Read, Write},
};

use parking_lot::Mutex;

use crate::{
    codec::{
        Codec, CodecError, CodecResult,
        frame::{Message, encode_message, parse_frame, read_frame},
    },
    handle::Handle,
    value::{KeyType, Value},
};

/// Sentinel used when a message does not carry its own `missingValue`.
pub const DEFAULT_MISSING_VALUE: f64 = 9999.0;

const KEY_MISSING_VALUE: &str = "missingValue";
const KEY_DATA_POINTS: &str = "numberOfDataPoints";
const KEY_MISSING_COUNT: &str = "numberOfMissing";

/// Key namespaces, in iteration order. Only keys present on a message are yielded.
const NAMESPACES: &[(&str, &[&str])] = &[
    (
        "ls",
        &[
            "edition",
            "centre",
            "typeOfLevel",
            "level",
            "dataDate",
            "stepRange",
            "dataType",
            "shortName",
            "packingType",
            "gridType",
        ],
    ),
    (
        "time",
        &[
            "dataDate",
            "dataTime",
            "stepUnits",
            "stepType",
            "stepRange",
            "startStep",
            "endStep",
            "validityDate",
            "validityTime",
        ],
    ),
    ("parameter", &["centre", "paramId", "units", "name", "shortName"]),
    (
        "geography",
        &[
            "gridType",
            "Ni",
            "Nj",
            "latitudeOfFirstGridPointInDegrees",
            "longitudeOfFirstGridPointInDegrees",
            "latitudeOfLastGridPointInDegrees",
            "longitudeOfLastGridPointInDegrees",
            "iDirectionIncrementInDegrees",
            "jDirectionIncrementInDegrees",
        ],
    ),
];

#[derive(Debug, Default)]
struct Table {
    next: u64,
    live: HashMap<u64, Message>,
    released: u64,
}

impl Table {
    fn insert(&mut self, msg: Message) -> Handle {
        self.next += 1;
        self.live.insert(self.next, msg);
        Handle::from_raw(self.next)
    }

    fn msg(&self, h: Handle) -> CodecResult<&Message> {
        self.live.get(&h.raw()).ok_or(CodecError::InvalidHandle(h.raw()))
    }

    fn msg_mut(&mut self, h: Handle) -> CodecResult<&mut Message> {
        self.live
            .get_mut(&h.raw())
            .ok_or(CodecError::InvalidHandle(h.raw()))
    }
}

/// Codec over the framed format with an internal handle table.
#[derive(Debug, Default)]
pub struct FramedCodec {
    table: Mutex<Table>,
}

impl FramedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles allocated and not yet released.
    pub fn live_handles(&self) -> usize {
        self.table.lock().live.len()
    }

    /// Total number of successful `release` calls.
    pub fn released_count(&self) -> u64 {
        self.table.lock().released
    }

    /// Whether `handle` is still allocated.
    pub fn is_live(&self, handle: Handle) -> bool {
        self.table.lock().live.contains_key(&handle.raw())
    }
}

fn missing_of(msg: &Message) -> f64 {
    msg.field(KEY_MISSING_VALUE)
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_MISSING_VALUE)
}

fn values_of(h: Handle, msg: &Message) -> CodecResult<&[f64]> {
    msg.values
        .as_deref()
        .ok_or(CodecError::HeadersOnly(h.raw()))
}

fn native_get(h: Handle, msg: &Message, key: &str) -> CodecResult<Value> {
    match key {
        KEY_DATA_POINTS => Ok(Value::Int(values_of(h, msg)?.len() as i64)),
        KEY_MISSING_COUNT => {
            let missing = missing_of(msg);
            let n = values_of(h, msg)?.iter().filter(|v| **v == missing).count();
            Ok(Value::Int(n as i64))
        }
        _ => match msg.field(key) {
            Some(v) => Ok(v.clone()),
            None if key == KEY_MISSING_VALUE => Ok(Value::Float(DEFAULT_MISSING_VALUE)),
            None => Err(CodecError::KeyNotFound(key.to_owned())),
        },
    }
}

impl Codec for FramedCodec {
    fn decode_next(
        &self,
        stream: &mut dyn Read,
        headers_only: bool,
    ) -> CodecResult<Option<Handle>> {
        let Some(frame) = read_frame(stream)? else {
            return Ok(None);
        };
        let msg = parse_frame(&frame, headers_only)?;
        Ok(Some(self.table.lock().insert(msg)))
    }

    fn clone_handle(&self, handle: Handle) -> CodecResult<Handle> {
        let mut table = self.table.lock();
        let copy = table.msg(handle)?.clone();
        Ok(table.insert(copy))
    }

    fn get(&self, handle: Handle, key: &str, ty: KeyType) -> CodecResult<Value> {
        let table = self.table.lock();
        let value = native_get(handle, table.msg(handle)?, key)?;
        value.convert(ty).ok_or_else(|| CodecError::ValueType {
            key: key.to_owned(),
            ty,
        })
    }

    fn set(&self, handle: Handle, key: &str, value: Value) -> CodecResult<()> {
        if matches!(key, KEY_DATA_POINTS | KEY_MISSING_COUNT) {
            return Err(CodecError::ReadOnly(key.to_owned()));
        }
        self.table.lock().msg_mut(handle)?.set_field(key, value);
        Ok(())
    }

    fn get_values(&self, handle: Handle) -> CodecResult<Vec<f64>> {
        let table = self.table.lock();
        Ok(values_of(handle, table.msg(handle)?)?.to_vec())
    }

    fn set_values(&self, handle: Handle, values: &[f64]) -> CodecResult<()> {
        self.table.lock().msg_mut(handle)?.values = Some(values.to_vec());
        Ok(())
    }

    fn write(&self, handle: Handle, out: &mut dyn Write) -> CodecResult<()> {
        let table = self.table.lock();
        let msg = table.msg(handle)?;
        encode_message(&msg.fields, values_of(handle, msg)?, out)
    }

    fn release(&self, handle: Handle) -> CodecResult<()> {
        let mut table = self.table.lock();
        table
            .live
            .remove(&handle.raw())
            .ok_or(CodecError::InvalidHandle(handle.raw()))?;
        table.released += 1;
        Ok(())
    }

    fn missing_value(&self, handle: Handle) -> CodecResult<f64> {
        Ok(missing_of(self.table.lock().msg(handle)?))
    }

    fn keys_in_namespace(&self, handle: Handle, namespace: &str) -> CodecResult<Vec<String>> {
        let table = self.table.lock();
        let msg = table.msg(handle)?;
        if namespace.is_empty() {
            return Ok(msg.fields.iter().map(|(k, _)| k.clone()).collect());
        }
        let keys = NAMESPACES
            .iter()
            .find(|(name, _)| *name == namespace)
            .map(|(_, keys)| *keys)
            .unwrap_or_default();
        Ok(keys
            .iter()
            .filter(|k| msg.field(k).is_some())
            .map(|k| (*k).to_owned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn one_message(codec: &FramedCodec) -> Handle {
        let mut buf = Vec::new();
        encode_message(
            &[
                ("shortName", Value::from("t")),
                ("level", Value::Int(925)),
                ("dataDate", Value::Int(20240101)),
            ],
            &[1.0, 9999.0, 3.0],
            &mut buf,
        )
        .unwrap();
        let mut stream: &[u8] = &buf;
        codec.decode_next(&mut stream, false).unwrap().unwrap()
    }

    #[test]
    fn handle_table_lifecycle() {
        let codec = FramedCodec::new();
        let h = one_message(&codec);
        let c = codec.clone_handle(h).unwrap();
        assert_ne!(h, c);
        assert_eq!(codec.live_handles(), 2);
        codec.release(h).unwrap();
        assert!(matches!(codec.release(h), Err(CodecError::InvalidHandle(_))));
        assert_eq!(codec.get(c, "level", KeyType::Native).unwrap(), Value::Int(925));
        assert_eq!(codec.released_count(), 1);
    }

    #[test]
    fn computed_keys() {
        let codec = FramedCodec::new();
        let h = one_message(&codec);
        assert_eq!(
            codec.get(h, "numberOfDataPoints", KeyType::Native).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            codec.get(h, "numberOfMissing", KeyType::Native).unwrap(),
            Value::Int(1)
        );
        assert_eq!(codec.missing_value(h).unwrap(), DEFAULT_MISSING_VALUE);
        assert!(matches!(
            codec.set(h, "numberOfDataPoints", Value::Int(1)),
            Err(CodecError::ReadOnly(_))
        ));
    }

    #[test]
    fn namespace_iteration_follows_namespace_order() {
        let codec = FramedCodec::new();
        let h = one_message(&codec);
        assert_eq!(
            codec.keys_in_namespace(h, "ls").unwrap(),
            vec!["level", "dataDate", "shortName"]
        );
        assert_eq!(codec.keys_in_namespace(h, "time").unwrap(), vec!["dataDate"]);
        assert!(codec.keys_in_namespace(h, "nope").unwrap().is_empty());
    }

    #[test]
    fn typed_get() {
        let codec = FramedCodec::new();
        let h = one_message(&codec);
        assert_eq!(codec.get(h, "level", KeyType::Str).unwrap(), Value::from("925"));
        assert!(matches!(
            codec.get(h, "shortName", KeyType::Int),
            Err(CodecError::ValueType { .. })
        ));
        assert!(matches!(
            codec.get(h, "nope", KeyType::Native),
            Err(CodecError::KeyNotFound(k)) if k == "nope"
        ));
    }
}
