#![allow(dead_code)]

use std::{fs, path::PathBuf, sync::Arc};

use gribset::{Store, Value, codec::frame::encode_message, codec::framed::FramedCodec};
use tempfile::TempDir;

pub const SHORT_NAMES: [&str; 4] = ["t", "z", "u", "v"];
pub const LEVELS: [i64; 4] = [1000, 925, 850, 500];
pub const POINTS: usize = 16;

/// Fields of the `i`-th fixture message.
pub fn fields(i: usize) -> Vec<(&'static str, Value)> {
    vec![
        ("edition", Value::Int(2)),
        ("centre", Value::from("ecmf")),
        ("typeOfLevel", Value::from("isobaricInhPa")),
        ("level", Value::Int(LEVELS[(i / 4) % 4])),
        ("dataDate", Value::Int(20240101 + (i / 16) as i64)),
        ("dataTime", Value::Int(1200)),
        ("stepRange", Value::from("0")),
        ("shortName", Value::from(SHORT_NAMES[i % 4])),
        ("packingType", Value::from("grid_simple")),
        ("gridType", Value::from("regular_ll")),
        ("index", Value::Int(i as i64)),
    ]
}

pub fn values(i: usize) -> Vec<f64> {
    (0..POINTS).map(|p| (i * 100 + p) as f64 / 4.0).collect()
}

pub fn encode_n(n: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..n {
        encode_message(&fields(i), &values(i), &mut buf).unwrap();
    }
    buf
}

/// Temp dir holding `sample.msg` with `n` messages.
pub fn fixture(n: usize) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.msg");
    fs::write(&path, encode_n(n)).unwrap();
    (dir, path)
}

pub fn store() -> (Arc<FramedCodec>, Arc<Store>) {
    let codec = Arc::new(FramedCodec::new());
    let store = Store::new(codec.clone());
    (codec, store)
}
