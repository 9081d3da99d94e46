//! Ordered groups of records sharing ownership through the store's registry.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Read, Write},
    ops::{Add, Bound, Mul, Range, RangeBounds, RangeFull},
    path::Path,
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    config::DisplayConfig,
    error::{Error, Result},
    handle::{CollectionId, Handle, OwnerId, RecordId},
    record::Record,
    store::Store,
    table,
    value::{KeyType, Value},
};

/// What to do with the records already decoded when a file fails partway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SalvageMode {
    /// Release everything decoded so far and return the error.
    #[default]
    Conservative,
    /// Keep and register the records decoded before the failure; the error is
    /// available from [`Collection::decode_error`].
    BestEffort,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Ask the codec to skip data payloads.
    pub headers_only: bool,
    pub salvage: SalvageMode,
}

impl OpenOptions {
    pub fn headers_only(mut self, yes: bool) -> Self {
        self.headers_only = yes;
        self
    }

    pub fn salvage(mut self, mode: SalvageMode) -> Self {
        self.salvage = mode;
        self
    }
}

/// Dynamic index shape for [`Collection::select`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// One position; negative counts from the end.
    At(isize),
    /// Python-style slice bounds, clamped to the collection.
    Span {
        start: Option<isize>,
        end: Option<isize>,
    },
    /// A bare field name. Not a valid collection index on its own.
    Key(String),
    /// A field read off the record(s) picked by the inner selector.
    Field(Box<Selector>, String),
}

impl Selector {
    pub fn span(start: Option<isize>, end: Option<isize>) -> Self {
        Selector::Span { start, end }
    }

    /// Read `key` off whatever `self` selects.
    pub fn key(self, key: impl Into<String>) -> Self {
        Selector::Field(Box::new(self), key.into())
    }
}

impl From<isize> for Selector {
    fn from(i: isize) -> Self {
        Selector::At(i)
    }
}

impl From<Range<isize>> for Selector {
    fn from(r: Range<isize>) -> Self {
        Selector::span(Some(r.start), Some(r.end))
    }
}

impl From<RangeFull> for Selector {
    fn from(_: RangeFull) -> Self {
        Selector::span(None, None)
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Selector::Key(key.to_owned())
    }
}

/// Result of [`Collection::select`].
#[derive(Debug)]
pub enum Selection {
    Record(Record),
    Collection(Collection),
    Value(Value),
    Values(Vec<Value>),
}

impl Selection {
    pub fn into_record(self) -> Option<Record> {
        match self {
            Selection::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Selection::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Selection::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Selection::Values(v) => Some(v),
            _ => None,
        }
    }
}

/// An ordered sequence of records, possibly overlapping with other collections.
///
/// Slicing, concatenation, repetition and filtering never copy messages: the
/// new collection references the same records and registers its own claim.
/// Releasing (explicitly, via [`scoped`](Collection::scoped), or on drop) frees
/// only the handles no other owner still claims.
pub struct Collection {
    store: Arc<Store>,
    id: CollectionId,
    records: Vec<RecordId>,
    released: bool,
    decode_error: Option<Error>,
}

impl Collection {
    /// Decode every message in `path`.
    pub fn open(store: &Arc<Store>, path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(store, path, OpenOptions::default())
    }

    pub fn open_with(
        store: &Arc<Store>,
        path: impl AsRef<Path>,
        opts: OpenOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let stream = store
            .codec()
            .open(path)
            .map_err(|e| Error::from_open(path.to_path_buf(), e))?;
        let coll = Self::read_from(store, stream, opts)?;
        debug!(path = %path.display(), records = coll.len(), "found records");
        Ok(coll)
    }

    /// Decode every message from an already open stream.
    pub fn read_from(
        store: &Arc<Store>,
        mut reader: impl Read,
        opts: OpenOptions,
    ) -> Result<Self> {
        let codec = store.codec();
        let mut state = store.lock();
        let id = state.next_collection_id();
        let mut records = Vec::new();
        let mut failure = None;
        loop {
            match codec.decode_next(&mut reader, opts.headers_only) {
                Ok(Some(handle)) => records.push(state.adopt(handle)),
                Ok(None) => break,
                Err(e) => {
                    failure = Some(Error::from(e));
                    break;
                }
            }
        }
        let claims = state.claims_for(&records);
        state.registry.register(OwnerId::Collection(id), claims);
        drop(state);

        let mut coll = Self {
            store: store.clone(),
            id,
            records,
            released: false,
            decode_error: None,
        };
        match (failure, opts.salvage) {
            (None, _) => Ok(coll),
            (Some(e), SalvageMode::Conservative) => {
                coll.release();
                Err(e)
            }
            (Some(e), SalvageMode::BestEffort) => {
                warn!(
                    records = coll.len(),
                    error = %e,
                    "decode failed, keeping records read so far"
                );
                coll.decode_error = Some(e);
                Ok(coll)
            }
        }
    }

    /// Wrap existing records without decoding anything.
    ///
    /// Every record must come from `store` and still be loaded.
    pub fn from_records<'a>(
        store: &Arc<Store>,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> Result<Self> {
        let mut ids = Vec::new();
        for rec in records {
            if !Store::same(store, rec.store()) {
                return Err(Error::TypeMismatch(
                    "record belongs to a different store".into(),
                ));
            }
            if !rec.is_loaded() {
                return Err(Error::UseAfterRelease("record"));
            }
            ids.push(rec.id());
        }
        Ok(Self::from_ids(store, ids))
    }

    fn from_ids(store: &Arc<Store>, records: Vec<RecordId>) -> Self {
        let mut state = store.lock();
        let id = state.next_collection_id();
        let claims = state.claims_for(&records);
        state.registry.register(OwnerId::Collection(id), claims);
        drop(state);
        Self {
            store: store.clone(),
            id,
            records,
            released: false,
            decode_error: None,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Holds records and has not been released.
    pub fn is_loaded(&self) -> bool {
        !self.released && !self.records.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn record_ids(&self) -> &[RecordId] {
        &self.records
    }

    /// Live handles in sequence order.
    pub fn handles(&self) -> Vec<Handle> {
        self.store.lock().claims_for(&self.records)
    }

    /// The error that cut a [`SalvageMode::BestEffort`] open short, if any.
    pub fn decode_error(&self) -> Option<&Error> {
        self.decode_error.as_ref()
    }

    fn resolve(&self, index: isize) -> Result<RecordId> {
        let len = self.records.len();
        let pos = if index < 0 {
            len as isize + index
        } else {
            index
        };
        if pos < 0 || pos as usize >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(self.records[pos as usize])
    }

    fn span(&self, start: Option<isize>, end: Option<isize>) -> Range<usize> {
        let len = self.records.len();
        let clamp = |i: isize| {
            if i < 0 {
                (len as isize + i).max(0) as usize
            } else {
                (i as usize).min(len)
            }
        };
        let start = start.map_or(0, clamp);
        let end = end.map_or(len, clamp).max(start);
        start..end
    }

    /// The record at `index`, registered as an independent owner so it stays
    /// valid after this collection is released.
    pub fn get(&self, index: isize) -> Result<Record> {
        let id = self.resolve(index)?;
        let handle = self.store.lock().retain(id)?;
        Ok(Record::retained(self.store.clone(), id, handle))
    }

    /// A new collection over the same records in `range` (clamped).
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Collection {
        let len = self.records.len();
        let start = match range.start_bound() {
            Bound::Included(s) => *s,
            Bound::Excluded(s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(e) => e.saturating_add(1),
            Bound::Excluded(e) => *e,
            Bound::Unbounded => len,
        }
        .clamp(start, len);
        Self::from_ids(&self.store, self.records[start..end].to_vec())
    }

    /// Like [`slice`](Collection::slice) with Python-style negative bounds.
    pub fn slice_span(&self, start: Option<isize>, end: Option<isize>) -> Collection {
        let range = self.span(start, end);
        Self::from_ids(&self.store, self.records[range].to_vec())
    }

    fn read_key(&self, ids: &[RecordId], key: &str) -> Result<Vec<Value>> {
        let state = self.store.lock();
        let codec = self.store.codec();
        ids.iter()
            .map(|id| -> Result<Value> {
                let handle = state.live_handle(*id)?;
                Ok(codec.get(handle, key, KeyType::Native)?)
            })
            .collect()
    }

    /// `key` of the record at `index`, without taking a record claim.
    pub fn field(&self, index: isize, key: &str) -> Result<Value> {
        let id = self.resolve(index)?;
        self.store
            .with_handle(id, |codec, h| Ok(codec.get(h, key, KeyType::Native)?))
    }

    /// `key` of every record in `start..end` (Python-style bounds), in order.
    pub fn slice_field(
        &self,
        start: Option<isize>,
        end: Option<isize>,
        key: &str,
    ) -> Result<Vec<Value>> {
        let range = self.span(start, end);
        self.read_key(&self.records[range], key)
    }

    /// Index by a dynamic selector. Unsupported shapes fail with `TypeMismatch`.
    pub fn select(&self, selector: &Selector) -> Result<Selection> {
        match selector {
            Selector::At(i) => Ok(Selection::Record(self.get(*i)?)),
            Selector::Span { start, end } => {
                Ok(Selection::Collection(self.slice_span(*start, *end)))
            }
            Selector::Field(inner, key) => match inner.as_ref() {
                Selector::At(i) => Ok(Selection::Value(self.field(*i, key)?)),
                Selector::Span { start, end } => {
                    Ok(Selection::Values(self.slice_field(*start, *end, key)?))
                }
                other => Err(Error::TypeMismatch(format!(
                    "cannot read a field through selector {other:?}"
                ))),
            },
            Selector::Key(key) => Err(Error::TypeMismatch(format!(
                "unsupported index '{key}': expected a position or a slice, optionally with a key"
            ))),
        }
    }

    /// Records in order, each an independent claim.
    pub fn iter(&self) -> impl Iterator<Item = Result<Record>> + '_ {
        (0..self.records.len()).map(move |i| self.get(i as isize))
    }

    /// Concatenation over shared records.
    pub fn concat(&self, other: &Collection) -> Result<Collection> {
        if !Store::same(&self.store, &other.store) {
            return Err(Error::TypeMismatch(
                "cannot concatenate collections from different stores".into(),
            ));
        }
        let mut ids = Vec::with_capacity(self.len() + other.len());
        ids.extend_from_slice(&self.records);
        ids.extend_from_slice(&other.records);
        Ok(Self::from_ids(&self.store, ids))
    }

    /// The same record references repeated `n` times.
    pub fn repeat(&self, n: usize) -> Collection {
        Self::from_ids(&self.store, self.records.repeat(n))
    }

    /// Records where every `(key, value)` pair matches. Lookup failures propagate.
    pub fn filter<K: AsRef<str>>(&self, criteria: &[(K, Value)]) -> Result<Collection> {
        let kept = {
            let state = self.store.lock();
            let codec = self.store.codec();
            let mut kept = Vec::new();
            'records: for id in &self.records {
                let handle = state.live_handle(*id)?;
                for (key, expected) in criteria {
                    if codec.get(handle, key.as_ref(), KeyType::Native)? != *expected {
                        continue 'records;
                    }
                }
                kept.push(*id);
            }
            kept
        };
        Ok(Self::from_ids(&self.store, kept))
    }

    /// Write every record, in order, to `path` (truncating it).
    ///
    /// All records are encoded before `path` is opened, so a record the codec
    /// cannot write leaves an existing file untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.released {
            return Err(Error::UseAfterRelease("collection"));
        }
        let path = path.as_ref();
        let mut encoded = Vec::new();
        {
            let state = self.store.lock();
            let codec = self.store.codec();
            for id in &self.records {
                let handle = state.live_handle(*id)?;
                codec.write(handle, &mut encoded).map_err(Error::Codec)?;
            }
        }

        let io_err = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
        out.write_all(&encoded).map_err(io_err)?;
        out.flush().map_err(io_err)?;
        debug!(path = %path.display(), records = self.len(), "saved collection");
        Ok(())
    }

    /// Tabulate the records per `cfg`.
    pub fn render(&self, cfg: &DisplayConfig) -> Result<String> {
        let state = self.store.lock();
        let codec = self.store.codec();
        let keys = match (cfg.namespace.as_deref(), self.records.first()) {
            (Some(ns), Some(first)) => {
                codec.keys_in_namespace(state.live_handle(*first)?, ns)?
            }
            (Some(_), None) => Vec::new(),
            (None, _) => cfg.keys.clone(),
        };
        let rows = self
            .records
            .iter()
            .map(|id| -> Result<Vec<String>> {
                let handle = state.live_handle(*id)?;
                keys.iter()
                    .map(|k| -> Result<String> {
                        Ok(codec.get(handle, k, KeyType::Native)?.to_string())
                    })
                    .collect()
            })
            .collect::<Result<Vec<_>>>()?;
        drop(state);
        Ok(table::format_table(&keys, &rows, cfg.max_rows))
    }

    /// Run `f`, then release, however `f` exits.
    pub fn scoped<R>(mut self, f: impl FnOnce(&Collection) -> R) -> R {
        let out = f(&self);
        self.release();
        out
    }

    /// Release this collection's claim, freeing every record no other owner
    /// still claims. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let records = std::mem::take(&mut self.records);
        let freed = self
            .store
            .lock()
            .release_collection(self.store.codec(), self.id, &records);
        debug!(
            collection = ?self.id,
            records = records.len(),
            released = freed,
            "released collection"
        );
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.id)
            .field("len", &self.records.len())
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        self.release();
    }
}

impl Add<&Collection> for &Collection {
    type Output = Result<Collection>;

    fn add(self, rhs: &Collection) -> Self::Output {
        self.concat(rhs)
    }
}

impl Mul<usize> for &Collection {
    type Output = Collection;

    fn mul(self, n: usize) -> Collection {
        self.repeat(n)
    }
}
