use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    codec::Codec,
    config::DisplayConfig,
    error::{Error, Result},
    handle::{Handle, RecordId},
    store::Store,
    table,
    value::{KeyType, MaskedArray, Value},
};

/// Key the codec consults to honour a data mask on reserialization.
pub const BITMAP_PRESENT: &str = "bitmapPresent";

/// A client reference to one decoded message.
///
/// Obtained from [`Collection::get`](crate::Collection::get), iteration, or
/// [`Record::deep_clone`]; there is no public constructor from a raw handle.
/// Each value is an independent claim on the message: dropping it (or calling
/// [`release`](Record::release)) frees the handle only when no collection or
/// other record still claims it.
pub struct Record {
    store: Arc<Store>,
    id: RecordId,
    handle: Handle,
    loaded: bool,
}

impl Record {
    /// Wrap a slot that has already been retained for this value.
    pub(crate) fn retained(store: Arc<Store>, id: RecordId, handle: Handle) -> Self {
        Self {
            store,
            id,
            handle,
            loaded: true,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn with_codec<T>(&self, f: impl FnOnce(&dyn Codec, Handle) -> Result<T>) -> Result<T> {
        if !self.loaded {
            return Err(Error::UseAfterRelease("record"));
        }
        self.store.with_handle(self.id, f)
    }

    /// Read a field in its native type.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.get_as(key, KeyType::Native)
    }

    /// Read a field decoded as `ty`.
    pub fn get_as(&self, key: &str, ty: KeyType) -> Result<Value> {
        self.with_codec(|codec, h| Ok(codec.get(h, key, ty)?))
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with_codec(|codec, h| codec.set(h, key, value).map_err(Error::Codec))
    }

    /// Data points, masked wherever they equal the record's missing-value sentinel.
    pub fn values(&self) -> Result<MaskedArray> {
        self.with_codec(|codec, h| {
            let data = codec.get_values(h).map_err(Error::Codec)?;
            let missing = codec.missing_value(h).map_err(Error::Codec)?;
            Ok(MaskedArray::masked_values(data, missing))
        })
    }

    /// Write data points back. Masked positions are filled with the
    /// missing-value sentinel and the bitmap flag is set so the mask survives
    /// reserialization.
    pub fn set_values(&self, values: &MaskedArray) -> Result<()> {
        self.with_codec(|codec, h| {
            if values.any_masked() {
                let missing = codec.missing_value(h).map_err(Error::Codec)?;
                codec
                    .set_values(h, &values.filled(missing))
                    .map_err(Error::Codec)?;
                codec
                    .set(h, BITMAP_PRESENT, Value::Int(1))
                    .map_err(Error::Codec)
            } else {
                codec.set_values(h, values.data()).map_err(Error::Codec)
            }
        })
    }

    /// Deep copy under a new codec handle, registered as its own owner.
    pub fn deep_clone(&self) -> Result<Record> {
        if !self.loaded {
            return Err(Error::UseAfterRelease("record"));
        }
        let mut state = self.store.lock();
        let source = state.live_handle(self.id)?;
        let handle = self
            .store
            .codec()
            .clone_handle(source)
            .map_err(Error::Codec)?;
        let id = state.adopt(handle);
        state.retain(id)?;
        drop(state);
        debug!(from = %source, to = %handle, "cloned record");
        Ok(Record::retained(self.store.clone(), id, handle))
    }

    /// The record's serialized bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.with_codec(|codec, h| {
            let mut out = Vec::new();
            codec.write(h, &mut out).map_err(Error::Codec)?;
            Ok(out)
        })
    }

    /// Read several fields at once, in order.
    pub fn fields<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<(String, Value)>> {
        self.with_codec(|codec, h| {
            keys.iter()
                .map(|k| -> Result<(String, Value)> {
                    let k = k.as_ref();
                    Ok((k.to_owned(), codec.get(h, k, KeyType::Native)?))
                })
                .collect()
        })
    }

    /// Keys the codec lists in `namespace` for this record.
    pub fn namespace_keys(&self, namespace: &str) -> Result<Vec<String>> {
        self.with_codec(|codec, h| Ok(codec.keys_in_namespace(h, namespace)?))
    }

    /// One-row table of this record's fields.
    pub fn render(&self, cfg: &DisplayConfig) -> Result<String> {
        let keys = match cfg.namespace.as_deref() {
            Some(ns) => self.namespace_keys(ns)?,
            None => cfg.keys.clone(),
        };
        let row: Vec<String> = self
            .fields(&keys)?
            .into_iter()
            .map(|(_, v)| v.to_string())
            .collect();
        Ok(table::format_table(&keys, &[row], None))
    }

    /// Relinquish this value's claim. Idempotent.
    pub fn release(&mut self) {
        if !self.loaded {
            return;
        }
        let mut state = self.store.lock();
        state.relinquish(self.store.codec(), self.id);
        self.loaded = false;
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        self.release();
    }
}
