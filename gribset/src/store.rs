//! The ownership service: codec + registry + record arena behind one lock.
//!
//! Collections and records hold an `Arc<Store>` and never address global state.
//! Every registry mutation and every codec call happens under the same
//! exclusive lock, so lifecycle operations are atomic with respect to each other.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    codec::Codec,
    error::{Error, Result},
    handle::{CollectionId, Handle, OwnerId, RecordId},
    registry::Registry,
};

/// One decoded message in the arena.
#[derive(Debug)]
struct Slot {
    handle: Handle,
    /// Live `Record` values pointing at this slot.
    retained: usize,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) registry: Registry,
    slots: HashMap<RecordId, Slot>,
    next_record: u64,
    next_collection: u64,
}

impl State {
    /// Put a freshly decoded or cloned handle into the arena. The caller must
    /// register a claim for it before releasing the lock.
    pub(crate) fn adopt(&mut self, handle: Handle) -> RecordId {
        self.next_record += 1;
        let id = RecordId(self.next_record);
        self.slots.insert(id, Slot { handle, retained: 0 });
        id
    }

    pub(crate) fn next_collection_id(&mut self) -> CollectionId {
        self.next_collection += 1;
        CollectionId(self.next_collection)
    }

    pub(crate) fn handle_of(&self, id: RecordId) -> Option<Handle> {
        self.slots.get(&id).map(|s| s.handle)
    }

    pub(crate) fn live_handle(&self, id: RecordId) -> Result<Handle> {
        self.handle_of(id).ok_or(Error::UseAfterRelease("record"))
    }

    /// Claim list for a sequence of records, skipping any already released.
    pub(crate) fn claims_for(&self, ids: &[RecordId]) -> Vec<Handle> {
        ids.iter().filter_map(|id| self.handle_of(*id)).collect()
    }

    /// Count one more `Record` value for `id` and make sure the record is a
    /// registered owner of its handle.
    pub(crate) fn retain(&mut self, id: RecordId) -> Result<Handle> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or(Error::UseAfterRelease("record"))?;
        slot.retained += 1;
        let handle = slot.handle;
        self.registry.register(OwnerId::Record(id), vec![handle]);
        Ok(handle)
    }

    /// Drop one `Record` value's claim. The last value unregisters the record
    /// owner and frees the handle if nothing else claims it.
    pub(crate) fn relinquish(&mut self, codec: &dyn Codec, id: RecordId) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        slot.retained = slot.retained.saturating_sub(1);
        if slot.retained > 0 {
            return;
        }
        let owner = OwnerId::Record(id);
        let unique = self.registry.find_unique_handles(owner);
        self.registry.unregister(owner);
        if unique.contains(&slot.handle) {
            self.free(codec, id);
        }
    }

    /// Release a collection's claims, freeing exactly its unique handles.
    /// Returns how many records were freed.
    pub(crate) fn release_collection(
        &mut self,
        codec: &dyn Codec,
        owner: CollectionId,
        ids: &[RecordId],
    ) -> usize {
        let owner = OwnerId::Collection(owner);
        let unique = self.registry.find_unique_handles(owner);
        self.registry.unregister(owner);

        let mut freed = 0;
        let distinct: BTreeSet<RecordId> = ids.iter().copied().collect();
        for id in distinct {
            if self
                .handle_of(id)
                .is_some_and(|handle| unique.contains(&handle))
            {
                self.free(codec, id);
                freed += 1;
            }
        }
        freed
    }

    fn free(&mut self, codec: &dyn Codec, id: RecordId) {
        let Some(slot) = self.slots.remove(&id) else {
            return;
        };
        if let Err(e) = codec.release(slot.handle) {
            warn!(
                record = ?id,
                handle = %slot.handle,
                error = %e,
                "codec failed to release handle"
            );
        }
    }
}

/// Shared-ownership service instance. Create one per codec and hand clones of
/// the `Arc` to every collection and record.
pub struct Store {
    codec: Arc<dyn Codec>,
    state: Mutex<State>,
}

impl Store {
    pub fn new(codec: Arc<dyn Codec>) -> Arc<Self> {
        Arc::new(Self {
            codec,
            state: Mutex::new(State::default()),
        })
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    /// Run `f` against the live handle of `id` while holding the lock.
    pub(crate) fn with_handle<T>(
        &self,
        id: RecordId,
        f: impl FnOnce(&dyn Codec, Handle) -> Result<T>,
    ) -> Result<T> {
        let state = self.lock();
        let handle = state.live_handle(id)?;
        f(self.codec(), handle)
    }

    /// Number of registered owners (collections + independently held records).
    pub fn owner_count(&self) -> usize {
        self.lock().registry.len()
    }

    pub fn collection_count(&self) -> usize {
        self.lock().registry.collection_count()
    }

    pub fn record_owner_count(&self) -> usize {
        self.lock().registry.record_count()
    }

    /// Records whose handles have not been released yet.
    pub fn live_records(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn claims(&self, owner: OwnerId) -> Option<Vec<Handle>> {
        self.lock().registry.claims(owner).map(<[Handle]>::to_vec)
    }

    pub fn find_unique_handles(&self, owner: OwnerId) -> BTreeSet<Handle> {
        self.lock().registry.find_unique_handles(owner)
    }

    /// Whether two `Arc`s point at the same store.
    pub(crate) fn same(a: &Arc<Store>, b: &Arc<Store>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Store")
            .field("collections", &state.registry.collection_count())
            .field("records", &state.registry.record_count())
            .field("live", &state.slots.len())
            .finish()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Only reachable with slots left if an owner was leaked (mem::forget).
        let state = self.state.get_mut();
        if state.slots.is_empty() {
            return;
        }
        debug!(count = state.slots.len(), "releasing orphaned records");
        for (_, slot) in state.slots.drain() {
            if let Err(e) = self.codec.release(slot.handle) {
                warn!(handle = %slot.handle, error = %e, "codec failed to release handle");
            }
        }
    }
}
