//! Shared-ownership ledger.
//!
//! Every live collection and every independently retrieved record registers the
//! handles it claims. A handle may be released only when the releasing owner is
//! its sole claimant; [`Registry::find_unique_handles`] answers exactly that.

use std::collections::{BTreeMap, BTreeSet};

use crate::handle::{CollectionId, Handle, OwnerId, RecordId};

/// Owner -> claimed handles. Collections and records are kept in separate
/// ledgers; a collection's claim list is a multiset (repetition duplicates it).
#[derive(Debug, Default)]
pub struct Registry {
    collections: BTreeMap<CollectionId, Vec<Handle>>,
    records: BTreeMap<RecordId, Vec<Handle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner`'s claims, replacing whatever it claimed before.
    pub fn register(&mut self, owner: OwnerId, handles: Vec<Handle>) {
        match owner {
            OwnerId::Collection(id) => {
                self.collections.insert(id, handles);
            }
            OwnerId::Record(id) => {
                self.records.insert(id, handles);
            }
        }
    }

    /// Drop `owner`'s entry. Absent owners are ignored.
    pub fn unregister(&mut self, owner: OwnerId) {
        match owner {
            OwnerId::Collection(id) => {
                self.collections.remove(&id);
            }
            OwnerId::Record(id) => {
                self.records.remove(&id);
            }
        }
    }

    pub fn claims(&self, owner: OwnerId) -> Option<&[Handle]> {
        let claims = match owner {
            OwnerId::Collection(id) => self.collections.get(&id),
            OwnerId::Record(id) => self.records.get(&id),
        };
        claims.map(Vec::as_slice)
    }

    pub fn contains(&self, owner: OwnerId) -> bool {
        self.claims(owner).is_some()
    }

    fn entries(&self) -> impl Iterator<Item = (OwnerId, &[Handle])> {
        let cols = self
            .collections
            .iter()
            .map(|(id, hs)| (OwnerId::Collection(*id), hs.as_slice()));
        let recs = self
            .records
            .iter()
            .map(|(id, hs)| (OwnerId::Record(*id), hs.as_slice()));
        cols.chain(recs)
    }

    /// Handles claimed by `owner` that no *other* owner claims.
    ///
    /// Duplicates inside `owner`'s own list never count as sharing. An owner
    /// with no entry has nothing unique.
    pub fn find_unique_handles(&self, owner: OwnerId) -> BTreeSet<Handle> {
        let Some(mine) = self.claims(owner) else {
            return BTreeSet::new();
        };
        let others: BTreeSet<Handle> = self
            .entries()
            .filter(|(id, _)| *id != owner)
            .flat_map(|(_, hs)| hs.iter().copied())
            .collect();
        mine.iter().copied().filter(|h| !others.contains(h)).collect()
    }

    /// Whether any owner at all lists `handle`.
    pub fn is_claimed(&self, handle: Handle) -> bool {
        self.entries().any(|(_, hs)| hs.contains(&handle))
    }

    /// Union of every claim.
    pub fn all_handles(&self) -> BTreeSet<Handle> {
        self.entries()
            .flat_map(|(_, hs)| hs.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len() + self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
