//! Identifier types used by the codec boundary and the ownership ledger.

use core::fmt;

/// Opaque token for one codec-allocated message.
///
/// The codec hands these out; nothing in this crate owns one by value. Whether a
/// handle may be released is decided by the [`Registry`](crate::registry::Registry).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Wrap a raw codec token. Only codec implementations should need this.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Stable arena index of a record slot inside a [`Store`](crate::store::Store).
/// Never reused for the lifetime of the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub(crate) u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub(crate) u64);

/// A registry entry key. Collections and independently retrieved records are
/// tracked in separate ledgers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OwnerId {
    Collection(CollectionId),
    Record(RecordId),
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(CollectionId(id)) => write!(f, "collection#{id}"),
            Self::Record(RecordId(id)) => write!(f, "record#{id}"),
        }
    }
}
