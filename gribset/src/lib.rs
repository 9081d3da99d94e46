//! Shared-ownership collections over a handle-based message codec.
//!
//! A [`Collection`] is decoded from a file through a [`codec::Codec`]; slicing,
//! concatenating, repeating or filtering it yields new collections over the
//! *same* records. The [`Store`] tracks which owner claims which handle and
//! frees a handle only once its last claimant lets go.

pub mod codec;
pub mod collection;
pub mod config;
pub mod error;
pub mod handle;
pub mod record;
pub mod registry;
pub mod store;
pub mod table;
pub mod value;

pub use collection::{Collection, OpenOptions, SalvageMode, Selection, Selector};
pub use config::DisplayConfig;
pub use error::{Error, Result};
pub use handle::{CollectionId, Handle, OwnerId, RecordId};
pub use record::Record;
pub use store::Store;
pub use value::{KeyType, MaskedArray, Value};
