//! Vector storage: the exact in-memory index, its on-disk store, and the
//! optional LanceDB collection used as an external document store.
pub mod flat;
pub mod store;

#[cfg(feature = "lancedb")]
pub mod lance;

pub use flat::FlatIndex;
pub use store::{IndexManifest, IndexStore, StoredIndex};

#[cfg(feature = "lancedb")]
pub use lance::LanceStore;
