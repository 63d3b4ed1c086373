//! Vector index: exact cosine search in memory, persisted as LanceDB
//! generations behind an atomically swapped manifest.

pub mod index;
pub mod lock;
pub mod manifest;
pub mod schema;
pub mod store;

pub use index::{IndexSpec, VectorIndex};
pub use lock::WriteGuard;
pub use manifest::Manifest;
pub use store::IndexStore;
