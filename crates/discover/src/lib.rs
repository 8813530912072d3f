//! Client for the dataset discover service.
//!
//! The discover service owns the catalogue of published datasets. A
//! rehydration needs three lookups from it: the dataset's source location,
//! the file listing of a version, and the versioned source of each file.

mod client;
mod error;
mod memory;
mod types;

pub use client::{discover_host, DiscoverClient, DiscoverSettings, HttpDiscoverClient};
pub use error::DiscoverError;
pub use memory::MemoryDiscoverClient;
pub use types::{DatasetFile, DatasetFileEntry, DatasetInfo, DatasetMetadata, ObjectUri};
