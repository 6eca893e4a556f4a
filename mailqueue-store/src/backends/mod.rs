//! Blob store implementations
//!
//! - `memory`: in-process map, for tests and single-process deployments
//! - `disk`: one file per blob under a spool directory
//! - `test`: memory store with failure injection and call counting

pub mod disk;
pub mod memory;

pub use disk::{DiskBlobStore, DiskBlobStoreBuilder};
pub use memory::MemoryBlobStore;
pub use test::TestBlobStore;
