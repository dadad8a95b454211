//! Versioned object storage for gatelog.
//!
//! Objects are opaque byte blobs addressed by name inside one bucket. Every
//! revision carries a store-assigned [`Generation`](gatelog_types::Generation),
//! and writes may be made conditional on it. That conditional write is the
//! only coordination primitive the audit log relies on.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and single-process runs
//! - [`FsObjectStore`] -- one file per object under a local directory
//! - [`GcsObjectStore`] -- Google Cloud Storage JSON API over HTTP
//!
//! # Design Rules
//!
//! 1. A conditional write either lands in full or changes nothing.
//! 2. A lost race is not an error: it is reported as [`WriteOutcome::Conflict`].
//! 3. Generations only ever increase for a given object name.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod gcs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use gcs::{GcsConfig, GcsObjectStore};
pub use memory::InMemoryObjectStore;
pub use traits::{ObjectStore, Precondition, StoredObject, WriteOutcome};
