//! Foundation types for gatelog.
//!
//! Shared by the object store, the file server, and the audit pipeline.
//!
//! # Key Types
//!
//! - [`Generation`]: Store-assigned version token used for conditional writes
//! - [`join_prefix`]: Namespace prefix plus file name, as an object name
//! - [`AccessDecision`]: The outcome of one file-server request
//! - [`AuditRecord`]: A decision plus its request context, emitted once per request
//! - [`CountryDenylist`]: Exact-match set of client-declared countries to reject

pub mod audit;
pub mod country;
pub mod error;
pub mod object;

pub use audit::{AccessDecision, AuditRecord, MISSING_FILENAME, OBJECT_MISSING};
pub use country::{CountryDenylist, DEFAULT_FORBIDDEN_COUNTRIES};
pub use error::TypeError;
pub use object::{join_prefix, Generation};
