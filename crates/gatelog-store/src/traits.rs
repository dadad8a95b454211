use async_trait::async_trait;
use bytes::Bytes;
use gatelog_types::Generation;

use crate::error::{StoreError, StoreResult};

/// One revision of an object: its full content and the generation it was
/// written at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub generation: Generation,
}

impl StoredObject {
    pub fn new(data: impl Into<Bytes>, generation: Generation) -> Self {
        Self {
            data: data.into(),
            generation,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Condition a write must satisfy to be accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Accept only if no object exists under the name.
    DoesNotExist,
    /// Accept only if the current generation equals this one.
    GenerationMatch(Generation),
}

impl Precondition {
    /// The precondition that guards a read-modify-write of `current`.
    pub fn after_read(current: Option<&StoredObject>) -> Self {
        match current {
            Some(obj) => Self::GenerationMatch(obj.generation),
            None => Self::DoesNotExist,
        }
    }

    /// Returns `true` if an object currently at `current` satisfies this.
    pub fn holds(&self, current: Option<Generation>) -> bool {
        match (self, current) {
            (Self::DoesNotExist, None) => true,
            (Self::GenerationMatch(want), Some(have)) => *want == have,
            _ => false,
        }
    }

    /// Value of the GCS `ifGenerationMatch` parameter; `0` means "absent".
    pub fn if_generation_match(&self) -> u64 {
        match self {
            Self::DoesNotExist => 0,
            Self::GenerationMatch(g) => g.get(),
        }
    }
}

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed; the object is now at this generation.
    Committed(Generation),
    /// The precondition no longer held. Nothing was written.
    Conflict,
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// A bucket of versioned objects supporting conditional writes.
///
/// All implementations must satisfy these invariants:
/// - `write_if` is atomic: the whole new content lands or nothing changes.
/// - A write whose precondition fails returns `Ok(WriteOutcome::Conflict)`
///   and never modifies the object.
/// - Each committed write yields a generation greater than any previous
///   generation of the same object.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store addresses, used in audit records.
    fn bucket(&self) -> &str;

    /// Read an object's content and generation.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    async fn read(&self, name: &str) -> StoreResult<Option<StoredObject>>;

    /// Check whether an object exists.
    async fn exists(&self, name: &str) -> StoreResult<bool>;

    /// Replace an object's content if `precondition` holds.
    async fn write_if(
        &self,
        name: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> StoreResult<WriteOutcome>;

    /// Replace an object's content unconditionally.
    async fn put(&self, name: &str, data: Bytes) -> StoreResult<Generation>;
}

/// Reject names that are empty or that could escape a path-based namespace.
pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name.starts_with('/')
        || name.contains('\0')
        || name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
