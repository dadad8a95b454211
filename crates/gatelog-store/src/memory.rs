use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use gatelog_types::Generation;

use crate::error::StoreResult;
use crate::traits::{ObjectStore, Precondition, StoredObject, WriteOutcome};

struct Inner {
    objects: HashMap<String, StoredObject>,
    next_generation: Generation,
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and single-process runs. All objects live behind one
/// `RwLock`, so each conditional write checks and commits under the same
/// exclusive guard. Generations are drawn from one store-wide counter, the
/// way GCS hands them out.
pub struct InMemoryObjectStore {
    bucket: String,
    inner: RwLock<Inner>,
}

impl InMemoryObjectStore {
    /// Create a new empty store for the named bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            inner: RwLock::new(Inner {
                objects: HashMap::new(),
                next_generation: Generation::first(),
            }),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").objects.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of all object names.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("lock poisoned");
        let mut names: Vec<String> = inner.objects.keys().cloned().collect();
        names.sort();
        names
    }

    fn commit(inner: &mut Inner, name: &str, data: Bytes) -> Generation {
        let generation = inner.next_generation;
        inner.next_generation = generation.next();
        inner
            .objects
            .insert(name.to_string(), StoredObject { data, generation });
        generation
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn read(&self, name: &str) -> StoreResult<Option<StoredObject>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.objects.get(name).cloned())
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.objects.contains_key(name))
    }

    async fn write_if(
        &self,
        name: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> StoreResult<WriteOutcome> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let current = inner.objects.get(name).map(|obj| obj.generation);
        if !precondition.holds(current) {
            return Ok(WriteOutcome::Conflict);
        }
        Ok(WriteOutcome::Committed(Self::commit(&mut inner, name, data)))
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<Generation> {
        let mut inner = self.inner.write().expect("lock poisoned");
        Ok(Self::commit(&mut inner, name, data))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .finish()
    }
}
