use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use gatelog_types::Generation;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_name, ObjectStore, Precondition, StoredObject, WriteOutcome};

const OBJECTS_DIR: &str = "objects";
const GENERATIONS_DIR: &str = "generations";

/// Object store backed by a local directory.
///
/// Layout under `root`:
///
/// - `objects/<name>` holds the content
/// - `generations/<name>` holds the decimal generation
///
/// Both files are replaced by atomic rename. Conditional writes are
/// serialized by an in-process lock, so the precondition check is only
/// sound when a single process owns the directory.
pub struct FsObjectStore {
    bucket: String,
    root: PathBuf,
    lock: Mutex<()>,
}

impl FsObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(bucket: impl Into<String>, root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(OBJECTS_DIR))?;
        std::fs::create_dir_all(root.join(GENERATIONS_DIR))?;
        Ok(Self {
            bucket: bucket.into(),
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        (
            self.root.join(OBJECTS_DIR).join(name),
            self.root.join(GENERATIONS_DIR).join(name),
        )
    }

    async fn blocking<T, F>(f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn current(&self, name: &str) -> StoreResult<Option<StoredObject>> {
        let (data_path, gen_path) = self.paths(name);
        let objects = self.root.join(OBJECTS_DIR);
        let name = name.to_string();
        Self::blocking(move || {
            if !object_present(&objects, &data_path)? {
                return Ok(None);
            }
            read_pair(&name, &data_path, &gen_path)
        })
        .await
    }

    async fn commit(&self, name: &str, data: Bytes, next: Generation) -> StoreResult<Generation> {
        let (data_path, gen_path) = self.paths(name);
        Self::blocking(move || {
            replace_file(&data_path, &data)?;
            replace_file(&gen_path, next.to_string().as_bytes())?;
            Ok(next)
        })
        .await
    }
}

/// Whether `path` names a stored object under `objects`.
///
/// A missing file is `Ok(false)`, and so is a path whose parent is itself an
/// object file (`a.txt/b`), which the OS reports as "not a directory".
fn object_present(objects: &Path, path: &Path) -> std::io::Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            let shadowed = path
                .ancestors()
                .skip(1)
                .take_while(|dir| dir.starts_with(objects) && *dir != objects)
                .any(Path::is_file);
            if shadowed {
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

fn read_pair(name: &str, data_path: &Path, gen_path: &Path) -> StoreResult<Option<StoredObject>> {
    let data = match std::fs::read(data_path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let raw = std::fs::read_to_string(gen_path)?;
    let generation = raw.parse::<Generation>().map_err(|e| StoreError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some(StoredObject::new(data, generation)))
}

fn replace_file(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidName(path.display().to_string()))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn read(&self, name: &str) -> StoreResult<Option<StoredObject>> {
        if validate_name(name).is_err() {
            return Ok(None);
        }
        let _guard = self.lock.lock().await;
        self.current(name).await
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        if validate_name(name).is_err() {
            return Ok(false);
        }
        let (data_path, _) = self.paths(name);
        let objects = self.root.join(OBJECTS_DIR);
        Self::blocking(move || Ok(object_present(&objects, &data_path)?)).await
    }

    async fn write_if(
        &self,
        name: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> StoreResult<WriteOutcome> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;
        let current = self.current(name).await?.map(|obj| obj.generation);
        if !precondition.holds(current) {
            debug!(name, ?precondition, ?current, "conditional write rejected");
            return Ok(WriteOutcome::Conflict);
        }
        let next = current.map_or(Generation::first(), Generation::next);
        Ok(WriteOutcome::Committed(self.commit(name, data, next).await?))
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<Generation> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;
        let current = self.current(name).await?.map(|obj| obj.generation);
        let next = current.map_or(Generation::first(), Generation::next);
        self.commit(name, data, next).await
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("bucket", &self.bucket)
            .field("root", &self.root)
            .finish()
    }
}
