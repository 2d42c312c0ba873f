//! In-memory archive containers for testing and ephemeral stores.

use crate::archive::{Archive, ArchiveBackend, EntryId, WriteOutcome, ENTRY_HEADER_SIZE};
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory archive container.
///
/// Behaves like [`crate::FileArchive`] - same capacity accounting, same
/// framing overhead per entry - but keeps everything in a map. Suitable
/// for unit tests and stores that do not need persistence.
#[derive(Debug)]
pub struct MemoryArchive {
    name: String,
    capacity: u64,
    inner: RwLock<MemoryEntries>,
}

#[derive(Debug)]
struct MemoryEntries {
    closed: bool,
    size: u64,
    entries: HashMap<EntryId, Vec<u8>>,
}

impl MemoryArchive {
    /// Creates a new empty in-memory archive.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            inner: RwLock::new(MemoryEntries {
                closed: false,
                size: 0,
                entries: HashMap::new(),
            }),
        }
    }
}

impl Archive for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_entry(&self, id: &EntryId) -> StorageResult<Option<Vec<u8>>> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(StorageError::Closed);
        }
        Ok(inner.entries.get(id).cloned())
    }

    fn write_entry(&self, id: &EntryId, data: &[u8]) -> StorageResult<WriteOutcome> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(StorageError::Closed);
        }

        let needed = ENTRY_HEADER_SIZE + data.len() as u64;
        if inner.size + needed > self.capacity {
            return Ok(WriteOutcome::Rejected);
        }

        inner.size += needed;
        inner.entries.insert(*id, data.to_vec());
        Ok(WriteOutcome::Written)
    }

    fn entry_ids(&self) -> Vec<EntryId> {
        self.inner.read().entries.keys().copied().collect()
    }

    fn size(&self) -> u64 {
        self.inner.read().size
    }

    fn entry_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing buffered; entries are already "durable" for the lifetime
        // of the process.
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.inner.write().closed = true;
        Ok(())
    }
}

/// An [`ArchiveBackend`] that fabricates in-memory archives.
///
/// Created archives are remembered so that a later [`ArchiveBackend::discover`]
/// returns them in creation order, mirroring how the file backend re-finds
/// archives in a directory.
#[derive(Debug)]
pub struct MemoryArchiveBackend {
    capacity: u64,
    archives: Mutex<Vec<Arc<MemoryArchive>>>,
}

impl MemoryArchiveBackend {
    /// Creates a backend whose archives use the given capacity ceiling.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            archives: Mutex::new(Vec::new()),
        }
    }
}

impl ArchiveBackend for MemoryArchiveBackend {
    fn discover(&self) -> StorageResult<Vec<Arc<dyn Archive>>> {
        let archives = self.archives.lock();
        Ok(archives
            .iter()
            .map(|a| Arc::clone(a) as Arc<dyn Archive>)
            .collect())
    }

    fn create(&self, index: usize) -> StorageResult<Arc<dyn Archive>> {
        let mut archives = self.archives.lock();
        if index < archives.len() {
            // A failed rollover can leave the container behind; hand the
            // existing instance back, entries intact.
            return Ok(Arc::clone(&archives[index]) as Arc<dyn Archive>);
        }
        if index > archives.len() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("archive index {index} would leave a gap in the sequence"),
            )));
        }

        let archive = Arc::new(MemoryArchive::new(format!("mem{index:05}"), self.capacity));
        archives.push(Arc::clone(&archive));
        Ok(archive)
    }
}
