//! File-based archive containers for persistent storage.

use crate::archive::{Archive, ArchiveBackend, EntryId, WriteOutcome, ENTRY_HEADER_SIZE};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Returns the file name of the archive with the given sequence index,
/// e.g. `data00000`, `data00001`, ...
#[must_use]
pub fn archive_file_name(index: usize) -> String {
    format!("data{index:05}")
}

/// A file-backed archive container.
///
/// Entries are appended as `id (16) | length (4, big-endian) | bytes` and
/// never rewritten. An in-memory id index is rebuilt by a single forward
/// scan when the file is opened; if the same id occurs twice, the later
/// entry wins.
///
/// # Durability
///
/// `write_entry` hands the bytes to the OS; [`Archive::flush`] syncs file
/// data to the medium.
///
/// # Thread Safety
///
/// The archive is thread-safe. File position is guarded by an internal
/// lock, so lookups serialize briefly around the seek-and-read.
#[derive(Debug)]
pub struct FileArchive {
    name: String,
    capacity: u64,
    inner: RwLock<ArchiveFile>,
}

#[derive(Debug)]
struct ArchiveFile {
    /// `None` once the archive has been closed.
    file: Option<File>,
    size: u64,
    index: HashMap<EntryId, (u64, u32)>,
}

impl FileArchive {
    /// Opens an existing archive file or creates an empty one.
    ///
    /// Opening scans the file once to rebuild the entry index. A torn
    /// trailing entry (an append interrupted mid-write) is truncated away
    /// so the archive stays appendable; every whole entry before it is
    /// preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is inaccessible or the scan fails.
    pub fn open(path: &Path, capacity: u64) -> StorageResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let mut index = HashMap::new();
        let mut offset = 0u64;
        let mut header = [0u8; ENTRY_HEADER_SIZE as usize];

        file.seek(SeekFrom::Start(0))?;
        while offset < len {
            if offset + ENTRY_HEADER_SIZE > len {
                break;
            }
            file.read_exact(&mut header)?;

            let mut id: EntryId = [0u8; 16];
            id.copy_from_slice(&header[..16]);
            let data_len = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);

            let end = offset + ENTRY_HEADER_SIZE + u64::from(data_len);
            if end > len {
                break;
            }

            index.insert(id, (offset + ENTRY_HEADER_SIZE, data_len));
            offset = end;
            file.seek(SeekFrom::Start(offset))?;
        }

        if offset < len {
            // Torn trailing entry; drop it and keep the archive appendable.
            file.set_len(offset)?;
        }

        Ok(Self {
            name,
            capacity,
            inner: RwLock::new(ArchiveFile {
                file: Some(file),
                size: offset,
                index,
            }),
        })
    }

    /// Returns the capacity ceiling in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl Archive for FileArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_entry(&self, id: &EntryId) -> StorageResult<Option<Vec<u8>>> {
        // Write lock: the seek mutates the shared file position.
        let mut inner = self.inner.write();

        let Some(&(offset, len)) = inner.index.get(id) else {
            return Ok(None);
        };

        let file = inner.file.as_mut().ok_or(StorageError::Closed)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data)?;

        Ok(Some(data))
    }

    fn write_entry(&self, id: &EntryId, data: &[u8]) -> StorageResult<WriteOutcome> {
        let mut inner = self.inner.write();

        let needed = ENTRY_HEADER_SIZE + data.len() as u64;
        if inner.size + needed > self.capacity {
            return Ok(WriteOutcome::Rejected);
        }

        let offset = inner.size;
        let file = inner.file.as_mut().ok_or(StorageError::Closed)?;

        // One contiguous buffer so the entry lands in a single write.
        let mut entry = Vec::with_capacity(needed as usize);
        entry.extend_from_slice(id);
        entry.extend_from_slice(&(data.len() as u32).to_be_bytes());
        entry.extend_from_slice(data);

        file.seek(SeekFrom::End(0))?;
        file.write_all(&entry)?;

        inner.size = offset + needed;
        inner
            .index
            .insert(*id, (offset + ENTRY_HEADER_SIZE, data.len() as u32));

        Ok(WriteOutcome::Written)
    }

    fn entry_ids(&self) -> Vec<EntryId> {
        self.inner.read().index.keys().copied().collect()
    }

    fn size(&self) -> u64 {
        self.inner.read().size
    }

    fn entry_count(&self) -> usize {
        self.inner.read().index.len()
    }

    fn flush(&self) -> StorageResult<()> {
        let inner = self.inner.read();
        let file = inner.file.as_ref().ok_or(StorageError::Closed)?;
        file.sync_data()?;
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner.file = None;
        Ok(())
    }
}

/// An [`ArchiveBackend`] that keeps numbered archive files in a directory.
///
/// Archives are named `data00000`, `data00001`, ... with no gaps permitted;
/// discovery stops at the first missing index.
#[derive(Debug)]
pub struct FileArchiveBackend {
    directory: PathBuf,
    capacity: u64,
}

impl FileArchiveBackend {
    /// Creates a backend rooted at `directory` with the given per-archive
    /// capacity ceiling. The directory is created lazily on first use.
    pub fn new(directory: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            directory: directory.into(),
            capacity,
        }
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ArchiveBackend for FileArchiveBackend {
    fn discover(&self) -> StorageResult<Vec<Arc<dyn Archive>>> {
        std::fs::create_dir_all(&self.directory)?;

        let mut archives: Vec<Arc<dyn Archive>> = Vec::new();
        for index in 0.. {
            let path = self.directory.join(archive_file_name(index));
            if !path.is_file() {
                break;
            }
            archives.push(Arc::new(FileArchive::open(&path, self.capacity)?));
        }

        Ok(archives)
    }

    fn create(&self, index: usize) -> StorageResult<Arc<dyn Archive>> {
        std::fs::create_dir_all(&self.directory)?;

        if index > 0 {
            let previous = self.directory.join(archive_file_name(index - 1));
            if !previous.is_file() {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("archive index {index} would leave a gap in the sequence"),
                )));
            }
        }

        let path = self.directory.join(archive_file_name(index));
        Ok(Arc::new(FileArchive::open(&path, self.capacity)?))
    }
}
