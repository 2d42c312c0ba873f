//! The segment store: archive ownership, allocation, and journals.

use crate::cache::SegmentCache;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalTable};
use crate::segment::{AuxTables, Segment};
use crate::types::{RecordId, SegmentId};
use cairn_storage::{
    Archive, ArchiveBackend, FileArchiveBackend, MemoryArchiveBackend, WriteOutcome,
};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The top-level segment storage engine.
///
/// A store owns an ordered, append-only sequence of archive containers, a
/// bounded segment cache, and the journal table. Segments are immutable
/// once written; journals are named mutable pointers persisted on explicit
/// flush.
///
/// # Lifecycle
///
/// A store moves from empty (no containers) through open to closed. There
/// is no way back from closed; construct a fresh instance to reopen a
/// directory.
///
/// # Concurrency
///
/// Mutating operations (segment creation, journal creation, snapshot
/// flushes, archive rollover) serialize behind one allocation lock; the
/// append position and the container list must change together. Reads stay
/// lock-free apart from the cache's per-id load coordination, because
/// containers are immutable once appended and the container list only
/// grows at its tail.
pub struct SegmentStore {
    config: Config,
    directory: Option<PathBuf>,
    backend: Box<dyn ArchiveBackend>,
    archives: RwLock<Vec<Arc<dyn Archive>>>,
    cache: SegmentCache,
    journals: JournalTable,
    /// Serializes every mutation of the append position and container list.
    allocation: Mutex<()>,
    is_open: RwLock<bool>,
}

impl SegmentStore {
    /// Opens a store in `directory` with default configuration.
    ///
    /// Existing archives are discovered by probing `data00000`,
    /// `data00001`, ... until the first missing index; journals are
    /// hydrated from the newest persisted snapshot; a "root" journal bound
    /// to `default_root` is created if none was persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered archive cannot be opened or a
    /// persisted journal snapshot is structurally invalid.
    pub fn open(directory: &Path, default_root: RecordId) -> CoreResult<Self> {
        Self::open_with_config(directory, default_root, Config::default())
    }

    /// Opens a store in `directory` with custom configuration.
    ///
    /// # Errors
    ///
    /// See [`SegmentStore::open`].
    pub fn open_with_config(
        directory: &Path,
        default_root: RecordId,
        config: Config,
    ) -> CoreResult<Self> {
        let backend = FileArchiveBackend::new(directory, config.archive_capacity);
        Self::init(
            Box::new(backend),
            Some(directory.to_path_buf()),
            default_root,
            config,
        )
    }

    /// Opens an ephemeral in-memory store, mainly for tests.
    ///
    /// # Errors
    ///
    /// Never fails for the in-memory backend; the signature matches the
    /// persistent constructors.
    pub fn open_in_memory(default_root: RecordId) -> CoreResult<Self> {
        let config = Config::default();
        let backend = MemoryArchiveBackend::new(config.archive_capacity);
        Self::init(Box::new(backend), None, default_root, config)
    }

    /// Opens a store over an arbitrary archive backend.
    ///
    /// Any backend that can enumerate containers in a stable order, read
    /// and append entries by id, and create containers on demand can back
    /// a store.
    ///
    /// # Errors
    ///
    /// See [`SegmentStore::open`].
    pub fn open_with_backend(
        backend: Box<dyn ArchiveBackend>,
        default_root: RecordId,
        config: Config,
    ) -> CoreResult<Self> {
        Self::init(backend, None, default_root, config)
    }

    fn init(
        backend: Box<dyn ArchiveBackend>,
        directory: Option<PathBuf>,
        default_root: RecordId,
        config: Config,
    ) -> CoreResult<Self> {
        let archives = backend.discover()?;

        let journals = JournalTable::new();
        journals.hydrate(&archives)?;
        journals.ensure_root(default_root);

        info!(
            archives = archives.len(),
            journals = journals.len(),
            "segment store opened"
        );

        Ok(Self {
            cache: SegmentCache::new(config.cache_capacity),
            config,
            directory,
            backend,
            archives: RwLock::new(archives),
            journals,
            allocation: Mutex::new(()),
            is_open: RwLock::new(true),
        })
    }

    /// Reads the segment with the given id.
    ///
    /// Served from the cache when possible; on a miss the archives are
    /// scanned in discovery order and the first entry found is decoded and
    /// cached. Segments loaded this way carry empty auxiliary tables.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentNotFound`] if no archive holds `id`,
    /// [`CoreError::SegmentCorruption`] if the stored entry is invalid, or
    /// [`CoreError::StoreClosed`] after close.
    pub fn read_segment(&self, id: SegmentId) -> CoreResult<Arc<Segment>> {
        self.check_open()?;

        self.cache.get_or_load(id, || {
            // A slightly stale snapshot of the list is fine: entries are
            // immutable and the list only grows at its tail.
            let archives = self.archives.read().clone();
            for archive in &archives {
                if let Some(data) = archive.read_entry(id.as_bytes())? {
                    return Segment::decode(id, &data);
                }
            }
            Err(CoreError::SegmentNotFound { id })
        })
    }

    /// Creates a new segment and makes it durable.
    ///
    /// The segment is serialized into one archive entry and appended to
    /// the newest container, rolling over to a new container when capacity
    /// is exhausted. On success the fully populated in-memory segment -
    /// auxiliary tables included - is placed in the cache, so reads within
    /// this process see the authoritative instance without a disk round
    /// trip.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if `id` is the reserved
    /// all-zero id or the entry exceeds the archive capacity, or a storage
    /// error if the append fails. The write either becomes durable or an
    /// error is returned; there is no silent drop.
    pub fn create_segment(
        &self,
        id: SegmentId,
        payload: &[u8],
        referenced_ids: &[SegmentId],
        tables: AuxTables,
    ) -> CoreResult<Arc<Segment>> {
        self.check_open()?;

        if id.is_nil() {
            return Err(CoreError::invariant_violation(
                "the all-zero id is reserved for the journal snapshot",
            ));
        }

        let segment = Segment::new(id, payload.to_vec(), referenced_ids.to_vec(), tables);
        let entry = segment.encode();
        let segment = Arc::new(segment);

        let _guard = self.allocation.lock();
        self.append_entry(id, &entry)?;
        self.cache.put(id, Arc::clone(&segment));

        Ok(segment)
    }

    /// Appends an entry to the newest archive, rolling over once if it is
    /// full. Callers must hold the allocation lock.
    fn append_entry(&self, id: SegmentId, entry: &[u8]) -> CoreResult<()> {
        let newest = self.archives.read().last().cloned();
        if let Some(archive) = newest {
            if archive.write_entry(id.as_bytes(), entry)? == WriteOutcome::Written {
                if self.config.sync_on_write {
                    archive.flush()?;
                }
                return Ok(());
            }
        }

        // Roll over. A new archive starts below its capacity, so a second
        // rejection can only mean the entry itself cannot fit.
        let index = self.archives.read().len();
        let archive = self.backend.create(index)?;
        debug!(archive = archive.name(), "rolled over to new archive");

        match archive.write_entry(id.as_bytes(), entry)? {
            WriteOutcome::Written => {
                if self.config.sync_on_write {
                    archive.flush()?;
                }
                self.archives.write().push(archive);
                Ok(())
            }
            WriteOutcome::Rejected => Err(CoreError::invariant_violation(format!(
                "entry of {} bytes exceeds the archive capacity of {} bytes",
                entry.len(),
                self.config.archive_capacity
            ))),
        }
    }

    /// Returns the journal with the given name, creating it if absent.
    ///
    /// A newly created journal starts at the current head of the "root"
    /// journal; creation is serialized with the other mutating operations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] after close.
    pub fn journal(&self, name: &str) -> CoreResult<Arc<Journal>> {
        self.check_open()?;

        if self.journals.contains(name) {
            return Ok(self.journals.get(name));
        }

        let _guard = self.allocation.lock();
        Ok(self.journals.get(name))
    }

    /// Persists the journal table as a complete snapshot entry.
    ///
    /// Flushing is explicit: head advances are in-memory only until a
    /// caller decides to persist them.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the append fails, or
    /// [`CoreError::StoreClosed`] after close.
    pub fn flush_journals(&self) -> CoreResult<()> {
        self.check_open()?;

        let _guard = self.allocation.lock();
        let snapshot = self.journals.snapshot();
        self.append_entry(SegmentId::NIL, &snapshot)?;

        debug!(journals = self.journals.len(), "journal snapshot flushed");
        Ok(())
    }

    /// Segment deletion is not supported by this engine.
    ///
    /// There is no online reclamation path: deleted-but-unreferenced
    /// segments stay in their archives until an offline rewrite rebuilds
    /// the container set from reachable segments. The explicit error keeps
    /// callers from assuming space was reclaimed.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::Unsupported`].
    pub fn delete_segment(&self, _id: SegmentId) -> CoreResult<()> {
        self.check_open()?;
        Err(CoreError::unsupported("segment deletion"))
    }

    /// Closes the store: archives are closed in discovery order and the
    /// cache is invalidated. Idempotent; any other operation after close
    /// returns [`CoreError::StoreClosed`].
    ///
    /// # Errors
    ///
    /// Returns the first error encountered while closing an archive.
    pub fn close(&self) -> CoreResult<()> {
        {
            let mut is_open = self.is_open.write();
            if !*is_open {
                return Ok(());
            }
            *is_open = false;
        }

        for archive in self.archives.read().iter() {
            archive.close()?;
        }
        self.cache.invalidate_all();

        info!("segment store closed");
        Ok(())
    }

    /// Returns the number of archive containers currently owned.
    #[must_use]
    pub fn archive_count(&self) -> usize {
        self.archives.read().len()
    }

    /// Returns the number of decoded segments currently cached.
    #[must_use]
    pub fn cached_segments(&self) -> usize {
        self.cache.len()
    }

    /// Returns the current journal name → head pairs.
    #[must_use]
    pub fn journal_entries(&self) -> Vec<(String, RecordId)> {
        self.journals.entries()
    }

    /// Returns the store directory, if this store is file-backed.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    fn check_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::StoreClosed)
        }
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("directory", &self.directory)
            .field("archives", &self.archive_count())
            .field("cached_segments", &self.cached_segments())
            .field("journals", &self.journals.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::ROOT_JOURNAL;
    use cairn_storage::archive_file_name;
    use std::thread;
    use tempfile::tempdir;

    fn sample_id(byte: u8) -> SegmentId {
        SegmentId::from_bytes([byte; 16])
    }

    fn sample_root() -> RecordId {
        RecordId::new(sample_id(0xAA), 4)
    }

    #[test]
    fn empty_store_bootstraps_root_journal() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();

        let entries = store.journal_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, ROOT_JOURNAL);
        assert_eq!(entries[0].1, sample_root());

        // No containers exist until the first segment is created.
        assert_eq!(store.archive_count(), 0);
    }

    #[test]
    fn first_create_makes_first_archive() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open(dir.path(), RecordId::NULL).unwrap();

        assert!(!dir.path().join(archive_file_name(0)).exists());

        store
            .create_segment(sample_id(1), b"payload", &[], AuxTables::new())
            .unwrap();

        assert!(dir.path().join(archive_file_name(0)).is_file());
        assert_eq!(store.archive_count(), 1);
    }

    #[test]
    fn write_then_read_sees_authoritative_segment() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();
        let id = sample_id(1);
        let referenced = vec![sample_id(2), sample_id(3)];

        let mut tables = AuxTables::new();
        tables
            .strings
            .insert("interned".to_string(), RecordId::new(id, 0));

        store
            .create_segment(id, b"bytes", &referenced, tables)
            .unwrap();

        let segment = store.read_segment(id).unwrap();
        assert_eq!(segment.id(), id);
        assert_eq!(segment.payload(), b"bytes");
        assert_eq!(segment.referenced_ids(), referenced.as_slice());
        // Served from the cache, the write-path instance keeps its tables.
        assert_eq!(segment.string_record("interned"), Some(RecordId::new(id, 0)));
    }

    #[test]
    fn reload_after_eviction_loses_aux_tables() {
        let config = Config::default().cache_capacity(1).archive_capacity(4096);
        let backend = MemoryArchiveBackend::new(config.archive_capacity);
        let store =
            SegmentStore::open_with_backend(Box::new(backend), sample_root(), config).unwrap();

        let id = sample_id(1);
        let mut tables = AuxTables::new();
        tables
            .strings
            .insert("interned".to_string(), RecordId::new(id, 0));
        store.create_segment(id, b"bytes", &[sample_id(2)], tables).unwrap();

        // Evict the first segment by caching a second one.
        store
            .create_segment(sample_id(9), b"other", &[], AuxTables::new())
            .unwrap();
        assert_eq!(store.cached_segments(), 1);

        let reloaded = store.read_segment(id).unwrap();
        assert_eq!(reloaded.payload(), b"bytes");
        assert_eq!(reloaded.referenced_ids(), &[sample_id(2)]);
        // The entry format does not carry aux tables; a disk reload cannot
        // recover them.
        assert_eq!(reloaded.string_record("interned"), None);
        assert!(reloaded.aux_tables_empty());
    }

    #[test]
    fn rollover_keeps_all_segments_readable() {
        let config = Config::default().archive_capacity(256);
        let backend = MemoryArchiveBackend::new(config.archive_capacity);
        let store =
            SegmentStore::open_with_backend(Box::new(backend), sample_root(), config).unwrap();

        // Each entry is 20 (framing) + 32 (header) + 64 (payload) bytes;
        // three of them cannot share one 256-byte archive.
        let payload = [7u8; 64];
        for byte in 1..=3u8 {
            store
                .create_segment(sample_id(byte), &payload, &[], AuxTables::new())
                .unwrap();
        }

        assert!(store.archive_count() >= 2);
        for byte in 1..=3u8 {
            let segment = store.read_segment(sample_id(byte)).unwrap();
            assert_eq!(segment.payload(), &payload);
        }
    }

    #[test]
    fn journal_table_survives_reopen() {
        let dir = tempdir().unwrap();
        let root_head = RecordId::new(sample_id(1), 0);

        {
            let store = SegmentStore::open(dir.path(), RecordId::NULL).unwrap();
            store
                .create_segment(sample_id(1), b"state", &[], AuxTables::new())
                .unwrap();

            store.journal(ROOT_JOURNAL).unwrap().set_head(root_head);
            store
                .journal("checkpoints")
                .unwrap()
                .set_head(RecordId::new(sample_id(1), 2));

            store.flush_journals().unwrap();
            store.close().unwrap();
        }

        let store = SegmentStore::open(dir.path(), RecordId::NULL).unwrap();
        let mut entries = store.journal_entries();
        entries.sort();

        assert_eq!(
            entries,
            vec![
                ("checkpoints".to_string(), RecordId::new(sample_id(1), 2)),
                (ROOT_JOURNAL.to_string(), root_head),
            ]
        );
    }

    #[test]
    fn newest_snapshot_wins_across_archives() {
        let dir = tempdir().unwrap();
        let config = Config::default().archive_capacity(256);

        {
            let store =
                SegmentStore::open_with_config(dir.path(), RecordId::NULL, config.clone()).unwrap();
            store
                .journal(ROOT_JOURNAL)
                .unwrap()
                .set_head(RecordId::new(sample_id(1), 0));
            store.flush_journals().unwrap();

            // Fill past the first archive so the second flush lands in a
            // newer container.
            store
                .create_segment(sample_id(2), &[0u8; 64], &[], AuxTables::new())
                .unwrap();
            store
                .create_segment(sample_id(3), &[0u8; 64], &[], AuxTables::new())
                .unwrap();

            store
                .journal(ROOT_JOURNAL)
                .unwrap()
                .set_head(RecordId::new(sample_id(9), 8));
            store.flush_journals().unwrap();
            assert!(store.archive_count() >= 2);
            store.close().unwrap();
        }

        let store = SegmentStore::open_with_config(dir.path(), RecordId::NULL, config).unwrap();
        let head = store.journal(ROOT_JOURNAL).unwrap().head();
        assert_eq!(head, RecordId::new(sample_id(9), 8));
    }

    #[test]
    fn new_journal_adopts_current_root_head() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();

        store
            .journal(ROOT_JOURNAL)
            .unwrap()
            .set_head(RecordId::new(sample_id(5), 12));

        let journal = store.journal("replica").unwrap();
        assert_eq!(journal.head(), RecordId::new(sample_id(5), 12));
    }

    #[test]
    fn reference_chain_survives_reopen() {
        let dir = tempdir().unwrap();
        let (a, b) = (sample_id(1), sample_id(2));

        {
            let store = SegmentStore::open(dir.path(), RecordId::NULL).unwrap();
            store.create_segment(a, b"segment a", &[], AuxTables::new()).unwrap();
            store
                .create_segment(b, b"segment b", &[a], AuxTables::new())
                .unwrap();
            store.close().unwrap();
        }

        let store = SegmentStore::open(dir.path(), RecordId::NULL).unwrap();
        let segment_b = store.read_segment(b).unwrap();
        assert_eq!(segment_b.referenced_ids(), &[a]);
        assert_eq!(store.read_segment(a).unwrap().payload(), b"segment a");
    }

    #[test]
    fn unknown_segment_is_not_found() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();

        let error = store.read_segment(sample_id(42)).unwrap_err();
        assert!(matches!(error.root(), CoreError::SegmentNotFound { .. }));
    }

    #[test]
    fn concurrent_creates_stay_independent() {
        let store = Arc::new(SegmentStore::open_in_memory(sample_root()).unwrap());

        let handles: Vec<_> = (1..=8u8)
            .map(|byte| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let payload = vec![byte; 128];
                    store
                        .create_segment(sample_id(byte), &payload, &[], AuxTables::new())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for byte in 1..=8u8 {
            let segment = store.read_segment(sample_id(byte)).unwrap();
            assert_eq!(segment.payload(), vec![byte; 128].as_slice());
        }
    }

    #[test]
    fn reserved_id_is_rejected() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();

        let error = store
            .create_segment(SegmentId::NIL, b"x", &[], AuxTables::new())
            .unwrap_err();
        assert!(matches!(error, CoreError::InvariantViolation { .. }));
    }

    #[test]
    fn oversized_entry_is_an_invariant_violation() {
        let config = Config::default().archive_capacity(64);
        let backend = MemoryArchiveBackend::new(config.archive_capacity);
        let store =
            SegmentStore::open_with_backend(Box::new(backend), sample_root(), config).unwrap();

        let error = store
            .create_segment(sample_id(1), &[0u8; 256], &[], AuxTables::new())
            .unwrap_err();
        assert!(matches!(error, CoreError::InvariantViolation { .. }));

        // The store stays usable for well-formed entries.
        store
            .create_segment(sample_id(2), b"ok", &[], AuxTables::new())
            .unwrap();
    }

    #[test]
    fn delete_segment_is_unsupported() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();

        let error = store.delete_segment(sample_id(1)).unwrap_err();
        assert!(matches!(error, CoreError::Unsupported { .. }));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let store = SegmentStore::open_in_memory(sample_root()).unwrap();
        store
            .create_segment(sample_id(1), b"x", &[], AuxTables::new())
            .unwrap();

        store.close().unwrap();
        store.close().unwrap();
        assert_eq!(store.cached_segments(), 0);

        assert!(matches!(
            store.read_segment(sample_id(1)),
            Err(CoreError::StoreClosed)
        ));
        assert!(matches!(
            store.create_segment(sample_id(2), b"y", &[], AuxTables::new()),
            Err(CoreError::StoreClosed)
        ));
        assert!(matches!(store.journal("any"), Err(CoreError::StoreClosed)));
        assert!(matches!(store.flush_journals(), Err(CoreError::StoreClosed)));
    }
}
