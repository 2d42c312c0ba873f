//! Archive container trait definitions.

use crate::error::StorageResult;
use std::sync::Arc;

/// Identifier of an entry inside an archive: 16 raw bytes.
///
/// The storage layer does not interpret identifiers. Higher layers assign
/// meaning (segment ids, reserved ids) to this 128-bit space.
pub type EntryId = [u8; 16];

/// Bytes of framing prepended to every entry: id (16) + length (4).
pub const ENTRY_HEADER_SIZE: u64 = 20;

/// Outcome of an append attempt against a capacity-bounded archive.
///
/// Running out of capacity is an expected outcome that callers handle as
/// ordinary control flow (roll over to a new archive), so it is a value
/// rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was appended.
    Written,
    /// The entry did not fit within the archive's capacity.
    Rejected,
}

/// An append-only, capacity-bounded container of id-keyed entries.
///
/// Archives are **opaque byte stores**. They provide lookup and append of
/// raw entries keyed by a 128-bit id. Cairn owns all entry format
/// interpretation - archives do not understand segments or journals.
///
/// # Invariants
///
/// - Entries are never overwritten in place; appending an id that already
///   exists is permitted and later entries win on read
/// - `write_entry` returns [`WriteOutcome::Rejected`] instead of growing
///   past the capacity ceiling
/// - `read_entry` returns exactly the bytes previously appended for that id
/// - Implementations must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`crate::FileArchive`] - For persistent storage
/// - [`crate::MemoryArchive`] - For testing and ephemeral stores
pub trait Archive: Send + Sync {
    /// Returns a stable label for this archive (file name or synthetic).
    fn name(&self) -> &str;

    /// Looks up an entry by id.
    ///
    /// Returns `Ok(None)` if the archive holds no entry for `id`. Absence
    /// is a normal outcome during multi-archive scans, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is closed or an I/O error occurs.
    fn read_entry(&self, id: &EntryId) -> StorageResult<Option<Vec<u8>>>;

    /// Appends an entry if `header + data` fits within the capacity ceiling.
    ///
    /// Returns [`WriteOutcome::Rejected`] when the entry would not fit,
    /// signaling the caller to roll over to a new archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is closed or the write fails.
    fn write_entry(&self, id: &EntryId, data: &[u8]) -> StorageResult<WriteOutcome>;

    /// Returns the ids of all entries currently held, in no particular order.
    ///
    /// Used by maintenance tooling; the engine itself only reads by id.
    fn entry_ids(&self) -> Vec<EntryId>;

    /// Returns the current size of the archive in bytes, framing included.
    fn size(&self) -> u64;

    /// Returns the number of distinct entry ids held.
    fn entry_count(&self) -> usize;

    /// Makes all appended entries durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium rejects the sync.
    fn flush(&self) -> StorageResult<()>;

    /// Releases any open handles. Idempotent; reads and writes after close
    /// return [`crate::StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the handle fails.
    fn close(&self) -> StorageResult<()>;
}

/// A source of archive containers: enumerates the existing ordered sequence
/// and creates new containers on demand.
///
/// This is the persistence boundary. Any medium that can enumerate
/// containers in a stable order, read and append entries by id, and create
/// a container on demand can back a segment store.
pub trait ArchiveBackend: Send + Sync {
    /// Opens all existing archives in stable (creation) order.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered archive cannot be opened.
    fn discover(&self) -> StorageResult<Vec<Arc<dyn Archive>>>;

    /// Opens or creates the archive with the given sequence index.
    ///
    /// Re-opening an existing index is permitted (a crashed or failed
    /// rollover can leave an empty container behind); creating past the
    /// end of the sequence plus one is not.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` would leave a gap in the sequence or
    /// creation fails.
    fn create(&self, index: usize) -> StorageResult<Arc<dyn Archive>>;
}
