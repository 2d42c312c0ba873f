//! Named journals and the persisted journal table.

use crate::error::{CoreError, CoreResult};
use crate::types::{RecordId, SegmentId};
use cairn_storage::Archive;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Magic value opening every journal snapshot entry (`b"CairnJRN"`,
/// big-endian). Distinct from the segment magic so the two entry kinds can
/// never be confused.
pub const JOURNAL_MAGIC: u64 = 0x4361_6972_6e4a_524e;

/// Name of the distinguished bootstrap journal.
pub const ROOT_JOURNAL: &str = "root";

/// A named, mutable pointer to a head record.
///
/// Journals model an evolving snapshot lineage: the head advances in
/// memory as new states are written, and the whole table is persisted only
/// on an explicit flush.
#[derive(Debug)]
pub struct Journal {
    name: String,
    head: RwLock<RecordId>,
}

impl Journal {
    fn new(name: impl Into<String>, head: RecordId) -> Self {
        Self {
            name: name.into(),
            head: RwLock::new(head),
        }
    }

    /// Returns the journal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current head record.
    #[must_use]
    pub fn head(&self) -> RecordId {
        *self.head.read()
    }

    /// Advances the head to a new record.
    pub fn set_head(&self, head: RecordId) {
        *self.head.write() = head;
    }
}

/// The in-memory name → journal table.
///
/// Hydrated once at store startup from the newest persisted snapshot and
/// mutated in memory afterwards; persistence happens only when the store
/// is explicitly asked to flush.
#[derive(Debug, Default)]
pub struct JournalTable {
    journals: RwLock<HashMap<String, Arc<Journal>>>,
}

impl JournalTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the table from the snapshot entries found in `archives`.
    ///
    /// Archives are scanned in discovery order and every snapshot found is
    /// decoded (validating it structurally); the last one wins, since later
    /// archives are newer. Finding no snapshot at all leaves the table
    /// empty - a fresh store, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalCorruption`] if any snapshot entry is
    /// structurally invalid, or a storage error if a read fails.
    pub fn hydrate(&self, archives: &[Arc<dyn Archive>]) -> CoreResult<()> {
        for archive in archives {
            let Some(data) = archive.read_entry(SegmentId::NIL.as_bytes())? else {
                continue;
            };
            let entries = Self::decode_snapshot(&data)?;

            let mut journals = self.journals.write();
            journals.clear();
            for (name, head) in entries {
                journals.insert(name.clone(), Arc::new(Journal::new(name, head)));
            }
        }
        Ok(())
    }

    /// Creates the "root" journal bound to `default_root` if it does not
    /// exist after hydration.
    pub fn ensure_root(&self, default_root: RecordId) {
        let mut journals = self.journals.write();
        journals
            .entry(ROOT_JOURNAL.to_string())
            .or_insert_with(|| Arc::new(Journal::new(ROOT_JOURNAL, default_root)));
    }

    /// Returns the journal with the given name, creating it if absent.
    ///
    /// A newly created journal starts at the current head of the "root"
    /// journal. Creation is atomic: concurrent callers asking for the same
    /// new name observe a single journal instance.
    pub fn get(&self, name: &str) -> Arc<Journal> {
        if let Some(journal) = self.journals.read().get(name) {
            return Arc::clone(journal);
        }

        let mut journals = self.journals.write();
        if let Some(journal) = journals.get(name) {
            // Another caller created it between our locks.
            return Arc::clone(journal);
        }

        let initial = journals
            .get(ROOT_JOURNAL)
            .map(|root| root.head())
            .unwrap_or(RecordId::NULL);
        let journal = Arc::new(Journal::new(name, initial));
        journals.insert(name.to_string(), Arc::clone(&journal));
        journal
    }

    /// Returns whether a journal with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.journals.read().contains_key(name)
    }

    /// Returns the number of journals in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.journals.read().len()
    }

    /// Returns whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journals.read().is_empty()
    }

    /// Returns the current name → head pairs.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, RecordId)> {
        self.journals
            .read()
            .iter()
            .map(|(name, journal)| (name.clone(), journal.head()))
            .collect()
    }

    /// Serializes the full table as one snapshot blob.
    ///
    /// Layout (big-endian):
    /// `magic (8) | journal count (4) | repeated { name length (4) |
    /// name utf8 | head segment id (16) | head offset (4) }`.
    ///
    /// Every snapshot is a complete replacement of the table, never a
    /// delta.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        let journals = self.journals.read();

        let mut size = 8 + 4;
        for name in journals.keys() {
            size += 4 + name.len() + 16 + 4;
        }

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&JOURNAL_MAGIC.to_be_bytes());
        buf.extend_from_slice(&(journals.len() as u32).to_be_bytes());
        for (name, journal) in journals.iter() {
            let head = journal.head();
            buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(head.segment_id.as_bytes());
            buf.extend_from_slice(&head.offset.to_be_bytes());
        }

        buf
    }

    /// Decodes a snapshot blob into name → head pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalCorruption`] on bad magic, truncated
    /// fields, or invalid UTF-8 in a journal name.
    pub fn decode_snapshot(data: &[u8]) -> CoreResult<Vec<(String, RecordId)>> {
        if data.len() < 12 {
            return Err(CoreError::journal_corruption("snapshot shorter than header"));
        }

        let magic = u64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]);
        if magic != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "bad journal magic: {magic:#018x}"
            )));
        }

        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
        let mut cursor = 12;
        let mut entries = Vec::with_capacity(count);

        for _ in 0..count {
            if cursor + 4 > data.len() {
                return Err(CoreError::journal_corruption("snapshot too short"));
            }
            let name_len = u32::from_be_bytes([
                data[cursor],
                data[cursor + 1],
                data[cursor + 2],
                data[cursor + 3],
            ]) as usize;
            cursor += 4;

            if cursor + name_len + 20 > data.len() {
                return Err(CoreError::journal_corruption("snapshot too short"));
            }
            let name = std::str::from_utf8(&data[cursor..cursor + name_len])
                .map_err(|_| CoreError::journal_corruption("journal name is not UTF-8"))?
                .to_string();
            cursor += name_len;

            let segment_id = SegmentId::from_slice(&data[cursor..cursor + 16])
                .ok_or_else(|| CoreError::journal_corruption("unreadable head segment id"))?;
            cursor += 16;

            let offset = u32::from_be_bytes([
                data[cursor],
                data[cursor + 1],
                data[cursor + 2],
                data[cursor + 3],
            ]);
            cursor += 4;

            entries.push((name, RecordId::new(segment_id, offset)));
        }

        if cursor != data.len() {
            return Err(CoreError::journal_corruption("trailing bytes in snapshot"));
        }

        Ok(entries)
    }
}
