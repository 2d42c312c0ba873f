//! CLI command implementations.

pub mod inspect;
pub mod journals;
pub mod verify;

use cairn_core::{Config, JournalTable, RecordId, SegmentId};
use cairn_storage::{Archive, ArchiveBackend, FileArchiveBackend};
use std::path::Path;
use std::sync::Arc;

/// Opens the archives under `path` in discovery order.
pub(crate) fn discover_archives(
    path: &Path,
) -> Result<Vec<Arc<dyn Archive>>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("no store found at {}", path.display()).into());
    }
    let backend = FileArchiveBackend::new(path, Config::default().archive_capacity);
    Ok(backend.discover()?)
}

/// Returns the journal entries from the newest persisted snapshot, if any.
pub(crate) fn newest_journal_snapshot(
    archives: &[Arc<dyn Archive>],
) -> Result<Option<Vec<(String, RecordId)>>, Box<dyn std::error::Error>> {
    let mut newest = None;
    for archive in archives {
        if let Some(data) = archive.read_entry(SegmentId::NIL.as_bytes())? {
            newest = Some(JournalTable::decode_snapshot(&data)?);
        }
    }
    Ok(newest)
}
