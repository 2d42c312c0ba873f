//! Verify command implementation.

use cairn_core::{JournalTable, Segment, SegmentId};
use cairn_storage::Archive;
use std::path::Path;
use tracing::info;

use super::discover_archives;

/// Runs the verify command: decodes every entry in every archive and
/// reports structural corruption.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let archives = discover_archives(path)?;

    let mut checked = 0usize;
    let mut corrupt = 0usize;

    for archive in &archives {
        info!(archive = archive.name(), "verifying archive");

        for id in archive.entry_ids() {
            let Some(data) = archive.read_entry(&id)? else {
                continue;
            };
            checked += 1;

            let segment_id = SegmentId::from_bytes(id);
            let result = if segment_id.is_nil() {
                JournalTable::decode_snapshot(&data).map(|_| ())
            } else {
                Segment::decode(segment_id, &data).map(|_| ())
            };

            if let Err(error) = result {
                corrupt += 1;
                println!("CORRUPT  {}  {}  {}", archive.name(), segment_id, error);
            }
        }
    }

    println!(
        "{} archives, {} entries checked, {} corrupt",
        archives.len(),
        checked,
        corrupt
    );

    if corrupt > 0 {
        return Err(format!("{corrupt} corrupt entries found").into());
    }
    Ok(())
}
