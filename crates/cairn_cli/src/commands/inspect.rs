//! Inspect command implementation.

use cairn_storage::Archive;
use serde::Serialize;
use std::path::Path;

use super::{discover_archives, newest_journal_snapshot};

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of archive containers.
    pub archive_count: usize,
    /// Total size of all archives in bytes.
    pub total_size: u64,
    /// Total number of entries across all archives.
    pub total_entries: usize,
    /// Per-archive statistics.
    pub archives: Vec<ArchiveStats>,
    /// Journal heads from the newest snapshot, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journals: Option<Vec<JournalStats>>,
}

/// Statistics for a single archive container.
#[derive(Debug, Serialize)]
pub struct ArchiveStats {
    /// Archive file name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Number of entries.
    pub entries: usize,
}

/// A journal name and its persisted head.
#[derive(Debug, Serialize)]
pub struct JournalStats {
    /// Journal name.
    pub name: String,
    /// Head record as `<segment-uuid>:<offset>`.
    pub head: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let archives = discover_archives(path)?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        archive_count: archives.len(),
        total_size: 0,
        total_entries: 0,
        archives: Vec::with_capacity(archives.len()),
        journals: None,
    };

    for archive in &archives {
        let stats = ArchiveStats {
            name: archive.name().to_string(),
            size: archive.size(),
            entries: archive.entry_count(),
        };
        result.total_size += stats.size;
        result.total_entries += stats.entries;
        result.archives.push(stats);
    }

    if let Some(mut entries) = newest_journal_snapshot(&archives)? {
        entries.sort();
        result.journals = Some(
            entries
                .into_iter()
                .map(|(name, head)| JournalStats {
                    name,
                    head: head.to_string(),
                })
                .collect(),
        );
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!(
        "Archives: {} ({} bytes, {} entries)",
        result.archive_count, result.total_size, result.total_entries
    );
    for archive in &result.archives {
        println!(
            "  {}  {} bytes  {} entries",
            archive.name, archive.size, archive.entries
        );
    }

    match &result.journals {
        Some(journals) => {
            println!("Journals: {}", journals.len());
            for journal in journals {
                println!("  {} -> {}", journal.name, journal.head);
            }
        }
        None => println!("Journals: no snapshot persisted"),
    }
}
