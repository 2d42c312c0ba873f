//! Journals command implementation.

use serde::Serialize;
use std::path::Path;

use super::{discover_archives, newest_journal_snapshot};

/// A journal listing entry.
#[derive(Debug, Serialize)]
struct JournalEntry {
    name: String,
    segment_id: String,
    offset: u32,
}

/// Runs the journals command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let archives = discover_archives(path)?;

    let Some(mut entries) = newest_journal_snapshot(&archives)? else {
        println!("no journal snapshot persisted");
        return Ok(());
    };
    entries.sort();

    let entries: Vec<JournalEntry> = entries
        .into_iter()
        .map(|(name, head)| JournalEntry {
            name,
            segment_id: head.segment_id.to_string(),
            offset: head.offset,
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            for entry in &entries {
                println!("{} -> {}:{}", entry.name, entry.segment_id, entry.offset);
            }
        }
    }

    Ok(())
}
