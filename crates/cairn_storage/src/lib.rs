//! # Cairn Storage
//!
//! Archive container trait and implementations for Cairn.
//!
//! This crate provides the lowest-level persistence abstraction for the
//! segment store. An [`Archive`] is an append-only, capacity-bounded
//! container of entries keyed by a 128-bit id; an [`ArchiveBackend`]
//! enumerates the ordered container sequence and creates new containers
//! on demand.
//!
//! ## Design Principles
//!
//! - Archives are opaque byte stores keyed by id (lookup, append, flush)
//! - No knowledge of Cairn entry formats, segments, or journals
//! - "Won't fit" is a value ([`WriteOutcome::Rejected`]), not an error
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Implementations
//!
//! - [`FileArchive`] / [`FileArchiveBackend`] - numbered append-only files
//!   in a directory
//! - [`MemoryArchive`] / [`MemoryArchiveBackend`] - for testing and
//!   ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use cairn_storage::{Archive, MemoryArchive, WriteOutcome};
//!
//! let archive = MemoryArchive::new("mem00000", 1024);
//! let id = [1u8; 16];
//! assert_eq!(archive.write_entry(&id, b"hello").unwrap(), WriteOutcome::Written);
//! assert_eq!(archive.read_entry(&id).unwrap().as_deref(), Some(&b"hello"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod error;
mod file;
mod memory;

pub use archive::{Archive, ArchiveBackend, EntryId, WriteOutcome, ENTRY_HEADER_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::{archive_file_name, FileArchive, FileArchiveBackend};
pub use memory::{MemoryArchive, MemoryArchiveBackend};
