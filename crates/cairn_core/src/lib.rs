//! # Cairn Core
//!
//! Content-addressable segment storage engine.
//!
//! Cairn persists an immutable tree of binary records ("segments") inside
//! a small number of large append-only archive files, and exposes named,
//! mutable pointers ("journals") into that tree for snapshot-style
//! concurrent access to an evolving hierarchical store.
//!
//! This crate provides:
//! - The [`Segment`] model and its archive entry codec
//! - A bounded [`SegmentCache`] with per-id load collapsing
//! - Named [`Journal`]s with snapshot persistence
//! - The [`SegmentStore`] engine tying them together over any
//!   [`cairn_storage::ArchiveBackend`]
//!
//! ## Example
//!
//! ```rust
//! use cairn_core::{AuxTables, RecordId, SegmentId, SegmentStore};
//!
//! let store = SegmentStore::open_in_memory(RecordId::NULL).unwrap();
//!
//! let id = SegmentId::random();
//! store.create_segment(id, b"payload", &[], AuxTables::new()).unwrap();
//!
//! let segment = store.read_segment(id).unwrap();
//! assert_eq!(segment.payload(), b"payload");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod journal;
mod segment;
mod store;
mod types;

pub use cache::SegmentCache;
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use journal::{Journal, JournalTable, JOURNAL_MAGIC, ROOT_JOURNAL};
pub use segment::{AuxTables, Segment, SEGMENT_MAGIC};
pub use store::SegmentStore;
pub use types::{RecordId, SegmentId};
