//! Segment model and entry codec.

use crate::error::{CoreError, CoreResult};
use crate::types::{RecordId, SegmentId};
use std::collections::HashMap;

/// Magic value opening every segment entry (`b"CairnSEG"`, big-endian).
pub const SEGMENT_MAGIC: u64 = 0x4361_6972_6e53_4547;

/// Fixed header size before the referenced-id list:
/// magic (8) + payload length (4) + referenced count (4) + id (16).
const HEADER_SIZE: usize = 32;

/// Auxiliary lookup tables carried only by freshly created segments.
///
/// The on-disk entry format does not encode these tables, so a segment
/// reconstructed from an archive always carries empty ones. Logic layered
/// above the store must not assume they survive a reload.
#[derive(Debug, Clone, Default)]
pub struct AuxTables {
    /// Interned string records, by value.
    pub strings: HashMap<String, RecordId>,
    /// Template records, by canonical template encoding.
    pub templates: HashMap<Vec<u8>, RecordId>,
}

impl AuxTables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether both tables are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.templates.is_empty()
    }
}

/// An immutable unit of stored bytes plus reachability references.
///
/// Once written, a segment's persisted form (magic, lengths, id,
/// referenced-id list, payload) never changes. Callers receive segments as
/// shared read-only views and must not mutate payload bytes.
#[derive(Debug, Clone)]
pub struct Segment {
    id: SegmentId,
    payload: Vec<u8>,
    referenced_ids: Vec<SegmentId>,
    tables: AuxTables,
}

impl Segment {
    /// Creates a new in-memory segment.
    ///
    /// The referenced-id list is kept in caller order and is not
    /// deduplicated.
    #[must_use]
    pub fn new(
        id: SegmentId,
        payload: Vec<u8>,
        referenced_ids: Vec<SegmentId>,
        tables: AuxTables,
    ) -> Self {
        Self {
            id,
            payload,
            referenced_ids,
            tables,
        }
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the ids of segments this segment references.
    #[must_use]
    pub fn referenced_ids(&self) -> &[SegmentId] {
        &self.referenced_ids
    }

    /// Looks up an interned string record.
    ///
    /// Only populated on segments created in this process; see
    /// [`AuxTables`].
    #[must_use]
    pub fn string_record(&self, value: &str) -> Option<RecordId> {
        self.tables.strings.get(value).copied()
    }

    /// Looks up a template record by its canonical encoding.
    ///
    /// Only populated on segments created in this process; see
    /// [`AuxTables`].
    #[must_use]
    pub fn template_record(&self, template: &[u8]) -> Option<RecordId> {
        self.tables.templates.get(template).copied()
    }

    /// Returns whether the auxiliary tables are empty.
    #[must_use]
    pub fn aux_tables_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the size of this segment's archive entry in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.referenced_ids.len() * 16 + self.payload.len()
    }

    /// Encodes the segment into its archive entry form.
    ///
    /// Layout (big-endian):
    /// `magic (8) | payload length (4) | referenced count (4) | id (16) |
    /// referenced ids (16 each) | payload`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());

        buf.extend_from_slice(&SEGMENT_MAGIC.to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(self.referenced_ids.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.id.as_bytes());
        for referenced in &self.referenced_ids {
            buf.extend_from_slice(referenced.as_bytes());
        }
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Decodes a segment from its archive entry form.
    ///
    /// Verifies the magic value, that the embedded id matches the id the
    /// entry was looked up under (defends against cross-archive
    /// corruption), and that every length field is within bounds. The
    /// decoded segment carries empty auxiliary tables.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentCorruption`] on any structural mismatch.
    pub fn decode(id: SegmentId, data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CoreError::segment_corruption("entry shorter than header"));
        }

        let magic = u64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]);
        if magic != SEGMENT_MAGIC {
            return Err(CoreError::segment_corruption(format!(
                "bad segment magic: {magic:#018x}"
            )));
        }

        let payload_len = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as u64;
        let referenced_count = u32::from_be_bytes([data[12], data[13], data[14], data[15]]) as u64;

        let embedded = SegmentId::from_slice(&data[16..32]).ok_or_else(|| {
            CoreError::segment_corruption("unreadable embedded segment id")
        })?;
        if embedded != id {
            return Err(CoreError::segment_corruption(format!(
                "segment id mismatch: entry for {id} embeds {embedded}"
            )));
        }

        let expected = HEADER_SIZE as u64 + referenced_count * 16 + payload_len;
        if data.len() as u64 != expected {
            return Err(CoreError::segment_corruption(format!(
                "entry length mismatch: expected {expected} bytes, got {}",
                data.len()
            )));
        }

        let mut referenced_ids = Vec::with_capacity(referenced_count as usize);
        let mut cursor = HEADER_SIZE;
        for _ in 0..referenced_count {
            // Bounds verified by the length check above.
            let referenced = SegmentId::from_slice(&data[cursor..cursor + 16])
                .ok_or_else(|| CoreError::segment_corruption("unreadable referenced id"))?;
            referenced_ids.push(referenced);
            cursor += 16;
        }

        Ok(Self {
            id,
            payload: data[cursor..].to_vec(),
            referenced_ids,
            tables: AuxTables::new(),
        })
    }
}
