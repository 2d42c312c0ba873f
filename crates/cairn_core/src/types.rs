//! Core identifier types.

use std::fmt;
use uuid::Uuid;

/// Unique identifier for a segment.
///
/// Segment ids occupy a 128-bit space and are assigned by callers
/// (typically content-addressed). They are:
/// - Globally unique within a store
/// - Immutable once a segment is written
/// - Never reused
///
/// The all-zero id is reserved for the journal snapshot entry and must not
/// be used for segments.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId([u8; 16]);

impl SegmentId {
    /// The reserved all-zero id under which the journal snapshot is stored.
    pub const NIL: Self = Self([0u8; 16]);

    /// Creates a segment id from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random (v4) segment id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Creates a segment id from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Creates a segment id from a slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == 16 {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Returns whether this is the reserved all-zero id.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.to_uuid())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl From<Uuid> for SegmentId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<SegmentId> for Uuid {
    fn from(id: SegmentId) -> Self {
        id.to_uuid()
    }
}

impl From<[u8; 16]> for SegmentId {
    fn from(bytes: [u8; 16]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<SegmentId> for [u8; 16] {
    fn from(id: SegmentId) -> Self {
        id.0
    }
}

/// Location of a record: a segment id plus a byte offset into that
/// segment's payload.
///
/// Record ids are the addressing unit used by journals and by record
/// structures layered above segments. The core stores and retrieves them
/// without interpreting the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    /// The segment holding the record.
    pub segment_id: SegmentId,
    /// Byte offset of the record within the segment payload.
    pub offset: u32,
}

impl RecordId {
    /// A null record id, usable as a bootstrap default before any segment
    /// has been written.
    pub const NULL: Self = Self {
        segment_id: SegmentId::NIL,
        offset: 0,
    };

    /// Creates a record id.
    #[must_use]
    pub const fn new(segment_id: SegmentId, offset: u32) -> Self {
        Self { segment_id, offset }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.offset)
    }
}
