//! The fixed 32-byte frame header: raw byte layout only.
//!
//! This module knows nothing about node ids or data specifiers being
//! range-checked types — it reads and writes the raw wire fields and
//! verifies the header's own CRC-32C. [`crate::frame::Frame`] is responsible
//! for turning the raw fields into the typed record.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::crc::{self, CRC_LEN};

/// Size of the header in bytes.
pub const HEADER_LEN: usize = 32;

/// Bytes of the header covered by its own trailing CRC.
const HEADER_CRC_COVERED_LEN: usize = HEADER_LEN - CRC_LEN;

/// Only supported protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// Bit 31 of the index/end-of-transfer word.
pub const END_OF_TRANSFER_BIT: u32 = 1 << 31;

/// Mask for the 31-bit frame index.
pub const INDEX_MASK: u32 = END_OF_TRANSFER_BIT - 1;

/// Raw 32-byte header, little-endian, one field per wire column.
///
/// Every multi-byte field is stored as a byte array rather than a native
/// integer so the in-memory layout matches the wire layout exactly and
/// `zerocopy` can cast to/from it without a safety escape hatch.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub(crate) struct RawHeader {
    pub version: u8,
    pub priority: u8,
    pub source_node_id: [u8; 2],
    pub destination_node_id: [u8; 2],
    pub data_specifier: [u8; 2],
    pub data_type_hash: [u8; 8],
    pub transfer_id: [u8; 8],
    pub index_eot: [u8; 4],
    pub crc: [u8; 4],
}

const _: () = assert!(core::mem::size_of::<RawHeader>() == HEADER_LEN);

impl RawHeader {
    /// Build the raw header with a correct trailing CRC-32C over bytes
    /// 0..28.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        priority: u8,
        source_node_id: u16,
        destination_node_id: u16,
        data_specifier: u16,
        data_type_hash: u64,
        transfer_id: u64,
        index_eot: u32,
    ) -> Self {
        let mut header = Self {
            version: PROTOCOL_VERSION,
            priority,
            source_node_id: source_node_id.to_le_bytes(),
            destination_node_id: destination_node_id.to_le_bytes(),
            data_specifier: data_specifier.to_le_bytes(),
            data_type_hash: data_type_hash.to_le_bytes(),
            transfer_id: transfer_id.to_le_bytes(),
            index_eot: index_eot.to_le_bytes(),
            crc: [0; CRC_LEN],
        };
        let covered = &header.as_bytes()[..HEADER_CRC_COVERED_LEN];
        header.crc = crc::Crc32c::of(covered).to_le_bytes();
        header
    }

    /// Serialize to the 32-byte wire image.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Parse and CRC-verify a header from the front of `bytes`.
    ///
    /// Returns `None` if `bytes` is shorter than [`HEADER_LEN`] or the
    /// header CRC does not verify — both are "no frame" conditions per
    /// spec.md §4.2, never a raised error.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let header = Self::read_from_bytes(&bytes[..HEADER_LEN]).ok()?;
        let covered = &bytes[..HEADER_CRC_COVERED_LEN];
        if crc::verify(covered, header.crc) { Some(header) } else { None }
    }

    pub fn source_node_id(&self) -> u16 {
        u16::from_le_bytes(self.source_node_id)
    }

    pub fn destination_node_id(&self) -> u16 {
        u16::from_le_bytes(self.destination_node_id)
    }

    pub fn data_specifier_word(&self) -> u16 {
        u16::from_le_bytes(self.data_specifier)
    }

    pub fn data_type_hash(&self) -> u64 {
        u64::from_le_bytes(self.data_type_hash)
    }

    pub fn transfer_id(&self) -> u64 {
        u64::from_le_bytes(self.transfer_id)
    }

    pub fn index(&self) -> u32 {
        u32::from_le_bytes(self.index_eot) & INDEX_MASK
    }

    pub fn end_of_transfer(&self) -> bool {
        u32::from_le_bytes(self.index_eot) & END_OF_TRANSFER_BIT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_input() {
        assert!(RawHeader::from_bytes(&[0u8; HEADER_LEN - 1]).is_none());
    }

    #[test]
    fn round_trips_fields() {
        let header = RawHeader::new(2, 0x9E, 0x8E, 0xC07B, 0xDEAD_BEEF_BADC_0FFE, 42, 7);
        let bytes = header.to_bytes();
        let decoded = RawHeader::from_bytes(&bytes).expect("valid header decodes");
        assert_eq!(decoded.source_node_id(), 0x9E);
        assert_eq!(decoded.destination_node_id(), 0x8E);
        assert_eq!(decoded.data_specifier_word(), 0xC07B);
        assert_eq!(decoded.data_type_hash(), 0xDEAD_BEEF_BADC_0FFE);
        assert_eq!(decoded.transfer_id(), 42);
        assert_eq!(decoded.index(), 7);
        assert!(!decoded.end_of_transfer());
    }

    #[test]
    fn flipped_header_bit_fails_crc() {
        let header = RawHeader::new(0, 0, 0, 0, 0, 0, 0);
        let mut bytes = header.to_bytes();
        bytes[0] ^= 0x01;
        assert!(RawHeader::from_bytes(&bytes).is_none());
    }
}
