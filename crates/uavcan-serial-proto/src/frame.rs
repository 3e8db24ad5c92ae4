//! The on-link [`Frame`] record: construction, wire encoding, wire decoding.

use std::time::Instant;

use bytes::BufMut;

use crate::{
    crc::{self, CRC_LEN},
    data_specifier::DataSpecifier,
    error::FrameError,
    header::{self, RawHeader},
    node_id::{self, NodeId},
    priority::Priority,
};

/// Highest legal `data_type_hash` / `transfer_id` (both 64-bit, so this is
/// simply `u64::MAX`; kept named so the invariant reads the same way as the
/// node-id and index checks).
const U64_MAX: u128 = u64::MAX as u128;

/// Highest legal `index` (31-bit).
const MAX_INDEX: u32 = header::INDEX_MASK;

/// One atomic unit on the link.
///
/// `payload` borrows from whatever buffer the caller supplied — on decode,
/// that's a view into the unescaped wire image; on encode, it's whatever
/// slice the caller is about to serialize. `Frame` never owns or copies the
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Transfer priority.
    pub priority: Priority,
    /// Sender, or `None` if anonymous.
    pub source_node_id: Option<NodeId>,
    /// Intended recipient, or `None` for broadcast.
    pub destination_node_id: Option<NodeId>,
    /// What the payload means.
    pub data_specifier: DataSpecifier,
    /// Application data type identifier.
    pub data_type_hash: u64,
    /// Transfer identifier.
    pub transfer_id: u64,
    /// Frame index within its transfer (always 0 for single-frame
    /// transfers, which is all this core produces).
    pub index: u32,
    /// Whether this is the last frame of its transfer.
    pub end_of_transfer: bool,
    /// Payload bytes.
    pub payload: &'a [u8],
    /// Reception timestamp. `None` for a frame under construction for
    /// encoding — it is never written to the wire and is ignored by
    /// [`Frame::encode`].
    pub timestamp: Option<Instant>,
}

impl<'a> Frame<'a> {
    /// Construct and validate a frame to be encoded and sent.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if any field violates its invariant: node ids
    /// out of range, a service data specifier paired with an anonymous
    /// source, or `data_type_hash`/`transfer_id`/`index` out of range.
    /// These are the only paths that raise — decoding a received image
    /// never raises (see [`Frame::decode`]).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        priority: Priority,
        source_node_id: Option<NodeId>,
        destination_node_id: Option<NodeId>,
        data_specifier: DataSpecifier,
        data_type_hash: u64,
        transfer_id: u64,
        index: u32,
        end_of_transfer: bool,
        payload: &'a [u8],
    ) -> Result<Self, FrameError> {
        if matches!(data_specifier, DataSpecifier::Service { .. }) && source_node_id.is_none() {
            return Err(FrameError::AnonymousService);
        }
        if index > MAX_INDEX {
            return Err(FrameError::InvalidIndex(index));
        }
        Ok(Self {
            priority,
            source_node_id,
            destination_node_id,
            data_specifier,
            data_type_hash,
            transfer_id,
            index,
            end_of_transfer,
            payload,
            timestamp: None,
        })
    }

    /// Pessimistic upper bound on the unescaped wire image length
    /// (header + payload + payload CRC), before byte-stuffing.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        header::HEADER_LEN + self.payload.len() + CRC_LEN
    }

    /// Pessimistic upper bound on the fully-escaped, delimited encoding —
    /// the buffer size an encoder must be able to grow to, per spec.md
    /// §4.1: `2 + 2 * (header + payload + crc)`.
    #[must_use]
    pub fn max_encoded_len(&self) -> usize {
        2 + 2 * self.wire_len()
    }

    /// Encode the unescaped wire image (header ‖ payload ‖ payload CRC) into
    /// `dst`. Does not apply byte-stuffing or delimiters — see
    /// [`crate::framing`] for that.
    pub fn encode_unescaped(&self, dst: &mut impl BufMut) {
        let data_specifier = self.data_specifier.to_wire();
        let index_eot = self.index
            | if self.end_of_transfer { header::END_OF_TRANSFER_BIT } else { 0 };
        let raw = RawHeader::new(
            self.priority.to_u8(),
            node_id::encode_optional(self.source_node_id),
            node_id::encode_optional(self.destination_node_id),
            data_specifier,
            self.data_type_hash,
            self.transfer_id,
            index_eot,
        );
        dst.put_slice(&raw.to_bytes());
        dst.put_slice(self.payload);
        dst.put_u32_le(crc::Crc32c::of(self.payload));
    }

    /// Decode an unescaped wire image (header ‖ payload ‖ payload CRC, with
    /// byte-stuffing already removed).
    ///
    /// Returns `None` — "no frame" — for any malformed input: too short,
    /// either CRC failing to verify, an unsupported version, or a
    /// reconstructed record that violates a [`FrameError`] invariant.
    /// Per spec.md §4.2/§7 this path never raises; it is the caller's job to
    /// surface these bytes as out-of-band data if desired.
    #[must_use]
    pub fn decode(image: &'a [u8], timestamp: Instant) -> Option<Self> {
        let raw = RawHeader::from_bytes(image)?;
        if raw.version != header::PROTOCOL_VERSION {
            tracing::debug!(version = raw.version, "dropping frame: unsupported version");
            return None;
        }

        let rest = &image[header::HEADER_LEN..];
        if rest.len() < CRC_LEN {
            return None;
        }
        let payload_len = rest.len() - CRC_LEN;
        let (payload, trailing) = rest.split_at(payload_len);
        let trailing_crc: [u8; CRC_LEN] = trailing.try_into().ok()?;
        if !crc::verify(payload, trailing_crc) {
            tracing::debug!("dropping frame: payload CRC mismatch");
            return None;
        }

        let priority = Priority::from_u8(raw.priority)?;
        let source_node_id = node_id::decode_optional(raw.source_node_id()).ok()?;
        let destination_node_id = node_id::decode_optional(raw.destination_node_id()).ok()?;
        let data_specifier = DataSpecifier::from_wire(raw.data_specifier_word()).ok()?;

        match Self::new(
            priority,
            source_node_id,
            destination_node_id,
            data_specifier,
            raw.data_type_hash(),
            raw.transfer_id(),
            raw.index(),
            raw.end_of_transfer(),
            payload,
        ) {
            Ok(mut frame) => {
                frame.timestamp = Some(timestamp);
                Some(frame)
            },
            Err(err) => {
                tracing::debug!(%err, "dropping frame: invariant violation on reconstruction");
                None
            },
        }
    }
}

/// Hashes and ids wider than their wire field, used only to exercise
/// [`Frame::new`]'s invariant checks from callers holding a wider integer
/// (mirrors how out-of-range node ids are tested via `u32`).
#[must_use]
pub fn validate_data_type_hash(value: u128) -> Result<u64, FrameError> {
    if value > U64_MAX {
        return Err(FrameError::InvalidDataTypeHash(value));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(value as u64)
}

/// See [`validate_data_type_hash`]; the same widening applies to transfer
/// ids.
#[must_use]
pub fn validate_transfer_id(value: u128) -> Result<u64, FrameError> {
    if value > U64_MAX {
        return Err(FrameError::InvalidTransferId(value));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(value as u64)
}
