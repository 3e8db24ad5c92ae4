//! Error taxonomy for the wire format.
//!
//! [`FrameError`] covers spec.md §7's "Invariant violation" category: all of
//! these are raised synchronously to the caller at construction time and
//! are never produced by [`crate::frame::Frame::decode`] — a malformed
//! image decodes to `None` ("no frame"), it never raises.

use thiserror::Error;

/// A frame (or one of its fields) violated an invariant at construction
/// time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Node id exceeds the 12-bit range (0..=4095).
    #[error("node id {0} exceeds the 12-bit range (0..=4095)")]
    InvalidNodeId(u32),

    /// Message subject id exceeds the 13-bit range (0..=8191).
    #[error("subject id {0} exceeds the 13-bit range (0..=8191)")]
    InvalidSubjectId(u32),

    /// Service id exceeds the 9-bit range (0..=511).
    #[error("service id {0} exceeds the 9-bit range (0..=511)")]
    InvalidServiceId(u32),

    /// A service data specifier was paired with an anonymous source node.
    /// Anonymous nodes may not use services (spec.md §3 invariant).
    #[error("service data specifier requires a non-anonymous source node id")]
    AnonymousService,

    /// `data_type_hash` does not fit in 64 bits.
    #[error("data type hash {0} exceeds 64 bits")]
    InvalidDataTypeHash(u128),

    /// `transfer_id` does not fit in 64 bits.
    #[error("transfer id {0} exceeds 64 bits")]
    InvalidTransferId(u128),

    /// `index` exceeds the 31-bit range (0..=2^31-1).
    #[error("frame index {0} exceeds the 31-bit range")]
    InvalidIndex(u32),
}
