//! CRC-32C (Castagnoli) over the header and payload spans.
//!
//! Both the header and the payload carry their own trailing CRC-32C. A span
//! decodes iff the CRC computed over the span (excluding its own trailing 4
//! bytes) equals the little-endian CRC stored in those trailing 4 bytes. We
//! reuse the table-driven `crc` crate rather than a hand-rolled bit loop.

use crc::{CRC_32_ISCSI, Crc};

/// CRC-32/ISCSI is the Castagnoli variant (CRC-32C) used throughout this
/// transport.
static CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Number of trailing bytes a CRC-32C occupies on the wire.
pub const CRC_LEN: usize = 4;

/// Incremental CRC-32C accumulator, for spans fed in more than one chunk.
#[derive(Debug)]
pub struct Crc32c {
    digest: crc::Digest<'static, u32>,
}

impl Default for Crc32c {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32c {
    /// Start a fresh accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self { digest: CASTAGNOLI.digest() }
    }

    /// Compute the CRC-32C of a single contiguous span.
    #[must_use]
    pub fn of(bytes: &[u8]) -> u32 {
        CASTAGNOLI.checksum(bytes)
    }

    /// Fold in more bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Consume the accumulator, returning the finished CRC.
    #[must_use]
    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

/// True iff `data` checksums to the CRC-32C stored in `trailing_crc`
/// (little-endian, as on the wire).
#[must_use]
pub fn verify(data: &[u8], trailing_crc: [u8; CRC_LEN]) -> bool {
    Crc32c::of(data) == u32::from_le_bytes(trailing_crc)
}
