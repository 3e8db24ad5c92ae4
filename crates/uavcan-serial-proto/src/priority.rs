//! Frame priority: a 3-bit value carried in the header.

/// Transfer priority, encoded as a 3-bit field (0..7) in the header.
///
/// Lower numeric value means more urgent delivery.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Most urgent; reserved for time-critical control traffic.
    Exceptional = 0,
    /// Fast.
    Fast = 1,
    /// High.
    High = 2,
    /// Nominal, the default for ordinary application traffic.
    Nominal = 3,
    /// Low.
    Low = 4,
    /// Slow.
    Slow = 5,
    /// Optional.
    Optional = 6,
    /// Least urgent; best-effort background traffic.
    Background = 7,
}

impl Priority {
    /// Decode a 3-bit priority value (0..7). Returns `None` for any other
    /// input, which cannot occur since the wire field is masked to 3 bits
    /// before this is called, but keeps the constructor total.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Exceptional),
            1 => Some(Self::Fast),
            2 => Some(Self::High),
            3 => Some(Self::Nominal),
            4 => Some(Self::Low),
            5 => Some(Self::Slow),
            6 => Some(Self::Optional),
            7 => Some(Self::Background),
            _ => None,
        }
    }

    /// The raw 3-bit wire value.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}
