//! Data specifiers: what a frame's payload means (a message subject, or a
//! service request/response).

use crate::error::FrameError;

/// Request or response role of a [`DataSpecifier::Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client-to-server request.
    Request,
    /// Server-to-client response.
    Response,
}

/// Message subject id (13-bit, 0..=8191).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId(u16);

impl SubjectId {
    /// Highest legal subject id.
    pub const MAX_VALUE: u32 = 0x1FFF;

    /// Validate and construct.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidSubjectId`] if `value` exceeds
    /// [`SubjectId::MAX_VALUE`].
    pub fn new(value: u32) -> Result<Self, FrameError> {
        if value > Self::MAX_VALUE {
            return Err(FrameError::InvalidSubjectId(value));
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by MAX_VALUE above
        Ok(Self(value as u16))
    }

    /// The underlying 13-bit value.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

/// Service id (9-bit, 0..=511).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(u16);

impl ServiceId {
    /// Highest legal service id.
    pub const MAX_VALUE: u32 = 0x1FF;

    /// Validate and construct.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidServiceId`] if `value` exceeds
    /// [`ServiceId::MAX_VALUE`].
    pub fn new(value: u32) -> Result<Self, FrameError> {
        if value > Self::MAX_VALUE {
            return Err(FrameError::InvalidServiceId(value));
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by MAX_VALUE above
        Ok(Self(value as u16))
    }

    /// The underlying 9-bit value.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

/// What a frame's payload is: a published message, or a service
/// request/response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSpecifier {
    /// Fire-and-forget publication on a subject.
    Message(SubjectId),
    /// Request/response interaction on a service.
    Service {
        /// Which service.
        service: ServiceId,
        /// Request or response.
        role: Role,
    },
}

const SERVICE_BIT: u16 = 1 << 15;
const RESPONSE_BIT: u16 = 1 << 14;
const SUBJECT_MASK: u16 = 0x1FFF;
const SERVICE_ID_MASK: u16 = 0x01FF;

impl DataSpecifier {
    /// Encode into the 16-bit wire word (spec.md §4.1).
    #[must_use]
    pub fn to_wire(self) -> u16 {
        match self {
            Self::Message(subject) => subject.value() & SUBJECT_MASK,
            Self::Service { service, role } => {
                let role_bit = match role {
                    Role::Request => 0,
                    Role::Response => RESPONSE_BIT,
                };
                SERVICE_BIT | role_bit | (service.value() & SERVICE_ID_MASK)
            },
        }
    }

    /// Decode from the 16-bit wire word.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidSubjectId`] if the service bit is clear
    /// but one of the reserved bits 13/14 is set (a subject id only has 13
    /// bits), or [`FrameError::InvalidServiceId`] if the extracted service
    /// field somehow exceeds its mask (unreachable for a genuinely 9-bit
    /// field, but kept fallible so this never panics on untrusted input).
    pub fn from_wire(word: u16) -> Result<Self, FrameError> {
        if word & SERVICE_BIT == 0 {
            // The full low 15 bits, not just the 13-bit subject mask: a word
            // with reserved bits 13/14 set must be rejected by
            // `SubjectId::new` as out of range, not silently masked into a
            // valid subject id.
            let subject = SubjectId::new(u32::from(word & !SERVICE_BIT))?;
            Ok(Self::Message(subject))
        } else {
            let role = if word & RESPONSE_BIT != 0 { Role::Response } else { Role::Request };
            let service = ServiceId::new(u32::from(word & SERVICE_ID_MASK))?;
            Ok(Self::Service { service, role })
        }
    }
}
