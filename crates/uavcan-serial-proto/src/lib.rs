//! Wire format for the UAVCAN/Serial transport.
//!
//! This crate is pure: no I/O, no threads. It covers the frame codec (a
//! 32-byte header plus payload, each independently CRC-32C checked) and the
//! byte-stuffed stream parser that resynchronises after corruption. The
//! `uavcan-serial-transport` crate drives bytes through this codec over a
//! real link.

pub mod crc;
pub mod data_specifier;
pub mod error;
pub mod frame;
pub mod framing;
pub mod header;
pub mod node_id;
pub mod parser;
pub mod priority;

pub use data_specifier::{DataSpecifier, Role, ServiceId, SubjectId};
pub use error::FrameError;
pub use frame::Frame;
pub use node_id::NodeId;
pub use parser::{ParserEvent, StreamParser};
pub use priority::Priority;
