//! Duplex transport engine for the UAVCAN/Serial wire protocol.
//!
//! Owns an [`Endpoint`], runs a background reader and a scheduler task over
//! it, serialises outgoing writes, and routes decoded frames to per-session
//! queues. Builds on [`uavcan_serial_proto`] for the wire format itself;
//! this crate adds no codec logic of its own.
//!
//! Out of scope (external collaborators): multi-frame transfer reassembly,
//! flow control, encryption, retransmission beyond fixed-count service-frame
//! duplication, configuration loading, logging subscriber setup, and any
//! concrete physical serial-port driver.

mod config;
mod endpoint;
mod engine;
mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod session;
mod statistics;

pub use config::{
    EngineConfig, MAX_MTU, MAX_SERVICE_DUPLICATION, MIN_MTU, MIN_SERVICE_DUPLICATION,
    TRANSFER_ID_MODULO,
};
pub use endpoint::Endpoint;
pub use engine::{CloseReason, TransportEngine};
pub use error::TransportError;
#[cfg(any(test, feature = "test-util"))]
pub use memory::LoopbackEndpoint;
pub use session::{InputSession, OutputSession, RoutedFrame, SessionKey};
pub use statistics::{StatisticsSnapshot, TransportStatistics};
