//! Engine construction parameters.
//!
//! Configuration *loading* (files, environment, CLI) is out of scope; this
//! is the in-process knob spec.md §6 already describes, validated once at
//! construction.

use uavcan_serial_proto::NodeId;

use crate::error::TransportError;

/// Lowest legal [`EngineConfig::mtu`].
pub const MIN_MTU: usize = 1024;

/// Highest legal [`EngineConfig::mtu`].
pub const MAX_MTU: usize = 1 << 30;

/// Lowest legal [`EngineConfig::service_duplication`].
pub const MIN_SERVICE_DUPLICATION: u8 = 1;

/// Highest legal [`EngineConfig::service_duplication`].
pub const MAX_SERVICE_DUPLICATION: u8 = 5;

/// Modulus of the `transfer_id` field (spec.md §6).
pub const TRANSFER_ID_MODULO: u128 = 1u128 << 64;

/// Construction parameters for a [`crate::TransportEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// This node's id, or `None` to operate anonymously.
    pub local_node_id: Option<NodeId>,
    /// Single-frame transfer ceiling in bytes.
    mtu: usize,
    /// How many times an outgoing service frame is retransmitted.
    service_duplication: u8,
    /// Explicit baud rate to apply to the endpoint at construction, if any.
    pub baud_rate: Option<u32>,
}

impl EngineConfig {
    /// Validate and construct.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MediaConfig`] if `mtu` is outside
    /// `[1024, 2^30]` or `service_duplication` is outside `[1, 5]`.
    pub fn new(
        local_node_id: Option<NodeId>,
        mtu: usize,
        service_duplication: u8,
        baud_rate: Option<u32>,
    ) -> Result<Self, TransportError> {
        if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
            return Err(TransportError::MediaConfig(format!(
                "mtu {mtu} outside [{MIN_MTU}, {MAX_MTU}]"
            )));
        }
        if !(MIN_SERVICE_DUPLICATION..=MAX_SERVICE_DUPLICATION).contains(&service_duplication) {
            return Err(TransportError::MediaConfig(format!(
                "service duplication {service_duplication} outside \
                 [{MIN_SERVICE_DUPLICATION}, {MAX_SERVICE_DUPLICATION}]"
            )));
        }
        Ok(Self { local_node_id, mtu, service_duplication, baud_rate })
    }

    /// Single-frame transfer ceiling in bytes.
    #[must_use]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// How many times an outgoing service frame is retransmitted.
    #[must_use]
    pub fn service_duplication(&self) -> u8 {
        self.service_duplication
    }

    /// Number of node ids in the address space (spec.md's `max_nodes`).
    #[must_use]
    pub fn max_nodes() -> u32 {
        NodeId::MAX_NODES
    }

    /// Modulus of the `transfer_id` field.
    #[must_use]
    pub fn transfer_id_modulo() -> u128 {
        TRANSFER_ID_MODULO
    }
}
