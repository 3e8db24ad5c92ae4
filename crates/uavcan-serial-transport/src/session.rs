//! Session handles and the routing key that identifies them.
//!
//! Sessions are external collaborators from the engine's point of view
//! (spec.md §6): the engine only ever talks to them through a channel
//! (input) or a callback closure (output), and only ever holds a registry
//! entry for them — never a direct reference with its own lifetime.

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uavcan_serial_proto::{DataSpecifier, Frame, NodeId, Priority};

use crate::{
    engine::{EngineCommand, EngineShared},
    error::TransportError,
};

/// Registry key: a data specifier plus an optional peer node id.
///
/// `None` is the wildcard/promiscuous key — input sessions registered
/// under it receive frames from any source (spec.md §4.4's "absent peer"
/// subscription).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// What kind of traffic this session carries.
    pub data_specifier: DataSpecifier,
    /// The specific peer this session is scoped to, or `None` for the
    /// wildcard subscription (input) or anonymous destination (output).
    pub peer: Option<NodeId>,
}

impl SessionKey {
    /// Build a routing key.
    #[must_use]
    pub fn new(data_specifier: DataSpecifier, peer: Option<NodeId>) -> Self {
        Self { data_specifier, peer }
    }
}

/// An owned copy of a frame's metadata and payload, crossing from the
/// reader thread to the scheduler task and on to whichever input sessions
/// match it.
///
/// [`uavcan_serial_proto::Frame`] borrows its payload from the parser's
/// scratch buffer, which does not outlive a single `feed` call; this type
/// is the one allocation per completed frame needed to hand it across that
/// boundary (spec.md §4.3: the parser itself never allocates per byte).
#[derive(Debug, Clone)]
pub struct RoutedFrame {
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
    /// Frame index within its transfer.
    pub index: u32,
    /// Whether this is the last frame of its transfer.
    pub end_of_transfer: bool,
    /// Payload bytes.
    pub payload: Bytes,
    /// Reception timestamp.
    pub timestamp: Instant,
}

impl RoutedFrame {
    /// Copy a decoded [`Frame`]'s fields into an owned, `'static` record.
    pub(crate) fn from_decoded(frame: &Frame<'_>, fallback_timestamp: Instant) -> Self {
        Self {
            priority: frame.priority,
            source_node_id: frame.source_node_id,
            destination_node_id: frame.destination_node_id,
            data_specifier: frame.data_specifier,
            data_type_hash: frame.data_type_hash,
            transfer_id: frame.transfer_id,
            index: frame.index,
            end_of_transfer: frame.end_of_transfer,
            payload: Bytes::copy_from_slice(frame.payload),
            timestamp: frame.timestamp.unwrap_or(fallback_timestamp),
        }
    }
}

/// A registered input session: frames matching its key are delivered here
/// in arrival order.
pub struct InputSession(pub(crate) Arc<InputSessionInner>);

pub(crate) struct InputSessionInner {
    pub(crate) key: SessionKey,
    pub(crate) commands: mpsc::UnboundedSender<EngineCommand>,
    pub(crate) receiver: AsyncMutex<mpsc::UnboundedReceiver<RoutedFrame>>,
}

impl Drop for InputSessionInner {
    fn drop(&mut self) {
        let _ = self.commands.send(EngineCommand::RemoveInput(self.key));
    }
}

impl InputSession {
    /// Wait for the next frame matching this session's key.
    ///
    /// Returns `None` once the engine has closed and no further frames
    /// will ever arrive.
    pub async fn recv(&self) -> Option<RoutedFrame> {
        self.0.receiver.lock().await.recv().await
    }

    /// The key this session is registered under.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.0.key
    }
}

/// A registered output session: calling [`OutputSession::send_transfer`]
/// drives the engine's send path (spec.md §4.4), optionally duplicating a
/// service transfer `service_duplication` times.
pub struct OutputSession(pub(crate) Arc<OutputSessionInner>);

pub(crate) struct OutputSessionInner {
    pub(crate) key: SessionKey,
    pub(crate) commands: mpsc::UnboundedSender<EngineCommand>,
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) duplication: u8,
}

impl Drop for OutputSessionInner {
    fn drop(&mut self) {
        let _ = self.commands.send(EngineCommand::RemoveOutput(self.key));
    }
}

impl OutputSession {
    /// The key this session is registered under.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.0.key
    }

    /// Send a transfer: every frame in `frames`, in order, each under its
    /// own write-lock acquisition (spec.md §5: "lock is acquired per frame
    /// so a high-priority frame can interleave"). Duplicated
    /// `self.duplication()` times for a service output session; the
    /// returned instant is the first successful pass's timestamp (design
    /// note in spec.md §9).
    ///
    /// Returns `None` if every pass was aborted by the deadline or a
    /// transient write failure — a normal, expected outcome, not an error
    /// (spec.md §7: transient send failures are reported, never raised).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ResourceClosed`] if the engine has
    /// already closed.
    pub async fn send_transfer(
        &self,
        frames: &[Frame<'_>],
        deadline: Instant,
    ) -> Result<Option<Instant>, TransportError> {
        let mut first_timestamp = None;
        for _ in 0..self.0.duplication {
            if let Some(timestamp) = self.0.shared.send_frame_sequence(frames, deadline).await? {
                if first_timestamp.is_none() {
                    first_timestamp = Some(timestamp);
                }
            }
        }
        Ok(first_timestamp)
    }

    /// How many times each transfer is transmitted (1 for non-service
    /// sessions and services configured with no duplication).
    #[must_use]
    pub fn duplication(&self) -> u8 {
        self.0.duplication
    }
}
