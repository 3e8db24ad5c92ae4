//! Error types for the transport engine.

use thiserror::Error;

/// Errors raised synchronously by engine operations.
///
/// Wire-level failures (bad CRC, unsupported version, short write) are
/// never surfaced here — they are either silently dropped (receive path,
/// counted and forwarded as out-of-band data) or reported as a `None`
/// timestamp (send path, counted in `out_incomplete`). Only misconfiguration
/// and closed-state errors raise.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The engine, a session, or the endpoint was not usable at
    /// construction: an out-of-range MTU or service-duplication count, or
    /// an endpoint that was not already open.
    #[error("media configuration error: {0}")]
    MediaConfig(String),

    /// The operation was attempted after [`crate::TransportEngine::close`]
    /// or after the engine closed itself following a reader or write
    /// fault.
    #[error("resource closed")]
    ResourceClosed,

    /// The endpoint raised an I/O error outside the timeout/short-write
    /// paths already modelled by the send and receive flows (for example,
    /// a failure from [`crate::Endpoint::close`] or
    /// [`crate::Endpoint::set_baudrate`]).
    #[error("endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}
