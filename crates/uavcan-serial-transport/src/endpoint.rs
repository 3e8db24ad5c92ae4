//! The byte-stream collaborator the engine drives.
//!
//! The physical serial port driver is out of scope for this core (spec.md
//! §1); this trait is the seam an implementation plugs into. No concrete
//! hardware backend ships here — see [`crate::memory::LoopbackEndpoint`]
//! for the in-memory stand-in used by this crate's own tests.

use std::{io, time::Duration};

/// An already-open, duplex byte stream.
///
/// Opening and closing the underlying resource outside of [`Endpoint::close`]
/// is the caller's concern; the engine takes ownership of an already-open
/// endpoint at construction.
///
/// The reader thread and the writer never call the same `Box<dyn Endpoint>`
/// concurrently — `&mut self` rules that out in safe Rust — but they are not
/// made to contend on one another's behalf either. At construction the
/// engine calls [`Endpoint::try_clone`] to obtain a second handle for the
/// reader, mirroring [`std::net::TcpStream::try_clone`]: both handles refer
/// to the same underlying link, each is independently owned, and closing one
/// closes the link for both. This is what lets a blocked read and a pending
/// write proceed without either waiting on the other, per the duplex
/// contention requirement implementations are expected to honour.
pub trait Endpoint: Send {
    /// Produce a second, independently owned handle to the same underlying
    /// link, for the engine's reader to use while the original handle
    /// continues to serve writes and control calls ([`Endpoint::close`],
    /// [`Endpoint::set_baudrate`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource cannot be duplicated.
    fn try_clone(&self) -> io::Result<Box<dyn Endpoint>>;


    /// Block for up to `timeout` and return whatever bytes are available,
    /// up to `max_bytes`. Returns an empty vector on timeout, never an
    /// error for a plain timeout.
    ///
    /// # Errors
    ///
    /// Returns an error for any I/O failure other than a timeout.
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> io::Result<Vec<u8>>;

    /// Bytes currently buffered and ready to read without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource cannot report this.
    fn available(&self) -> io::Result<usize>;

    /// Block for up to `timeout` attempting to write all of `bytes`.
    /// Returns the number of bytes actually written, which may be less
    /// than `bytes.len()` if the deadline is reached mid-write.
    ///
    /// # Errors
    ///
    /// Returns an [`io::ErrorKind::TimedOut`] error if no bytes could be
    /// written before `timeout` elapsed, or any other I/O error on
    /// failure.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Whether the endpoint is still usable.
    fn is_open(&self) -> bool;

    /// Release the underlying resource. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource fails to close cleanly.
    fn close(&mut self) -> io::Result<()>;

    /// Reconfigure the link speed, if the endpoint has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint does not support this baud rate or
    /// reconfiguration otherwise fails.
    fn set_baudrate(&mut self, baud: u32) -> io::Result<()>;

    /// A human-readable identifier for logging (device path, address, ...).
    fn name(&self) -> &str;
}
