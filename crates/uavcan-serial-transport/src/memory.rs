//! An in-memory [`Endpoint`] pair, for tests and simulation.
//!
//! Not a physical serial driver — a loopback byte pipe standing in for one.

use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use crate::endpoint::Endpoint;

/// One end of an in-memory duplex byte pipe.
///
/// The receive queue and the open flag live behind `Arc`s so [`Self::try_clone`]
/// can hand out a second handle sharing the same underlying pipe, the way a
/// duplicated file descriptor shares one kernel-side stream.
pub struct LoopbackEndpoint {
    name: Arc<str>,
    inbox: Arc<StdMutex<mpsc::Receiver<Vec<u8>>>>,
    outbox: mpsc::Sender<Vec<u8>>,
    pending: Arc<StdMutex<VecDeque<u8>>>,
    open: Arc<AtomicBool>,
}

impl LoopbackEndpoint {
    /// Build a connected pair: bytes written to `a` are readable from `b`,
    /// and vice versa.
    #[must_use]
    pub fn pair(name_a: impl Into<String>, name_b: impl Into<String>) -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel();
        let a = Self {
            name: Arc::from(name_a.into()),
            inbox: Arc::new(StdMutex::new(b_to_a_rx)),
            outbox: a_to_b_tx,
            pending: Arc::new(StdMutex::new(VecDeque::new())),
            open: Arc::new(AtomicBool::new(true)),
        };
        let b = Self {
            name: Arc::from(name_b.into()),
            inbox: Arc::new(StdMutex::new(a_to_b_rx)),
            outbox: b_to_a_tx,
            pending: Arc::new(StdMutex::new(VecDeque::new())),
            open: Arc::new(AtomicBool::new(true)),
        };
        (a, b)
    }

    fn drain_pending(pending: &mut VecDeque<u8>, max_bytes: usize) -> Vec<u8> {
        let n = max_bytes.min(pending.len());
        pending.drain(..n).collect()
    }
}

impl Endpoint for LoopbackEndpoint {
    fn try_clone(&self) -> io::Result<Box<dyn Endpoint>> {
        Ok(Box::new(Self {
            name: Arc::clone(&self.name),
            inbox: Arc::clone(&self.inbox),
            outbox: self.outbox.clone(),
            pending: Arc::clone(&self.pending),
            open: Arc::clone(&self.open),
        }))
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.is_empty() {
            return Ok(Self::drain_pending(&mut pending, max_bytes));
        }
        let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        match inbox.recv_timeout(timeout) {
            Ok(chunk) => {
                pending.extend(chunk);
                Ok(Self::drain_pending(&mut pending, max_bytes))
            },
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        }
    }

    fn available(&self) -> io::Result<usize> {
        Ok(self.pending.lock().unwrap_or_else(PoisonError::into_inner).len())
    }

    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> io::Result<usize> {
        self.outbox
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer dropped"))?;
        Ok(bytes.len())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&mut self) -> io::Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn set_baudrate(&mut self, _baud: u32) -> io::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_on_one_end_are_readable_on_the_other() {
        let (mut a, mut b) = LoopbackEndpoint::pair("a", "b");
        a.write(b"hello", Duration::from_millis(100)).unwrap();
        let got = b.read(16, Duration::from_millis(100)).unwrap();
        assert_eq!(got, b"hello");
    }

    #[test]
    fn read_times_out_with_empty_vec_when_no_data() {
        let (_a, mut b) = LoopbackEndpoint::pair("a", "b");
        let got = b.read(16, Duration::from_millis(10)).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn read_respects_max_bytes_across_calls() {
        let (mut a, mut b) = LoopbackEndpoint::pair("a", "b");
        a.write(b"abcdef", Duration::from_millis(100)).unwrap();
        let first = b.read(3, Duration::from_millis(100)).unwrap();
        assert_eq!(first, b"abc");
        let second = b.read(3, Duration::from_millis(100)).unwrap();
        assert_eq!(second, b"def");
    }
}
