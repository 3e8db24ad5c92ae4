//! The duplex transport engine: reader thread, scheduler task, write path,
//! routing.
//!
//! Three concurrency domains, matching spec.md §5:
//!
//! - **Reader (R)** — one dedicated [`std::thread`], exclusively owning a
//!   [`Endpoint::try_clone`]d handle to the endpoint and the
//!   [`StreamParser`]. Never touches the session registry or statistics
//!   directly; every parser event is converted to an owned [`EngineCommand`]
//!   and posted to the scheduler. Because it holds its own handle rather
//!   than sharing the writer's lock, a blocked read never delays a pending
//!   write.
//! - **Scheduler (S)** — a single `tokio::spawn`-ed task draining the
//!   command channel. The session registry (who gets which frames) is
//!   mutated only here, realising spec.md §5's single-writer discipline as
//!   an actor rather than a mutex.
//! - **Writer (W)** — [`tokio::task::spawn_blocking`] calls issued directly
//!   by whichever task is awaiting [`crate::OutputSession::send_transfer`],
//!   serialised by the cooperative `write_state` lock rather than hopped
//!   through the scheduler: hopping would force every concurrent sender to
//!   wait for a single actor turn even after their own write completed,
//!   which the lock alone already prevents.

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, OnceLock, PoisonError,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use uavcan_serial_proto::{
    crc::CRC_LEN, framing::encode_delimited, header::HEADER_LEN, DataSpecifier, Frame, NodeId,
    ParserEvent, StreamParser,
};

use crate::{
    config::EngineConfig,
    endpoint::Endpoint,
    error::TransportError,
    session::{InputSession, InputSessionInner, OutputSession, OutputSessionInner, RoutedFrame, SessionKey},
    statistics::{StatisticsSnapshot, TransportStatistics},
};

/// How long the reader blocks per [`Endpoint::read`] call before re-checking
/// the shutdown flag (spec.md §4.4: "read timeout... ≈1 s").
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the engine transitioned to `Closed` (spec.md §4.5 supplement,
/// spec.md §9's write-fatal/reader-fatal cases named in prose).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// [`TransportEngine::close`] was called.
    Explicit,
    /// The reader thread observed an unrecoverable I/O error.
    ReaderFatal,
    /// A write raised an unrecoverable I/O error.
    WriteFatal,
}

struct WriteState {
    scratch: Vec<u8>,
    wire: Vec<u8>,
}

/// State shared across the scheduler, reader thread, and every session
/// handle.
pub(crate) struct EngineShared {
    /// The writer's and [`EngineShared::close_endpoint`]'s handle. The
    /// reader thread holds its own independent clone instead of sharing
    /// this one (see the module doc).
    write_endpoint: Arc<StdMutex<Box<dyn Endpoint>>>,
    write_state: AsyncMutex<WriteState>,
    pub(crate) stats: TransportStatistics,
    closed: AtomicBool,
    close_reason: OnceLock<CloseReason>,
    config: EngineConfig,
}

impl EngineShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Transition to closed, recording `reason` if this is the first such
    /// transition. Returns whether this call performed the transition.
    fn mark_closed(&self, reason: CloseReason) -> bool {
        let first_time = !self.closed.swap(true, Ordering::AcqRel);
        if first_time {
            let _ = self.close_reason.set(reason);
        }
        first_time
    }

    /// Closes the writer's handle. Since it shares the underlying resource
    /// with the reader's cloned handle (spec.md §5), this is enough to
    /// release the link entirely; the reader observes shutdown via
    /// [`EngineShared::is_closed`] rather than by re-checking the endpoint.
    fn close_endpoint(&self) {
        let mut guard = self.write_endpoint.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = guard.close() {
            tracing::warn!(%error, "endpoint close failed");
        }
    }

    /// Pessimistic unescaped frame length bound the stream parser aborts
    /// beyond: header + configured MTU + payload CRC.
    fn max_frame_len(&self) -> usize {
        HEADER_LEN + self.config.mtu() + CRC_LEN
    }

    /// The spec's `_send_transfer(frames, deadline)`: every frame in order,
    /// each under its own write-lock acquisition. Aborts the whole sequence
    /// on the first frame that cannot be written before `deadline`.
    pub(crate) async fn send_frame_sequence(
        &self,
        frames: &[Frame<'_>],
        deadline: Instant,
    ) -> Result<Option<Instant>, TransportError> {
        let mut first_timestamp = None;
        for frame in frames {
            match self.send_one_frame(frame, deadline).await? {
                Some(timestamp) => {
                    if first_timestamp.is_none() {
                        first_timestamp = Some(timestamp);
                    }
                },
                None => {
                    self.stats.add_out_incomplete(1);
                    return Ok(None);
                },
            }
        }
        self.stats.add_out_transfers(1);
        Ok(first_timestamp)
    }

    async fn send_one_frame(
        &self,
        frame: &Frame<'_>,
        deadline: Instant,
    ) -> Result<Option<Instant>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ResourceClosed);
        }
        let mut state = self.write_state.lock().await;
        state.scratch.clear();
        if 3 * frame.payload.len() > state.scratch.capacity() {
            state.scratch.reserve(frame.wire_len());
        }
        frame.encode_unescaped(&mut state.scratch);
        state.wire.clear();
        encode_delimited(&state.scratch, &mut state.wire);

        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Ok(None);
        }

        let wire_len = state.wire.len();
        let wire_bytes = state.wire.clone();
        let endpoint = Arc::clone(&self.write_endpoint);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = endpoint.lock().unwrap_or_else(PoisonError::into_inner);
            guard.write(&wire_bytes, budget)
        })
        .await
        .unwrap_or_else(|_join_error| {
            Err(io::Error::other("writer task did not complete"))
        });
        drop(state);

        match outcome {
            Ok(written) if written == wire_len => {
                self.stats.add_out_bytes(written as u64);
                self.stats.add_out_frames(1);
                Ok(Some(Instant::now()))
            },
            Ok(_short_write) => Ok(None),
            Err(error) if error.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(error) => {
                if self.mark_closed(CloseReason::WriteFatal) {
                    tracing::error!(%error, "write fatal, closing engine");
                    self.close_endpoint();
                }
                Err(TransportError::ResourceClosed)
            },
        }
    }
}

/// Work posted onto the scheduler task: registry lookups/mutations and
/// routed data, all funnelled through one channel so the registry has a
/// single writer (spec.md §5/§9).
pub(crate) enum EngineCommand {
    GetInputSession { key: SessionKey, reply: oneshot::Sender<InputSession> },
    GetOutputSession { key: SessionKey, reply: oneshot::Sender<OutputSession> },
    RemoveInput(SessionKey),
    RemoveOutput(SessionKey),
    Routed(RoutedFrame),
    OutOfBand(Bytes),
    ReaderFault(String),
    Shutdown,
}

struct InputEntry {
    sender: mpsc::UnboundedSender<RoutedFrame>,
    handle: std::sync::Weak<InputSessionInner>,
}

struct OutputEntry {
    handle: std::sync::Weak<OutputSessionInner>,
}

fn get_or_create_input(
    inputs: &mut HashMap<SessionKey, InputEntry>,
    key: SessionKey,
    commands: &mpsc::UnboundedSender<EngineCommand>,
) -> InputSession {
    if let Some(entry) = inputs.get(&key) {
        if let Some(inner) = entry.handle.upgrade() {
            return InputSession(inner);
        }
    }
    let (sender, receiver) = mpsc::unbounded_channel();
    let inner = Arc::new(InputSessionInner {
        key,
        commands: commands.clone(),
        receiver: AsyncMutex::new(receiver),
    });
    inputs.insert(key, InputEntry { sender, handle: Arc::downgrade(&inner) });
    InputSession(inner)
}

fn get_or_create_output(
    outputs: &mut HashMap<SessionKey, OutputEntry>,
    key: SessionKey,
    commands: &mpsc::UnboundedSender<EngineCommand>,
    shared: &Arc<EngineShared>,
) -> OutputSession {
    if let Some(entry) = outputs.get(&key) {
        if let Some(inner) = entry.handle.upgrade() {
            return OutputSession(inner);
        }
    }
    let duplication = match key.data_specifier {
        DataSpecifier::Service { .. } => shared.config.service_duplication(),
        DataSpecifier::Message(_) => 1,
    };
    let inner = Arc::new(OutputSessionInner {
        key,
        commands: commands.clone(),
        shared: Arc::clone(shared),
        duplication,
    });
    outputs.insert(key, OutputEntry { handle: Arc::downgrade(&inner) });
    OutputSession(inner)
}

/// A frame is accepted iff its destination is the local node id or absent
/// (spec.md §4.4). Accepted frames are delivered to the exact-source
/// session and the wildcard session, whichever are registered. `in_frames`
/// counts every decoded frame, accepted or not — it tracks what the reader
/// produced, not what routing kept.
fn route_frame(shared: &Arc<EngineShared>, inputs: &HashMap<SessionKey, InputEntry>, frame: RoutedFrame) {
    shared.stats.add_in_frames(1);
    if frame.destination_node_id.is_some() && frame.destination_node_id != shared_local(shared) {
        return;
    }

    let exact_key = SessionKey::new(frame.data_specifier, frame.source_node_id);
    let wildcard_key = SessionKey::new(frame.data_specifier, None);

    if let Some(entry) = inputs.get(&exact_key) {
        let _ = entry.sender.send(frame.clone());
    }
    if wildcard_key != exact_key {
        if let Some(entry) = inputs.get(&wildcard_key) {
            let _ = entry.sender.send(frame);
        }
    }
}

fn shared_local(shared: &Arc<EngineShared>) -> Option<NodeId> {
    shared.config.local_node_id
}

fn observe_out_of_band(shared: &Arc<EngineShared>, bytes: &Bytes) {
    shared.stats.add_in_out_of_band_bytes(bytes.len() as u64);
    match std::str::from_utf8(bytes) {
        Ok(text) => tracing::debug!(data = text, "out-of-band bytes"),
        Err(_) => tracing::debug!(data = ?bytes.as_ref(), "out-of-band bytes (not utf-8)"),
    }
}

async fn run_scheduler(
    shared: Arc<EngineShared>,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    self_sender: mpsc::UnboundedSender<EngineCommand>,
) {
    let mut inputs: HashMap<SessionKey, InputEntry> = HashMap::new();
    let mut outputs: HashMap<SessionKey, OutputEntry> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            EngineCommand::GetInputSession { key, reply } => {
                let session = get_or_create_input(&mut inputs, key, &self_sender);
                let _ = reply.send(session);
            },
            EngineCommand::GetOutputSession { key, reply } => {
                let session = get_or_create_output(&mut outputs, key, &self_sender, &shared);
                let _ = reply.send(session);
            },
            EngineCommand::RemoveInput(key) => {
                inputs.remove(&key);
            },
            EngineCommand::RemoveOutput(key) => {
                outputs.remove(&key);
            },
            EngineCommand::Routed(frame) => route_frame(&shared, &inputs, frame),
            EngineCommand::OutOfBand(bytes) => observe_out_of_band(&shared, &bytes),
            EngineCommand::ReaderFault(message) => {
                if shared.mark_closed(CloseReason::ReaderFatal) {
                    tracing::error!(error = %message, "reader thread fatal, closing engine");
                    shared.close_endpoint();
                }
            },
            EngineCommand::Shutdown => {
                inputs.clear();
                outputs.clear();
                break;
            },
        }
    }
}

fn run_reader(
    shared: Arc<EngineShared>,
    mut endpoint: Box<dyn Endpoint>,
    commands: mpsc::UnboundedSender<EngineCommand>,
) {
    let mut parser = StreamParser::new(shared.max_frame_len());

    while !shared.is_closed() {
        let max_bytes = match endpoint.available() {
            Ok(n) => n.max(1),
            Err(error) => {
                let _ = commands.send(EngineCommand::ReaderFault(error.to_string()));
                return;
            },
        };
        let chunk = endpoint.read(max_bytes, READ_TIMEOUT);
        match chunk {
            Ok(bytes) if bytes.is_empty() => {},
            Ok(bytes) => {
                shared.stats.add_in_bytes(bytes.len() as u64);
                let timestamp = Instant::now();
                parser.feed(&bytes, timestamp, |event, ts| {
                    let command = match event {
                        ParserEvent::Frame(frame) => {
                            EngineCommand::Routed(RoutedFrame::from_decoded(&frame, ts))
                        },
                        ParserEvent::OutOfBand(bytes) => {
                            EngineCommand::OutOfBand(Bytes::copy_from_slice(bytes))
                        },
                    };
                    let _ = commands.send(command);
                });
            },
            Err(error) => {
                let _ = commands.send(EngineCommand::ReaderFault(error.to_string()));
                return;
            },
        }
    }
}

/// Owns an [`Endpoint`], drives a reader thread and a scheduler task over
/// it, and hands out session handles that route frames to and from it.
///
/// `TransportEngine` itself is a thin handle: cloning is not provided
/// (callers share it behind an `Arc` if needed), but every method is safe
/// to call from any number of concurrent tasks.
pub struct TransportEngine {
    shared: Arc<EngineShared>,
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl TransportEngine {
    /// Take ownership of an already-open endpoint and start the engine.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MediaConfig`] if the endpoint is not
    /// already open, or if an explicit baud rate was configured and the
    /// endpoint rejects it. Returns [`TransportError::Io`] if the reader
    /// thread cannot be spawned.
    pub fn new(mut endpoint: Box<dyn Endpoint>, config: EngineConfig) -> Result<Self, TransportError> {
        if !endpoint.is_open() {
            return Err(TransportError::MediaConfig("endpoint is not open".to_owned()));
        }
        if let Some(baud_rate) = config.baud_rate {
            endpoint.set_baudrate(baud_rate)?;
        }
        let reader_endpoint = endpoint.try_clone()?;

        let shared = Arc::new(EngineShared {
            write_endpoint: Arc::new(StdMutex::new(endpoint)),
            write_state: AsyncMutex::new(WriteState { scratch: Vec::new(), wire: Vec::new() }),
            stats: TransportStatistics::default(),
            closed: AtomicBool::new(false),
            close_reason: OnceLock::new(),
            config,
        });

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("uavcan-serial-reader".to_owned())
            .spawn({
                let shared = Arc::clone(&shared);
                let commands_tx = commands_tx.clone();
                move || run_reader(shared, reader_endpoint, commands_tx)
            })
            .map_err(TransportError::Io)?;

        tokio::spawn(run_scheduler(Arc::clone(&shared), commands_rx, commands_tx.clone()));

        Ok(Self { shared, commands: commands_tx })
    }

    /// Idempotently create or return the input session for `data_specifier`
    /// scoped to `peer` (`None` is the wildcard/promiscuous subscription).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ResourceClosed`] if the engine has
    /// already closed.
    pub async fn get_input_session(
        &self,
        data_specifier: DataSpecifier,
        peer: Option<NodeId>,
    ) -> Result<InputSession, TransportError> {
        self.request_session(SessionKey::new(data_specifier, peer), |key, reply| {
            EngineCommand::GetInputSession { key, reply }
        })
        .await
    }

    /// Idempotently create or return the output session for `data_specifier`
    /// addressed to `peer` (`None` for an anonymous/broadcast destination).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ResourceClosed`] if the engine has
    /// already closed.
    pub async fn get_output_session(
        &self,
        data_specifier: DataSpecifier,
        peer: Option<NodeId>,
    ) -> Result<OutputSession, TransportError> {
        self.request_session(SessionKey::new(data_specifier, peer), |key, reply| {
            EngineCommand::GetOutputSession { key, reply }
        })
        .await
    }

    async fn request_session<T>(
        &self,
        key: SessionKey,
        build: impl FnOnce(SessionKey, oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, TransportError> {
        if self.shared.is_closed() {
            return Err(TransportError::ResourceClosed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(key, reply_tx))
            .map_err(|_send_error| TransportError::ResourceClosed)?;
        reply_rx.await.map_err(|_recv_error| TransportError::ResourceClosed)
    }

    /// Close the engine: stop accepting new sessions, drop every existing
    /// session's delivery channel, and close the endpoint. Idempotent —
    /// calling this more than once, or after a reader/write fault already
    /// closed the engine, is a no-op.
    pub async fn close(&self) {
        if !self.shared.mark_closed(CloseReason::Explicit) {
            return;
        }
        self.shared.close_endpoint();
        let _ = self.commands.send(EngineCommand::Shutdown);
    }

    /// Why the engine closed, or `None` while it is still open.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason.get().copied()
    }

    /// Snapshot copy of every statistics counter.
    #[must_use]
    pub fn sample_statistics(&self) -> StatisticsSnapshot {
        self.shared.stats.sample()
    }
}
