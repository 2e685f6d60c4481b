//! Host-side transport engine.
//!
//! The [`Controller`] owns the physical link and exposes it to any
//! number of caller tasks:
//! - `send`: fire-and-forget, FIFO through the writer task
//! - `query`: send, then await the next reply from the target peer
//! - `receive`: await an unsolicited frame from a peer without sending
//!
//! plus the control-plane wrappers (`list_fsms`, `create_fsm`,
//! `destroy_fsm`, `clear_all_fsms`) built purely on top of those.
//!
//! # Lifecycle
//!
//! `open`/`open_stream` spawn the writer task and the reader task;
//! `close` flips the shutdown flag, wakes both, and joins them. `close`
//! is idempotent, never propagates teardown errors, and queued-but-
//! unsent frames are lost by design. A fatal link error also stops the
//! tasks, observable as `is_open() == false`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::pending::PendingTable;
use super::writer::{spawn_writer_task, WriterHandle};
use crate::error::{FsmWireError, Result};
use crate::protocol::{opcodes, parse_records, Frame, FrameBuffer, PEER_MASTER};
use crate::transport::serial;

/// One live FSM instance as reported by LIST, in fingerprint order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsmDescriptor {
    /// The instance's type code.
    pub type_code: u8,
    /// Constructor parameters captured at creation.
    pub params: Bytes,
}

/// Concurrent engine over one serial link.
pub struct Controller {
    writer: WriterHandle,
    pending: Arc<PendingTable>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl Controller {
    /// Open a serial device (115200 8N1) and start the engine.
    pub async fn open(device: &str) -> Result<Self> {
        let stream = serial::open(device).await?;
        Ok(Self::open_stream(stream))
    }

    /// Start the engine over an already-connected byte stream.
    ///
    /// Used directly by tests and demos; `open` is this plus the serial
    /// handshake.
    pub fn open_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (writer, writer_task) = spawn_writer_task(write_half, shutdown_rx.clone());

        let pending = Arc::new(PendingTable::new());
        let running = Arc::new(AtomicBool::new(true));

        let reader_task = tokio::spawn(read_loop(
            reader,
            pending.clone(),
            running.clone(),
            shutdown_rx,
        ));

        Self {
            writer,
            pending,
            running,
            shutdown_tx,
            tasks: Mutex::new(Some((writer_task, reader_task))),
        }
    }

    /// Check whether the engine is running. Goes false after `close` or
    /// after a fatal link failure stops the reader.
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shut the engine down and join its tasks.
    ///
    /// Idempotent and safe on an engine whose tasks already died.
    /// Teardown errors are swallowed; frames still queued are dropped.
    pub async fn close(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        if let Some((writer_task, reader_task)) = self.tasks.lock().await.take() {
            let _ = writer_task.await;
            let _ = reader_task.await;
        }
    }

    /// Enqueue a frame for transmission (fire-and-forget, FIFO).
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            return Err(FsmWireError::ConnectionClosed);
        }
        self.writer.send(&frame).await
    }

    /// Send a frame and await the next reply from the same peer.
    ///
    /// The pending handler is registered before the send so a fast reply
    /// cannot race past it, and withdrawn if the deadline expires, so a
    /// stale reply later wakes nobody.
    pub async fn query(&self, frame: Frame, deadline: Duration) -> Result<Frame> {
        let peer_id = frame.peer_id;
        let (ticket, rx) = self.pending.register(peer_id);

        if let Err(e) = self.send(frame).await {
            self.pending.remove(ticket);
            return Err(e);
        }

        self.await_reply(peer_id, ticket, rx, deadline).await
    }

    /// Await an unsolicited frame from `peer_id` without sending.
    pub async fn receive(&self, peer_id: u8, deadline: Duration) -> Result<Frame> {
        if !self.is_open() {
            return Err(FsmWireError::ConnectionClosed);
        }
        let (ticket, rx) = self.pending.register(peer_id);
        self.await_reply(peer_id, ticket, rx, deadline).await
    }

    async fn await_reply(
        &self,
        peer_id: u8,
        ticket: super::pending::Ticket,
        rx: oneshot::Receiver<Frame>,
        deadline: Duration,
    ) -> Result<Frame> {
        match timeout(deadline, rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => {
                // Reader dropped the sender side: engine is going away.
                self.pending.remove(ticket);
                Err(FsmWireError::ConnectionClosed)
            }
            Err(_) => {
                self.pending.remove(ticket);
                Err(FsmWireError::Timeout(peer_id))
            }
        }
    }

    /// Ask the device to construct an FSM instance (fire-and-forget; a
    /// full registry drops the request silently, so confirm with
    /// `list_fsms` when it matters).
    pub async fn create_fsm(&self, type_code: u8, params: &[u8]) -> Result<()> {
        let mut payload = Vec::with_capacity(2 + params.len());
        payload.push(opcodes::OP_CREATE);
        payload.push(type_code);
        payload.extend_from_slice(params);
        self.send(Frame::from_parts(PEER_MASTER, &payload)).await
    }

    /// Ask the device to destroy the instance at `fingerprint`.
    ///
    /// Fingerprints come from the most recent `list_fsms` and are
    /// invalidated by any intervening removal (swap-removal moves the
    /// last instance into the freed slot).
    pub async fn destroy_fsm(&self, fingerprint: u8) -> Result<()> {
        self.send(Frame::from_parts(
            PEER_MASTER,
            &[opcodes::OP_DESTROY, fingerprint],
        ))
        .await
    }

    /// Enumerate live FSM instances, in fingerprint order.
    pub async fn list_fsms(&self, deadline: Duration) -> Result<Vec<FsmDescriptor>> {
        let reply = self
            .query(Frame::from_parts(PEER_MASTER, &[opcodes::OP_LIST]), deadline)
            .await?;

        // Reply payload: [OP_LIST] followed by descriptor records.
        let body = match reply.payload.first() {
            Some(&opcodes::OP_LIST) => &reply.payload[1..],
            _ => {
                return Err(FsmWireError::InvalidFrame(
                    "LIST reply with unexpected opcode".into(),
                ))
            }
        };

        Ok(parse_records(body)
            .into_iter()
            .filter_map(|record| {
                let (&type_code, params) = record.split_first()?;
                Some(FsmDescriptor {
                    type_code,
                    params: Bytes::copy_from_slice(params),
                })
            })
            .collect())
    }

    /// Destroy every live instance. Returns how many were removed.
    ///
    /// Repeatedly destroys fingerprint 0: under swap-removal that is the
    /// only fingerprint guaranteed to stay meaningful between removals.
    pub async fn clear_all_fsms(&self, deadline: Duration) -> Result<usize> {
        let count = self.list_fsms(deadline).await?.len();
        for _ in 0..count {
            self.destroy_fsm(0).await?;
        }
        Ok(count)
    }
}

/// Reader loop: feed completed frames to the pending table.
///
/// Every read's bytes go to the assembler even when the loop is about to
/// stop — partial data is never wasted. Unsolicited frames that match no
/// handler are dropped.
async fn read_loop<R>(
    mut reader: R,
    pending: Arc<PendingTable>,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Send + Unpin,
{
    let mut assembler = FrameBuffer::new();
    let mut buf = vec![0u8; 1024];

    loop {
        let n = tokio::select! {
            biased;

            _ = shutdown.changed() => {
                debug!("reader task shutting down");
                break;
            }
            res = reader.read(&mut buf) => match res {
                Ok(0) => {
                    debug!("link closed by peer");
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "link read failed, reader task exiting");
                    break;
                }
            },
        };

        for frame in assembler.push(&buf[..n]) {
            let woken = pending.resolve(&frame);
            if woken == 0 {
                trace!(peer_id = frame.peer_id, "dropping unsolicited frame");
            }
        }
    }

    running.store(false, Ordering::Release);
}
