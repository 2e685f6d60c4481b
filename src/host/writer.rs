//! Dedicated writer task draining the outbound queue.
//!
//! All outbound traffic funnels through one mpsc channel into a single
//! task that owns the write half of the link:
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Bytes> ─► writer task ─► port
//! Caller N ─┘
//! ```
//!
//! Frames are written strictly in enqueue order; there is no batching or
//! reordering. On shutdown the task exits immediately, so frames still
//! queued at close are lost — the protocol makes no delivery guarantee
//! and the host re-issues anything it cares about.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{FsmWireError, Result};
use crate::protocol::Frame;

/// Outbound queue capacity. Callers sending faster than the link drains
/// block on the channel rather than growing memory without bound.
pub const QUEUE_CAPACITY: usize = 64;

/// Handle for enqueueing frames, cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Encode and enqueue a frame (fire-and-forget, FIFO).
    ///
    /// # Errors
    ///
    /// `InvalidPayload` if the frame cannot be encoded;
    /// `ConnectionClosed` if the writer task is gone.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode()?;
        self.tx
            .send(bytes)
            .await
            .map_err(|_| FsmWireError::ConnectionClosed)
    }
}

/// Spawn the writer task over the write half of the link.
///
/// The task runs until `shutdown` flips true, the channel closes, or a
/// write fails. Returns the enqueue handle and the join handle.
pub fn spawn_writer_task<W>(
    writer: W,
    shutdown: watch::Receiver<bool>,
) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer, shutdown));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let bytes = tokio::select! {
            biased;

            // The only exit paths: shutdown or all senders dropped.
            // Either way, whatever is still queued stays unsent.
            _ = shutdown.changed() => {
                debug!("writer task shutting down");
                return;
            }
            maybe = rx.recv() => match maybe {
                Some(bytes) => bytes,
                None => {
                    debug!("outbound queue closed, writer task exiting");
                    return;
                }
            },
        };

        if let Err(e) = write_frame(&mut writer, &bytes).await {
            warn!(error = %e, "link write failed, writer task exiting");
            return;
        }
    }
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_send_reaches_the_wire() {
        let (host, mut far) = tokio::io::duplex(4096);
        let (_stop_tx, stop_rx) = shutdown_pair();
        let (handle, _task) = spawn_writer_task(host, stop_rx);

        let frame = Frame::from_parts(2, b"on");
        handle.send(&frame).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &frame.encode().unwrap()[..]);
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (host, mut far) = tokio::io::duplex(4096);
        let (_stop_tx, stop_rx) = shutdown_pair();
        let (handle, _task) = spawn_writer_task(host, stop_rx);

        let mut expected = Vec::new();
        for i in 0u8..10 {
            let frame = Frame::from_parts(1, &[i]);
            expected.extend_from_slice(&frame.encode().unwrap());
            handle.send(&frame).await.unwrap();
        }

        let mut got = vec![0u8; expected.len()];
        far.read_exact(&mut got).await.unwrap();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_at_enqueue() {
        let (host, _far) = tokio::io::duplex(4096);
        let (_stop_tx, stop_rx) = shutdown_pair();
        let (handle, _task) = spawn_writer_task(host, stop_rx);

        let frame = Frame::from_parts(1, &vec![0; crate::protocol::MAX_PAYLOAD_LEN + 1]);
        assert!(matches!(
            handle.send(&frame).await,
            Err(FsmWireError::InvalidPayload(..))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_exits_task() {
        let (host, _far) = tokio::io::duplex(4096);
        let (stop_tx, stop_rx) = shutdown_pair();
        let (handle, task) = spawn_writer_task(host, stop_rx);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer task did not exit")
            .unwrap();

        // Enqueueing after shutdown reports the closed connection.
        let frame = Frame::from_parts(1, b"");
        assert!(matches!(
            handle.send(&frame).await,
            Err(FsmWireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropping_handle_exits_task() {
        let (host, _far) = tokio::io::duplex(4096);
        let (_stop_tx, stop_rx) = shutdown_pair();
        let (handle, task) = spawn_writer_task(host, stop_rx);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer task did not exit")
            .unwrap();
    }
}
