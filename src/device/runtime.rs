//! Single-task cooperative device loop.
//!
//! Drives an [`FsmRegistry`](super::FsmRegistry) against a byte stream:
//! each iteration performs one bounded read of inbound bytes, routes any
//! completed frames, scans the schedule, and flushes whatever the FSMs
//! and the control plane produced. Everything runs on one task with no
//! preemption, so `step()` and `message()` implementations must not
//! block.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::fsm::FsmCatalog;
use super::registry::FsmRegistry;
use crate::error::Result;
use crate::protocol::{Frame, FrameBuffer};

/// Upper bound on one read wait when no deadline is nearer.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// The device side of the link: registry plus main loop.
pub struct DeviceRuntime {
    registry: FsmRegistry,
}

impl DeviceRuntime {
    /// Create a runtime over a closed catalog of constructible types.
    pub fn new(catalog: FsmCatalog) -> Self {
        Self {
            registry: FsmRegistry::new(catalog),
        }
    }

    /// Access the registry, e.g. to pre-seed instances before `run`.
    pub fn registry_mut(&mut self) -> &mut FsmRegistry {
        &mut self.registry
    }

    /// Run the cooperative loop until the link closes.
    ///
    /// Inbound framing errors are absorbed by the assembler's resync and
    /// never end the loop; only link failure does. The registry is
    /// emptied on the way out, so no FSM instance outlives the loop.
    pub async fn run<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut assembler = FrameBuffer::new();
        let mut outbox: Vec<Frame> = Vec::new();
        let mut buf = vec![0u8; 256];

        let run_result = loop {
            // Bounded read: wake for data or for the nearest deadline,
            // whichever comes first.
            let now = Instant::now();
            let wait = self
                .registry
                .next_deadline()
                .map(|d| d.saturating_duration_since(now))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL);

            match timeout(wait, reader.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    debug!("link closed, stopping device loop");
                    break Ok(());
                }
                Ok(Ok(n)) => {
                    for frame in assembler.push(&buf[..n]) {
                        self.route(&frame, &mut outbox);
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "device read failed");
                    break Err(e.into());
                }
                Err(_elapsed) => {} // deadline reached, fall through to the scan
            }

            self.registry.run_once(Instant::now(), &mut outbox);

            for frame in outbox.drain(..) {
                match frame.encode() {
                    Ok(bytes) => {
                        if let Err(e) = writer.write_all(&bytes).await {
                            warn!(error = %e, "device write failed");
                            self.registry.clear();
                            return Err(e.into());
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping oversized outbound frame"),
                }
            }
            writer.flush().await.ok();
        };

        self.registry.clear();
        run_result
    }

    /// Route one completed inbound frame.
    fn route(&mut self, frame: &Frame, outbox: &mut Vec<Frame>) {
        let now = Instant::now();
        if frame.is_control() {
            self.registry
                .dispatch_control(&frame.payload, now, outbox);
        } else {
            trace!(peer_id = frame.peer_id, "broadcasting to FSM instances");
            self.registry
                .dispatch_broadcast(frame.peer_id, &frame.payload, now, outbox);
        }
    }
}
