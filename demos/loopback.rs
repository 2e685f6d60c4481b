//! Loopback demo: a simulated device and a host controller joined by an
//! in-memory pipe, no hardware required.
//!
//! ```bash
//! RUST_LOG=fsmwire=debug cargo run --example loopback
//! ```

use std::time::Duration;

use bytes::Bytes;
use tracing_subscriber::EnvFilter;

use fsmwire::device::{DeviceRuntime, Fsm, FsmCatalog, FsmSpec, StepContext};
use fsmwire::host::Controller;
use fsmwire::protocol::Frame;

const BLINK_CODE: u8 = 4;

/// Toy blinker: flips its LED state on every step and reports it.
struct Blinker {
    period_ms: u8,
    lit: bool,
}

impl Fsm for Blinker {
    fn type_code(&self) -> u8 {
        BLINK_CODE
    }
    fn descriptor(&self) -> Bytes {
        Bytes::copy_from_slice(&[BLINK_CODE, self.period_ms])
    }
    fn step(&mut self, ctx: &mut StepContext<'_>) {
        self.lit = !self.lit;
        ctx.publish(BLINK_CODE, &[self.lit as u8]);
    }
    fn next_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.period_ms))
    }
    fn message(&mut self, _payload: &[u8]) -> bool {
        // Any inbound frame forces an immediate blink.
        true
    }
}

#[tokio::main]
async fn main() -> fsmwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut catalog = FsmCatalog::new();
    catalog.register(FsmSpec {
        type_code: BLINK_CODE,
        validate: |params| params.len() == 1,
        construct: |params| {
            Box::new(Blinker {
                period_ms: params[0],
                lit: false,
            })
        },
    });

    let (host_side, device_side) = tokio::io::duplex(4096);
    let device = tokio::spawn(DeviceRuntime::new(catalog).run(device_side));
    let ctl = Controller::open_stream(host_side);

    let deadline = Duration::from_secs(1);

    ctl.create_fsm(BLINK_CODE, &[50]).await?;
    ctl.create_fsm(BLINK_CODE, &[200]).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    for (fingerprint, fsm) in ctl.list_fsms(deadline).await?.iter().enumerate() {
        println!(
            "fingerprint {fingerprint}: type {} period {}ms",
            fsm.type_code, fsm.params[0]
        );
    }

    // Watch a few autonomous blinks.
    for _ in 0..5 {
        let frame = ctl.receive(BLINK_CODE, deadline).await?;
        println!("blink: led={}", frame.payload()[0]);
    }

    // Poke the blinkers directly and read the forced blink.
    let reply = ctl.query(Frame::from_parts(BLINK_CODE, b"now"), deadline).await?;
    println!("forced blink: led={}", reply.payload()[0]);

    let removed = ctl.clear_all_fsms(deadline).await?;
    println!("cleared {removed} instances");

    ctl.close().await;
    device.await.map_err(|e| {
        fsmwire::FsmWireError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
    })??;
    Ok(())
}
