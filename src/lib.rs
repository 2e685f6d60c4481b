//! # fsmwire
//!
//! Serial control plane between a host and a microcontroller running a
//! registry of finite state machines.
//!
//! Both ends speak a length-prefixed binary framing over the serial
//! link. The device owns the FSM instances and steps them
//! cooperatively; the host creates, destroys, and enumerates them
//! remotely and exchanges application frames with them.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): frame codec and the incremental
//!   assembler that survives corrupted length prefixes by resyncing.
//! - **Device** ([`device`]): the [`Fsm`](device::Fsm) contract, the
//!   registry/scheduler, and the single-task main loop.
//! - **Host** ([`host`]): a concurrent engine with a dedicated writer
//!   task and a pending-reply table correlating inbound frames to
//!   waiting callers by peer id.
//! - **Transport** ([`transport`]): serial port setup; everything above
//!   it only needs `AsyncRead + AsyncWrite`.
//!
//! ## Example
//!
//! ```ignore
//! use fsmwire::host::Controller;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> fsmwire::Result<()> {
//!     let ctl = Controller::open("/dev/ttyUSB0").await?;
//!     ctl.create_fsm(4, &[250]).await?;
//!     for fsm in ctl.list_fsms(Duration::from_secs(1)).await? {
//!         println!("fsm type {} params {:?}", fsm.type_code, fsm.params);
//!     }
//!     ctl.close().await;
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod host;
pub mod protocol;
pub mod transport;

pub use error::{FsmWireError, Result};
pub use host::Controller;
pub use protocol::{Frame, FrameBuffer};
