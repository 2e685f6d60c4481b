//! Physical link plumbing.
//!
//! Everything above this layer is written against `AsyncRead +
//! AsyncWrite`, so tests and demos substitute in-memory duplex pipes for
//! the serial port without touching protocol code.

pub mod serial;

pub use serial::{list_ports, open, BAUD_RATE, RESET_GRACE};
