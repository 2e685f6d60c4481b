//! Host side: concurrent transport engine over one serial link.
//!
//! The [`Controller`] is the entry point; [`PendingTable`] and the
//! writer task are its internals, exported for reuse by alternative
//! engines built on the same protocol.

mod controller;
mod pending;
mod writer;

pub use controller::{Controller, FsmDescriptor};
pub use pending::{PendingTable, Ticket};
pub use writer::{spawn_writer_task, WriterHandle, QUEUE_CAPACITY};
