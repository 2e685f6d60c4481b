//! FSM contract and the type-code catalog.
//!
//! Behavioral units on the device implement [`Fsm`]; the set of
//! constructible types is a closed enumeration assembled into an
//! [`FsmCatalog`] at startup. The catalog maps a type code to a
//! `(validate, construct)` pair, replacing a runtime switch over type
//! codes with a registry of factories.
//!
//! # Example
//!
//! ```
//! use fsmwire::device::{Fsm, FsmCatalog, FsmSpec, StepContext};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! struct Counter { ticks: u32 }
//!
//! impl Fsm for Counter {
//!     fn type_code(&self) -> u8 { 42 }
//!     fn descriptor(&self) -> Bytes { Bytes::from_static(&[42]) }
//!     fn step(&mut self, _ctx: &mut StepContext<'_>) { self.ticks += 1; }
//!     fn next_delay(&self) -> Duration { Duration::from_millis(100) }
//!     fn message(&mut self, _payload: &[u8]) -> bool { false }
//! }
//!
//! let mut catalog = FsmCatalog::new();
//! catalog.register(FsmSpec {
//!     type_code: 42,
//!     validate: |params| params.is_empty(),
//!     construct: |_params| Box::new(Counter { ticks: 0 }),
//! });
//! assert!(catalog.contains(42));
//! ```

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::protocol::Frame;

/// Hands side effects from a stepping FSM back to the runtime.
///
/// The original publishers wrote straight to the serial port from
/// `Step()`; here the runtime owns the port, so emitted frames go through
/// an outbox flushed at the end of each loop iteration.
pub struct StepContext<'a> {
    outbox: &'a mut Vec<Frame>,
}

impl<'a> StepContext<'a> {
    /// Create a context backed by the runtime's outbox.
    pub fn new(outbox: &'a mut Vec<Frame>) -> Self {
        Self { outbox }
    }

    /// Queue a frame for transmission after the current dispatch/step.
    pub fn publish(&mut self, peer_id: u8, payload: &[u8]) {
        self.outbox.push(Frame::from_parts(peer_id, payload));
    }
}

/// Capability set every FSM type supplies.
///
/// Implementations must be non-blocking: the cooperative scheduler runs
/// `step()` and `message()` to completion with no preemption, and no
/// instance is ever stepped concurrently with itself.
pub trait Fsm: Send {
    /// The type code this instance answers to on the wire.
    fn type_code(&self) -> u8;

    /// Opaque per-instance descriptor for LIST replies; conventionally
    /// `[type_code, constructor params...]` as captured at creation.
    fn descriptor(&self) -> Bytes;

    /// Advance one unit of behavior.
    fn step(&mut self, ctx: &mut StepContext<'_>);

    /// Time until this instance's next `step`, computed after every
    /// `step` and after every `message` that asked to be re-armed.
    fn next_delay(&self) -> Duration;

    /// Offered for every inbound frame whose peer id matches this
    /// instance's type code. Return `true` to be stepped and rescheduled
    /// immediately, `false` to stay on the existing schedule.
    fn message(&mut self, payload: &[u8]) -> bool;
}

/// Factory entry for one FSM type.
#[derive(Clone, Copy)]
pub struct FsmSpec {
    /// Type code this factory constructs.
    pub type_code: u8,
    /// Static parameter-blob check, run before construction.
    pub validate: fn(params: &[u8]) -> bool,
    /// Build an instance from a validated parameter blob.
    pub construct: fn(params: &[u8]) -> Box<dyn Fsm>,
}

/// Closed mapping from type code to factory.
///
/// Populated once at startup and then handed to the registry by value;
/// there is no way to add types while the device loop is running.
pub struct FsmCatalog {
    specs: HashMap<u8, FsmSpec>,
}

impl FsmCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// Register a factory for its type code. Re-registering a code
    /// replaces the previous entry.
    pub fn register(&mut self, spec: FsmSpec) {
        self.specs.insert(spec.type_code, spec);
    }

    /// Look up the factory for a type code.
    pub fn get(&self, type_code: u8) -> Option<&FsmSpec> {
        self.specs.get(&type_code)
    }

    /// Check whether a type code is constructible.
    pub fn contains(&self, type_code: u8) -> bool {
        self.specs.contains_key(&type_code)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for FsmCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Fsm for Nop {
        fn type_code(&self) -> u8 {
            1
        }
        fn descriptor(&self) -> Bytes {
            Bytes::from_static(&[1])
        }
        fn step(&mut self, _ctx: &mut StepContext<'_>) {}
        fn next_delay(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn message(&mut self, _payload: &[u8]) -> bool {
            false
        }
    }

    fn nop_spec() -> FsmSpec {
        FsmSpec {
            type_code: 1,
            validate: |params| params.is_empty(),
            construct: |_| Box::new(Nop),
        }
    }

    #[test]
    fn test_catalog_lookup() {
        let mut catalog = FsmCatalog::new();
        assert!(catalog.is_empty());

        catalog.register(nop_spec());
        assert!(catalog.contains(1));
        assert!(!catalog.contains(2));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_validate_then_construct() {
        let mut catalog = FsmCatalog::new();
        catalog.register(nop_spec());

        let spec = catalog.get(1).unwrap();
        assert!((spec.validate)(b""));
        assert!(!(spec.validate)(b"extra"));

        let fsm = (spec.construct)(b"");
        assert_eq!(fsm.type_code(), 1);
    }

    #[test]
    fn test_step_context_publish() {
        let mut outbox = Vec::new();
        let mut ctx = StepContext::new(&mut outbox);
        ctx.publish(7, b"\x01");
        ctx.publish(8, b"");

        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0].peer_id, 7);
        assert_eq!(outbox[0].payload(), b"\x01");
        assert_eq!(outbox[1].peer_id, 8);
    }
}
