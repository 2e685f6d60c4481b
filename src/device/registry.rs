//! FSM registry and cooperative scheduler.
//!
//! A bounded, ordered collection of live FSM instances. The registry is
//! the sole owner of every instance: nothing outlives it, and removal
//! drops the instance on the spot.
//!
//! Scheduling is run-to-completion with an explicit monotonic clock
//! input: [`FsmRegistry::run_once`] takes `now` rather than reading a
//! clock, so the whole scheduler is unit-testable without real timing.
//!
//! # Fingerprints
//!
//! An instance's fingerprint is its current slot index. `destroy` swaps
//! the last occupied slot into the freed position (constant-time
//! removal), which silently changes the relocated survivor's
//! fingerprint. Fingerprints are therefore only valid immediately after
//! a LIST; any protocol that reuses one across removals gets whatever it
//! deserves.

use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, trace};

use super::fsm::{Fsm, FsmCatalog, StepContext};
use crate::error::{FsmWireError, Result};
use crate::protocol::{opcodes, push_record, Frame, PEER_MASTER};

/// Maximum number of simultaneously live FSM instances.
pub const MAX_FSM: usize = 16;

/// One occupied registry slot.
struct Slot {
    fsm: Box<dyn Fsm>,
    /// Absolute time of this instance's next step.
    deadline: Instant,
}

/// Bounded collection of live FSM instances plus their schedule.
pub struct FsmRegistry {
    catalog: FsmCatalog,
    slots: Vec<Slot>,
}

impl FsmRegistry {
    /// Create an empty registry over a closed catalog of types.
    pub fn new(catalog: FsmCatalog) -> Self {
        Self {
            catalog,
            slots: Vec::with_capacity(MAX_FSM),
        }
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether no instances are live.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Construct an instance and schedule its first step.
    ///
    /// Returns the new instance's fingerprint.
    ///
    /// # Errors
    ///
    /// `Rejected` if the registry is at capacity, the type code is not in
    /// the catalog, or parameter validation fails. The would-be instance
    /// is never constructed in any of those cases.
    pub fn create(&mut self, type_code: u8, params: &[u8], now: Instant) -> Result<usize> {
        if self.slots.len() >= MAX_FSM {
            return Err(FsmWireError::Rejected("registry at capacity"));
        }

        let spec = self
            .catalog
            .get(type_code)
            .ok_or(FsmWireError::Rejected("unknown type code"))?;

        if !(spec.validate)(params) {
            return Err(FsmWireError::Rejected("parameter validation failed"));
        }

        let fsm = (spec.construct)(params);
        let deadline = now + fsm.next_delay();
        self.slots.push(Slot { fsm, deadline });
        Ok(self.slots.len() - 1)
    }

    /// Remove the instance at `fingerprint` by swapping in the last
    /// occupied slot. Returns false for an out-of-range fingerprint.
    pub fn destroy(&mut self, fingerprint: usize) -> bool {
        if fingerprint < self.slots.len() {
            self.slots.swap_remove(fingerprint);
            true
        } else {
            false
        }
    }

    /// Drop every live instance (shutdown path).
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Handle a control-plane payload: `[opcode, args...]`.
    ///
    /// Malformed payloads and rejected creates are dropped silently per
    /// the protocol; the host re-issues if it cares. LIST pushes its
    /// reply frame onto `outbox`.
    pub fn dispatch_control(&mut self, payload: &[u8], now: Instant, outbox: &mut Vec<Frame>) {
        let Some(&opcode) = payload.first() else {
            trace!("empty control payload, ignoring");
            return;
        };

        match opcode {
            opcodes::OP_CREATE => {
                if payload.len() < 2 {
                    trace!("CREATE without a type code, ignoring");
                    return;
                }
                let type_code = payload[1];
                match self.create(type_code, &payload[2..], now) {
                    Ok(fingerprint) => {
                        debug!(type_code, fingerprint, "created FSM");
                    }
                    Err(e) => debug!(type_code, error = %e, "dropped create request"),
                }
            }

            opcodes::OP_DESTROY => {
                if payload.len() < 2 {
                    trace!("DESTROY without a fingerprint, ignoring");
                    return;
                }
                let fingerprint = payload[1] as usize;
                if self.destroy(fingerprint) {
                    debug!(fingerprint, "destroyed FSM");
                } else {
                    debug!(fingerprint, "DESTROY for unoccupied slot, ignoring");
                }
            }

            opcodes::OP_LIST => outbox.push(self.list_reply()),

            other => trace!(opcode = other, "unknown control opcode, ignoring"),
        }
    }

    /// Build the LIST reply: `[OP_LIST]` followed by one length-prefixed
    /// descriptor record per live instance, in collection order.
    fn list_reply(&self) -> Frame {
        let mut payload = BytesMut::new();
        payload.extend_from_slice(&[opcodes::OP_LIST]);
        for slot in &self.slots {
            push_record(&mut payload, &slot.fsm.descriptor());
        }
        Frame::new(PEER_MASTER, payload.freeze())
    }

    /// Offer a non-control frame to every instance whose type code
    /// matches, in collection order. Each instance that asks for it is
    /// stepped and rescheduled inline before the next one is offered.
    pub fn dispatch_broadcast(
        &mut self,
        type_code: u8,
        payload: &[u8],
        now: Instant,
        outbox: &mut Vec<Frame>,
    ) {
        for slot in &mut self.slots {
            if slot.fsm.type_code() == type_code && slot.fsm.message(payload) {
                let mut ctx = StepContext::new(outbox);
                slot.fsm.step(&mut ctx);
                slot.deadline = now + slot.fsm.next_delay();
            }
        }
    }

    /// Step every instance whose deadline has arrived and reschedule it.
    ///
    /// Runs to completion with no preemption: at most one `step()` in
    /// flight per instance, ever.
    pub fn run_once(&mut self, now: Instant, outbox: &mut Vec<Frame>) {
        for slot in &mut self.slots {
            if slot.deadline <= now {
                let mut ctx = StepContext::new(outbox);
                slot.fsm.step(&mut ctx);
                slot.deadline = now + slot.fsm.next_delay();
            }
        }
    }

    /// Earliest pending deadline, for bounding the runtime's read wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().map(|s| s.deadline).min()
    }

    /// Type code of the instance at `fingerprint`, if occupied.
    pub fn type_code_at(&self, fingerprint: usize) -> Option<u8> {
        self.slots.get(fingerprint).map(|s| s.fsm.type_code())
    }

    #[cfg(test)]
    fn deadline_at(&self, fingerprint: usize) -> Option<Instant> {
        self.slots.get(fingerprint).map(|s| s.deadline)
    }
}
