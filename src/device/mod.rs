//! Device side: FSM contract, registry/scheduler, and the main loop.
//!
//! The registry owns every live FSM instance and steps them
//! cooperatively; the runtime wires the registry to the link. Concrete
//! FSM behaviors (blinkers, publishers, motor control) live in the
//! application: anything implementing [`Fsm`] and registered in an
//! [`FsmCatalog`] can be created remotely by the host.

mod fsm;
mod registry;
mod runtime;

pub use fsm::{Fsm, FsmCatalog, FsmSpec, StepContext};
pub use registry::{FsmRegistry, MAX_FSM};
pub use runtime::DeviceRuntime;
