//! Admission control: rate gating and circuit breaking per resource.
//!
//! - `rule` / `store`: rule definitions and the versioned snapshot store
//! - `flow`: qps controllers (direct reject, warm-up, queueing)
//! - `circuit`: degrade-rule state machine
//! - `controller`: per-resource state arena and `admit`

pub mod circuit;
pub mod clock;
pub mod controller;
pub(crate) mod flow;
pub mod rule;
pub mod store;
pub(crate) mod window;

pub use circuit::CircuitState;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use controller::{AdmissionController, AdmissionEntry, BlockReason, Blocked, CallOutcome, CircuitStatus};
pub use rule::{AdmissionRule, ControlStrategy, RuleKind};
pub use store::{ResourceRules, RuleSnapshot, RuleStore};
