//! Top-level facade crate for riskgate.
//!
//! Re-exports the core model and the gateway library so users can depend on a single crate.

pub mod core {
    pub use riskgate_core::*;
}

pub mod gateway {
    pub use riskgate_gateway::*;
}
