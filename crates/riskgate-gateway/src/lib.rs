//! riskgate gateway library entry.
//!
//! This crate wires admission control, the decision orchestrator and the
//! persistence coordinator into the evaluate pipeline, plus the thin HTTP
//! surface around it. It is consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod admission;
pub mod api;
pub mod app_state;
pub mod config;
pub mod decision;
pub mod obs;
pub mod ops;
pub mod persistence;
pub mod pipeline;
pub mod router;
