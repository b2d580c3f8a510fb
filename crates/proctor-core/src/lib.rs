//! proctor-core — Proctored assessment session engine.
//!
//! Question sequencing, per-question timing and scoring as a deterministic
//! state machine, plus the concurrent capture/recording lifecycle and its
//! failure-tolerant handoff to durable storage.

pub mod capture;
pub mod error;
pub mod machine;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod timer;
pub mod traits;
