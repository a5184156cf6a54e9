//! Streamed answer sessions.
//!
//! - `state`: the per-answer state machine.
//! - `progress`: out-of-band stage notifications and their correlation.
//! - `render`: the snapshot handed to the render collaborator.
//! - `orchestrator`: submit, read loop, commit and slot bookkeeping.

pub mod orchestrator;
pub mod progress;
pub mod render;
pub mod state;

pub use orchestrator::{ChatTurn, Orchestrator, PendingTurn};
