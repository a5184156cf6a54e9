//! Render collaborator interface.

use serde::Serialize;

use crate::models::reference::ReferenceDescriptor;
use crate::session::state::{LifecycleState, Stage};

/// Read-only view of an answer, produced after every applied event.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderSnapshot {
    /// Id the answer is displayed under.
    pub message_id: String,
    /// Text so far.
    pub content: String,
    /// Latest stage.
    pub stage: Stage,
    /// Lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Citations announced so far.
    pub references: Vec<ReferenceDescriptor>,
}

/// Receives snapshots as an answer streams in.
///
/// Called synchronously from the read loop once per applied event, so
/// implementations must return quickly.
pub trait RenderSink: Send + Sync {
    /// Present the latest snapshot.
    fn render(&self, snapshot: &RenderSnapshot);
}

/// Sink that discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&self, _snapshot: &RenderSnapshot) {}
}
