//! Runtime context
//!
//! Passed to every capability call. Contains cancellation and tracing.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-turn trace identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime context for capability calls
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Trace ID shared by every call made for one turn
    pub trace_id: TraceId,

    /// Agent the turn belongs to
    pub agent_id: String,

    /// Cancelled when the loop stops
    pub cancellation: CancellationToken,
}

impl RuntimeContext {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            trace_id: TraceId::new(),
            agent_id: agent_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Share an existing cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Create child context with same trace
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            agent_id: self.agent_id.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
