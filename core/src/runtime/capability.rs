//! Capability traits
//!
//! Everything the runtime needs from the outside world. No decision logic;
//! implementations only perform side effects.

use chrono::DateTime;
use serde_json::Value;

use crate::error::{InferenceError, RuntimeError, SinkError};
use crate::guard::FactSet;
use crate::kernel::{KernelState, LogLevel, Message};
use crate::memory::SearchHit;
use crate::runtime::context::RuntimeContext;

/// Base capability trait for identity
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;
}

/// Everything an inference call needs for one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub agent_name: String,
    /// Recent transcript, oldest first
    pub transcript: Vec<Message>,
    /// Text that triggered the turn; `None` for autonomous turns
    pub input: Option<String>,
    pub autonomous: bool,
    /// Recalled memories relevant to the input
    pub memories: Vec<SearchHit>,
    /// Hard facts the output must echo unchanged
    pub facts: FactSet,
    pub temperature: f32,
    /// Set on retries; explains what the previous attempt got wrong
    pub corrective_prompt: Option<String>,
}

impl InferenceRequest {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            transcript: Vec::new(),
            input: None,
            autonomous: false,
            memories: Vec::new(),
            facts: FactSet::new(),
            temperature: 0.7,
            corrective_prompt: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn autonomous(mut self) -> Self {
        self.autonomous = true;
        self.input = None;
        self
    }
}

/// Inference capability - returns raw model text, parsed by the guard
#[async_trait::async_trait]
pub trait InferenceCapability: Capability {
    async fn infer(
        &self,
        ctx: &RuntimeContext,
        req: InferenceRequest,
    ) -> Result<String, InferenceError>;
}

/// Source of the trusted facts for a turn
#[async_trait::async_trait]
pub trait FactSource: Capability {
    async fn facts(&self, state: &KernelState, now_ms: i64) -> FactSet;
}

/// Executes kernel outputs and reports runtime failures
#[async_trait::async_trait]
pub trait OutputSink: Capability {
    async fn publish(&self, ctx: &RuntimeContext, topic: &str, payload: &Value) -> Result<(), SinkError>;

    async fn write_log(&self, ctx: &RuntimeContext, level: LogLevel, message: &str) -> Result<(), SinkError>;

    /// Resolves once consolidation is complete
    async fn begin_dream_consolidation(&self, ctx: &RuntimeContext) -> Result<(), SinkError>;

    async fn begin_wake_process(&self, ctx: &RuntimeContext) -> Result<(), SinkError>;

    async fn system_error(&self, ctx: &RuntimeContext, error: &RuntimeError);
}

/// Facts derived from kernel state: energy, wall-clock time and name
#[derive(Debug, Clone)]
pub struct StateFactSource {
    agent_name: String,
}

impl StateFactSource {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
        }
    }
}

impl Capability for StateFactSource {
    fn name(&self) -> &'static str {
        "state-facts"
    }
}

#[async_trait::async_trait]
impl FactSource for StateFactSource {
    async fn facts(&self, state: &KernelState, now_ms: i64) -> FactSet {
        let mut facts = FactSet::new().with(
            "energy",
            state.soma.energy.round(),
            &["tired", "exhausted", "rested", "drained"],
        );
        if let Some(at) = DateTime::from_timestamp_millis(now_ms) {
            facts = facts.with("time", at.format("%H:%M").to_string(), &["o'clock", "clock"]);
        }
        facts.with("agent_name", self.agent_name.as_str(), &["my name"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::FactValue;

    #[tokio::test]
    async fn test_state_facts() {
        let mut state = KernelState::new();
        state.soma.energy = 22.6;
        let facts = StateFactSource::new("Nyx")
            .facts(&state, 45_000_000)
            .await;

        assert_eq!(facts.get("energy").unwrap().value, FactValue::Number(23.0));
        assert_eq!(facts.get("time").unwrap().value, FactValue::from("12:30"));
        assert_eq!(facts.get("agent_name").unwrap().value, FactValue::from("Nyx"));
        assert!(facts.get("energy").unwrap().cues.contains(&"tired".to_string()));
    }

    #[test]
    fn test_autonomous_request_has_no_input() {
        let req = InferenceRequest::new("Nyx").with_input("hi").autonomous();
        assert!(req.autonomous);
        assert!(req.input.is_none());
    }
}
