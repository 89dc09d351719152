//! Kernel events
//!
//! Closed vocabulary of inputs to the reducer. Each tag fixes its payload
//! shape; events are immutable once built.

use serde::{Deserialize, Serialize};

/// Sparse emotion deltas computed by the (external) appraisal formulas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionDelta {
    pub fear: Option<f64>,
    pub curiosity: Option<f64>,
    pub frustration: Option<f64>,
    pub satisfaction: Option<f64>,
}

/// Sparse absolute neurochemical levels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuroLevels {
    pub dopamine: Option<f64>,
    pub serotonin: Option<f64>,
    pub cortisol: Option<f64>,
    pub oxytocin: Option<f64>,
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    UserInput {
        text: String,
    },
    AgentSpoke {
        #[serde(default)]
        thought: String,
        #[serde(default)]
        speech: String,
        #[serde(default)]
        autonomous: bool,
        /// Speech is the deterministic fallback, not model output
        #[serde(default)]
        degraded: bool,
    },
    ToolResult {
        tool: String,
        #[serde(default)]
        content: String,
        #[serde(default = "default_true")]
        success: bool,
        /// Document the tool touched, if any
        #[serde(default)]
        document: Option<String>,
    },
    SleepStart,
    SleepEnd,
    DreamConsolidated,
    MoodShift {
        #[serde(default)]
        deltas: EmotionDelta,
        #[serde(default)]
        trigger: Option<String>,
    },
    NeuroUpdate {
        #[serde(default)]
        values: NeuroLevels,
    },
    ToggleAutonomy,
    ToggleChemistry,
    TogglePoetic,
    StateOverride {
        target: String,
        key: String,
        value: f64,
    },
    GoalFormed {
        description: String,
    },
    GoalCompleted,
    Reset,
    Tick,
}

fn default_true() -> bool {
    true
}

impl EventKind {
    /// Stable tag, matches the serialized `type`
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::UserInput { .. } => "USER_INPUT",
            EventKind::AgentSpoke { .. } => "AGENT_SPOKE",
            EventKind::ToolResult { .. } => "TOOL_RESULT",
            EventKind::SleepStart => "SLEEP_START",
            EventKind::SleepEnd => "SLEEP_END",
            EventKind::DreamConsolidated => "DREAM_CONSOLIDATED",
            EventKind::MoodShift { .. } => "MOOD_SHIFT",
            EventKind::NeuroUpdate { .. } => "NEURO_UPDATE",
            EventKind::ToggleAutonomy => "TOGGLE_AUTONOMY",
            EventKind::ToggleChemistry => "TOGGLE_CHEMISTRY",
            EventKind::TogglePoetic => "TOGGLE_POETIC",
            EventKind::StateOverride { .. } => "STATE_OVERRIDE",
            EventKind::GoalFormed { .. } => "GOAL_FORMED",
            EventKind::GoalCompleted => "GOAL_COMPLETED",
            EventKind::Reset => "RESET",
            EventKind::Tick => "TICK",
        }
    }
}

/// An input to the reducer, stamped with the time it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelEvent {
    pub kind: EventKind,
    /// Epoch milliseconds; the only clock the reducer ever sees
    pub timestamp: i64,
}

impl KernelEvent {
    pub fn new(kind: EventKind, timestamp: i64) -> Self {
        Self { kind, timestamp }
    }

    pub fn user_input(text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(EventKind::UserInput { text: text.into() }, timestamp)
    }

    pub fn agent_spoke(
        thought: impl Into<String>,
        speech: impl Into<String>,
        autonomous: bool,
        timestamp: i64,
    ) -> Self {
        Self::new(
            EventKind::AgentSpoke {
                thought: thought.into(),
                speech: speech.into(),
                autonomous,
                degraded: false,
            },
            timestamp,
        )
    }

    pub fn state_override(
        target: impl Into<String>,
        key: impl Into<String>,
        value: f64,
        timestamp: i64,
    ) -> Self {
        Self::new(
            EventKind::StateOverride {
                target: target.into(),
                key: key.into(),
                value,
            },
            timestamp,
        )
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = KernelEvent::user_input("hello", 42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "USER_INPUT");
        assert_eq!(json["kind"]["payload"]["text"], "hello");
        assert_eq!(json["timestamp"], 42);
    }

    #[test]
    fn test_unit_events_parse_without_payload() {
        let event: KernelEvent =
            serde_json::from_str(r#"{"kind":{"type":"SLEEP_START"},"timestamp":5}"#).unwrap();
        assert_eq!(event.kind, EventKind::SleepStart);
        assert_eq!(event.name(), "SLEEP_START");
    }

    #[test]
    fn test_sparse_mood_payload() {
        let event: KernelEvent = serde_json::from_str(
            r#"{"kind":{"type":"MOOD_SHIFT","payload":{"deltas":{"fear":0.2}}},"timestamp":1}"#,
        )
        .unwrap();
        match event.kind {
            EventKind::MoodShift { deltas, trigger } => {
                assert_eq!(deltas.fear, Some(0.2));
                assert_eq!(deltas.curiosity, None);
                assert!(trigger.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
