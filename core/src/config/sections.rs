//! Configuration sections

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Who the agent is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Partition key for per-agent guard state
    pub id: String,
    /// Name the agent must answer to; anything else is persona drift
    pub name: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            name: "Animus".to_string(),
        }
    }
}

impl AgentSection {
    pub(crate) fn merge(&mut self, other: Self) {
        if !other.id.trim().is_empty() {
            self.id = other.id;
        }
        if !other.name.trim().is_empty() {
            self.name = other.name;
        }
    }
}

/// Usage policy for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Tag name as it appears in speech, e.g. `SEARCH` in `[SEARCH: ...]`
    pub name: String,
    /// Minimum energy (0-100) required to use the tool
    pub min_energy: f64,
    /// Minimum time between two uses by the same agent
    pub cooldown_ms: u64,
}

impl ToolPolicy {
    pub fn new(name: impl Into<String>, min_energy: f64, cooldown_ms: u64) -> Self {
        Self {
            name: name.into(),
            min_energy,
            cooldown_ms,
        }
    }
}

/// Guard & decision pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Re-invocations allowed after the first attempt
    pub max_retries: u32,
    /// Sampling temperature of the first attempt
    pub base_temperature: f32,
    /// Subtracted from the temperature on every retry
    pub temperature_decrement: f32,
    pub min_temperature: f32,
    /// Absolute tolerance when comparing numeric fact echoes
    pub fact_tolerance: f64,
    /// Whether a missing echo for a relied-upon fact is retryable when the
    /// caller does not say otherwise
    pub strict_facts: bool,
    pub tool_quota_per_turn: u32,
    pub tools: Vec<ToolPolicy>,
    /// Deterministic reply used once the retry budget is exhausted
    pub fallback_response: String,
    /// Replaces tool tags found inside internal thoughts
    pub redaction_marker: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_temperature: 0.7,
            temperature_decrement: 0.15,
            min_temperature: 0.1,
            fact_tolerance: 0.01,
            strict_facts: false,
            tool_quota_per_turn: 1,
            tools: vec![
                ToolPolicy::new("SEARCH", 10.0, 60_000),
                ToolPolicy::new("READ", 5.0, 30_000),
                ToolPolicy::new("RECALL", 2.0, 10_000),
            ],
            fallback_response: "Sorry, I lost my train of thought for a moment. Could you say that again?"
                .to_string(),
            redaction_marker: "[REDACTED_TOOL_CALL]".to_string(),
        }
    }
}

impl GuardConfig {
    pub fn tool(&self, name: &str) -> Option<&ToolPolicy> {
        self.tools
            .iter()
            .find(|policy| policy.name.eq_ignore_ascii_case(name))
    }

    /// Temperature to use for attempt `retry` (0 = first attempt)
    pub fn temperature_for_retry(&self, retry: u32) -> f32 {
        let decayed = self.base_temperature - self.temperature_decrement * retry as f32;
        decayed.max(self.min_temperature)
    }

    pub(crate) fn merge(&mut self, other: Self) {
        let tools = if other.tools.is_empty() {
            std::mem::take(&mut self.tools)
        } else {
            other.tools
        };
        *self = Self { tools, ..other };
    }
}

/// Autonomy tick settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Tick interval at full energy
    pub base_interval_ms: u64,
    /// Tick interval at zero energy
    pub max_interval_ms: u64,
    /// Quiet time required before the agent may speak unprompted
    pub min_silence_ms: u64,
    /// Autonomous utterances allowed without a user reply
    pub max_unreplied: u32,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 30_000,
            max_interval_ms: 180_000,
            min_silence_ms: 45_000,
            max_unreplied: 3,
        }
    }
}

impl AutonomyConfig {
    /// Lower energy stretches the interval linearly up to `max_interval_ms`.
    pub fn interval_for_energy(&self, energy: f64) -> Duration {
        let energy = if energy.is_finite() { energy.clamp(0.0, 100.0) } else { 0.0 };
        let fatigue = 1.0 - energy / 100.0;
        let span = self.max_interval_ms.saturating_sub(self.base_interval_ms) as f64;
        let ms = self.base_interval_ms as f64 + span * fatigue;
        Duration::from_millis(ms.round() as u64)
    }
}

/// Memory / cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Query semantic memory before each turn
    pub recall_enabled: bool,
    /// Memories requested per recall
    pub recall_limit: usize,
    /// TTL for derived lookups
    pub lookup_ttl_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_enabled: true,
            recall_limit: 5,
            lookup_ttl_ms: 60_000,
        }
    }
}

/// Kernel log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Entries kept in the in-memory ring buffer
    pub ring_buffer_size: usize,
    /// Also append kernel log lines to this file
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            ring_buffer_size: 1000,
            log_file: None,
        }
    }
}

impl LoggingConfig {
    pub(crate) fn merge(&mut self, other: Self) {
        self.ring_buffer_size = other.ring_buffer_size;
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_grows_as_energy_drops() {
        let config = AutonomyConfig::default();
        assert_eq!(config.interval_for_energy(100.0), Duration::from_millis(30_000));
        assert_eq!(config.interval_for_energy(0.0), Duration::from_millis(180_000));
        assert!(config.interval_for_energy(20.0) > config.interval_for_energy(80.0));
        assert_eq!(config.interval_for_energy(f64::NAN), Duration::from_millis(180_000));
    }

    #[test]
    fn test_temperature_decays_to_floor() {
        let guard = GuardConfig::default();
        assert!((guard.temperature_for_retry(0) - 0.7).abs() < 1e-6);
        assert!((guard.temperature_for_retry(1) - 0.55).abs() < 1e-6);
        assert!((guard.temperature_for_retry(10) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_tool_lookup_is_case_insensitive() {
        let guard = GuardConfig::default();
        assert_eq!(guard.tool("search").map(|t| t.min_energy), Some(10.0));
        assert!(guard.tool("SHELL").is_none());
    }

    #[test]
    fn test_guard_merge_keeps_tools_when_other_has_none() {
        let mut guard = GuardConfig::default();
        let other = GuardConfig {
            max_retries: 5,
            tools: Vec::new(),
            ..GuardConfig::default()
        };
        guard.merge(other);
        assert_eq!(guard.max_retries, 5);
        assert_eq!(guard.tools.len(), 3);
    }
}
