//! Guard pipeline value types
//!
//! Everything here lives for one turn at most and is never stored in
//! `KernelState`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::InferenceError;

/// Declared wish to use a tool, subject to policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolIntent {
    pub tool: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub reason: String,
}

impl ToolIntent {
    /// Inline invocation tag, e.g. `[SEARCH: rust borrow checker]`
    pub fn tag(&self) -> String {
        format!("[{}: {}]", self.tool.to_ascii_uppercase(), self.query.trim())
    }
}

/// A fact value as claimed by the model or supplied by the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Text(String),
}

impl FactValue {
    /// Numeric reading; text such as `"23"` or `" 23.0 % "` counts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
            FactValue::Text(s) => s
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite()),
        }
    }

    /// Numbers compare within `tolerance`; anything else compares as
    /// trimmed, case-insensitive text.
    pub fn matches(&self, other: &FactValue, tolerance: f64) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => (a - b).abs() <= tolerance,
            _ => self.to_string().trim().eq_ignore_ascii_case(other.to_string().trim()),
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Number(n) => write!(f, "{}", n),
            FactValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        FactValue::Number(value)
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::Text(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::Text(value)
    }
}

/// The model's self-reported copy of hard facts
pub type FactEcho = BTreeMap<String, FactValue>;

/// Structured output of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    #[serde(alias = "thought")]
    pub internal_thought: String,
    #[serde(alias = "speech")]
    pub speech_content: String,
    #[serde(default, alias = "tool")]
    pub tool_intent: Option<ToolIntent>,
    #[serde(default, alias = "facts")]
    pub fact_echo: Option<FactEcho>,
}

impl StructuredOutput {
    pub fn new(thought: impl Into<String>, speech: impl Into<String>) -> Self {
        Self {
            internal_thought: thought.into(),
            speech_content: speech.into(),
            tool_intent: None,
            fact_echo: None,
        }
    }

    pub fn with_tool_intent(mut self, intent: ToolIntent) -> Self {
        self.tool_intent = Some(intent);
        self
    }

    pub fn with_fact(mut self, name: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.fact_echo
            .get_or_insert_with(FactEcho::new)
            .insert(name.into(), value.into());
        self
    }
}

/// One system-supplied fact the model must not alter
#[derive(Debug, Clone, PartialEq)]
pub struct TrustedFact {
    pub name: String,
    pub value: FactValue,
    /// Words in speech that indicate the text relies on this fact
    pub cues: Vec<String>,
}

/// Trusted fact set for one turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSet {
    facts: Vec<TrustedFact>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a fact. The fact name is always a cue.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FactValue>, cues: &[&str]) -> Self {
        let name = name.into();
        let mut all_cues = vec![name.replace('_', " ").to_lowercase()];
        all_cues.extend(cues.iter().map(|c| c.to_lowercase()));
        self.facts.retain(|f| f.name != name);
        self.facts.push(TrustedFact {
            name,
            value: value.into(),
            cues: all_cues,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&TrustedFact> {
        self.facts.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedFact> {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Why a tool intent was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    UnknownTool,
    LowEnergy { required: f64, current: f64 },
    Cooldown { remaining_ms: i64 },
    QuotaExhausted { quota: u32 },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::UnknownTool => write!(f, "unknown tool"),
            BlockReason::LowEnergy { required, current } => {
                write!(f, "energy {} below minimum {}", current, required)
            }
            BlockReason::Cooldown { remaining_ms } => {
                write!(f, "cooling down for another {}ms", remaining_ms)
            }
            BlockReason::QuotaExhausted { quota } => {
                write!(f, "per-turn quota of {} exhausted", quota)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Something the pipeline found wrong with an attempt
#[derive(Debug, Clone, PartialEq)]
pub enum GuardIssue {
    /// Tool tag inside the planning-only thought (auto-redacted)
    CognitiveViolation { tags: Vec<String> },
    /// Tool intent dropped by policy
    PolicyBlocked { tool: String, reason: BlockReason },
    /// Echoed value disagrees with the trusted value
    FactMutation {
        fact: String,
        expected: FactValue,
        claimed: FactValue,
    },
    /// Relied-upon fact not echoed (strict mode only)
    FactOmission { fact: String, expected: FactValue },
    /// Out-of-character phrasing
    IdentityLeak { rule: String, matched: String },
    /// Output could not be parsed into a structured response
    Malformed { reason: String },
    /// The inference collaborator itself failed
    InferenceFailed { error: InferenceError },
}

impl GuardIssue {
    pub fn severity(&self) -> Severity {
        match self {
            GuardIssue::CognitiveViolation { .. } | GuardIssue::PolicyBlocked { .. } => Severity::Low,
            GuardIssue::FactOmission { .. }
            | GuardIssue::IdentityLeak { .. }
            | GuardIssue::Malformed { .. } => Severity::Medium,
            GuardIssue::FactMutation { .. } => Severity::High,
            GuardIssue::InferenceFailed { .. } => Severity::Critical,
        }
    }

    /// Whether the issue warrants re-invoking inference
    pub fn is_retryable(&self) -> bool {
        match self {
            GuardIssue::CognitiveViolation { .. } | GuardIssue::PolicyBlocked { .. } => false,
            GuardIssue::FactMutation { .. }
            | GuardIssue::FactOmission { .. }
            | GuardIssue::IdentityLeak { .. }
            | GuardIssue::Malformed { .. } => true,
            GuardIssue::InferenceFailed { error } => error.is_retryable(),
        }
    }
}

impl fmt::Display for GuardIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardIssue::CognitiveViolation { tags } => {
                write!(f, "tool tag in internal thought: {}", tags.join(", "))
            }
            GuardIssue::PolicyBlocked { tool, reason } => write!(f, "{} blocked: {}", tool, reason),
            GuardIssue::FactMutation {
                fact,
                expected,
                claimed,
            } => write!(f, "fact '{}' mutated: expected {}, claimed {}", fact, expected, claimed),
            GuardIssue::FactOmission { fact, expected } => {
                write!(f, "fact '{}' relied on but not echoed (expected {})", fact, expected)
            }
            GuardIssue::IdentityLeak { rule, matched } => {
                write!(f, "identity rule '{}' broken by \"{}\"", rule, matched)
            }
            GuardIssue::Malformed { reason } => write!(f, "malformed output: {}", reason),
            GuardIssue::InferenceFailed { error } => write!(f, "{}", error),
        }
    }
}

/// Verdict on one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardAction {
    /// Approved as-is
    Pass,
    /// Approved after in-place corrections (redaction, tool rewrite/drop)
    Modified,
    /// Re-invoke inference with a corrective prompt
    Retry,
    /// Budget exhausted; the fallback response replaces the output
    SoftFail,
}

/// Outcome of evaluating one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct GuardResult {
    pub action: GuardAction,
    /// Corrected output (the fallback on soft-fail, the best effort on retry)
    pub output: StructuredOutput,
    pub issues: Vec<GuardIssue>,
    /// Retries consumed so far this turn
    pub retry_count: u32,
    /// Temperature for the next attempt
    pub temperature: f32,
    pub corrective_prompt: Option<String>,
    /// Tool intent approved by policy, if any
    pub approved_tool: Option<ToolIntent>,
}

/// Terminal status of a turn that did not hard-fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Approved,
    Corrected,
    SoftFailed,
}

impl TurnStatus {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, TurnStatus::Approved)
    }
}

/// What the pipeline hands back to the runtime for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDecision {
    pub output: StructuredOutput,
    pub status: TurnStatus,
    /// Inference calls made
    pub attempts: u32,
    /// Every issue seen across all attempts, in order
    pub issues: Vec<GuardIssue>,
    pub approved_tool: Option<ToolIntent>,
}
