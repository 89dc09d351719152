//! Guard & decision pipeline
//!
//! Sits between inference and the user. Checks each structured output for
//! leaked tool calls, policy violations, altered facts and persona drift,
//! and decides whether to pass, correct, retry or fall back.

pub mod cognitive;
pub mod facts;
pub mod identity;
pub mod parser;
pub mod pipeline;
pub mod tools;
pub mod types;

pub use identity::{IdentityMatcher, IdentityRule, RegexIdentityMatcher};
pub use parser::{parse_structured, ParseError};
pub use pipeline::{DecisionPipeline, GuardRequest};
pub use tools::ToolGate;
pub use types::{
    BlockReason, FactEcho, FactSet, FactValue, GuardAction, GuardIssue, GuardResult, Severity,
    StructuredOutput, ToolIntent, TrustedFact, TurnDecision, TurnStatus,
};
