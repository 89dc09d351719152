//! Decision pipeline
//!
//! Every attempt goes through four stages in order: cognitive separation,
//! tool policy, fact echo and identity. Retryable issues re-invoke
//! inference at a lower temperature with a corrective prompt until the
//! per-agent budget runs out.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cognitive::redact_thought;
use super::facts::check_facts;
use super::identity::{IdentityMatcher, RegexIdentityMatcher};
use super::parser::parse_structured;
use super::tools::ToolGate;
use super::types::{
    FactSet, GuardAction, GuardIssue, GuardResult, StructuredOutput, TurnDecision, TurnStatus,
};
use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::runtime::{InferenceCapability, InferenceRequest, RuntimeContext};

/// Per-turn inputs to the guard
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub agent_id: String,
    pub agent_name: String,
    /// Current energy, 0-100
    pub energy: f64,
    /// Clock reading for cooldowns, epoch ms
    pub now_ms: i64,
    pub facts: FactSet,
    /// `None` falls back to `GuardConfig::strict_facts`
    pub strict_facts: Option<bool>,
}

impl GuardRequest {
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            energy: 100.0,
            now_ms: 0,
            facts: FactSet::new(),
            strict_facts: None,
        }
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy;
        self
    }

    pub fn at(mut self, now_ms: i64) -> Self {
        self.now_ms = now_ms;
        self
    }

    pub fn with_facts(mut self, facts: FactSet) -> Self {
        self.facts = facts;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_facts = Some(strict);
        self
    }
}

pub struct DecisionPipeline {
    config: GuardConfig,
    tools: ToolGate,
    identity: Arc<dyn IdentityMatcher>,
    /// Agent id -> retries consumed this turn
    retries: Mutex<HashMap<String, u32>>,
}

impl DecisionPipeline {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            tools: ToolGate::new(),
            identity: Arc::new(RegexIdentityMatcher::new()),
            retries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_identity_matcher(mut self, matcher: Arc<dyn IdentityMatcher>) -> Self {
        self.identity = matcher;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Start a turn: zero the retry counter and the tool quota
    pub fn begin_turn(&self, agent_id: &str) {
        self.retries.lock().insert(agent_id.to_string(), 0);
        self.tools.begin_turn(agent_id);
    }

    pub fn retry_count(&self, agent_id: &str) -> u32 {
        self.retries.lock().get(agent_id).copied().unwrap_or(0)
    }

    /// Drop all guard state for one agent
    pub fn reset_agent(&self, agent_id: &str) {
        self.retries.lock().remove(agent_id);
        self.tools.reset_agent(agent_id);
    }

    pub fn reset_all(&self) {
        self.retries.lock().clear();
        self.tools.reset_all();
    }

    /// Evaluate one raw inference output
    pub fn evaluate(&self, raw: &str, req: &GuardRequest) -> GuardResult {
        let mut issues = Vec::new();

        let mut output = match parse_structured(raw) {
            Ok(output) => output,
            Err(e) => {
                issues.push(GuardIssue::Malformed { reason: e.to_string() });
                return self.decide(StructuredOutput::new("", ""), issues, req);
            }
        };

        if let Some(issue) = redact_thought(&mut output, &self.config.redaction_marker) {
            issues.push(issue);
        }
        if let Some(issue) = self
            .tools
            .review(&mut output, &req.agent_id, req.energy, req.now_ms, &self.config)
        {
            issues.push(issue);
        }
        let strict = req.strict_facts.unwrap_or(self.config.strict_facts);
        issues.extend(check_facts(&output, &req.facts, self.config.fact_tolerance, strict));
        issues.extend(self.identity.check(&output.speech_content, &req.agent_name));

        self.decide(output, issues, req)
    }

    fn decide(&self, output: StructuredOutput, issues: Vec<GuardIssue>, req: &GuardRequest) -> GuardResult {
        if !issues.iter().any(GuardIssue::is_retryable) {
            if let Some(intent) = &output.tool_intent {
                self.tools.record_use(&req.agent_id, &intent.tool, req.now_ms);
            }
            let retry_count = self.retry_count(&req.agent_id);
            return GuardResult {
                action: if issues.is_empty() {
                    GuardAction::Pass
                } else {
                    GuardAction::Modified
                },
                approved_tool: output.tool_intent.clone(),
                output,
                issues,
                retry_count,
                temperature: self.config.temperature_for_retry(retry_count),
                corrective_prompt: None,
            };
        }

        match self.consume_retry(&req.agent_id) {
            Ok(retry_count) => {
                let corrective_prompt = self.corrective_prompt(&issues);
                GuardResult {
                    action: GuardAction::Retry,
                    output: StructuredOutput {
                        tool_intent: None,
                        ..output
                    },
                    issues,
                    retry_count,
                    temperature: self.config.temperature_for_retry(retry_count),
                    corrective_prompt: Some(corrective_prompt),
                    approved_tool: None,
                }
            }
            Err(retry_count) => GuardResult {
                action: GuardAction::SoftFail,
                output: StructuredOutput::new(output.internal_thought, self.config.fallback_response.clone()),
                issues,
                retry_count,
                temperature: self.config.temperature_for_retry(retry_count),
                corrective_prompt: None,
                approved_tool: None,
            },
        }
    }

    /// `Ok(new count)` if the budget allowed another attempt, else
    /// `Err(current count)`
    fn consume_retry(&self, agent_id: &str) -> Result<u32, u32> {
        let mut retries = self.retries.lock();
        let count = retries.entry(agent_id.to_string()).or_insert(0);
        if *count < self.config.max_retries {
            *count += 1;
            Ok(*count)
        } else {
            Err(*count)
        }
    }

    /// Deterministic instructions for the next attempt
    pub fn corrective_prompt(&self, issues: &[GuardIssue]) -> String {
        let mut prompt = String::from("Your previous response was rejected. Correct the following and answer again:\n");
        let mut identity_broken = false;

        for issue in issues.iter().filter(|i| i.is_retryable()) {
            let _ = match issue {
                GuardIssue::FactMutation {
                    fact,
                    expected,
                    claimed,
                } => writeln!(prompt, "- Fact '{}' is {} (you said {}). Use the true value.", fact, expected, claimed),
                GuardIssue::FactOmission { fact, expected } => writeln!(
                    prompt,
                    "- You relied on '{}' without echoing it. Include \"{}\": {} in fact_echo.",
                    fact, fact, expected
                ),
                GuardIssue::IdentityLeak { matched, .. } => {
                    identity_broken = true;
                    writeln!(prompt, "- You broke character with \"{}\".", matched)
                }
                GuardIssue::Malformed { reason } => writeln!(
                    prompt,
                    "- Reply with one JSON object containing internal_thought and speech_content ({}).",
                    reason
                ),
                GuardIssue::InferenceFailed { .. } => Ok(()),
                GuardIssue::CognitiveViolation { .. } | GuardIssue::PolicyBlocked { .. } => Ok(()),
            };
        }

        if identity_broken {
            prompt.push_str("Identity rules:\n");
            for rule in self.identity.rules() {
                let _ = writeln!(prompt, "- {}", rule);
            }
        }

        prompt.trim_end().to_string()
    }

    /// Run a full turn: infer, evaluate, retry until approved, soft-failed
    /// or hard-failed.
    pub async fn run(
        &self,
        inference: &dyn InferenceCapability,
        ctx: &RuntimeContext,
        mut request: InferenceRequest,
        guard: &GuardRequest,
    ) -> Result<TurnDecision, GuardError> {
        self.begin_turn(&guard.agent_id);
        request.facts = guard.facts.clone();
        request.temperature = self.config.temperature_for_retry(0);

        let mut attempts = 0u32;
        let mut all_issues = Vec::new();

        loop {
            attempts += 1;
            debug!(
                trace_id = %ctx.trace_id,
                agent = %guard.agent_id,
                attempt = attempts,
                temperature = request.temperature,
                "inference attempt"
            );

            let raw = match inference.infer(ctx, request.clone()).await {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(trace_id = %ctx.trace_id, attempt = attempts, %error, "inference failed");
                    all_issues.push(GuardIssue::InferenceFailed { error: error.clone() });
                    if !error.is_retryable() {
                        return Err(GuardError::HardFail { attempts, source: error });
                    }
                    match self.consume_retry(&guard.agent_id) {
                        Ok(retry) => {
                            request.temperature = self.config.temperature_for_retry(retry);
                            continue;
                        }
                        Err(_) => return Err(GuardError::HardFail { attempts, source: error }),
                    }
                }
            };

            let result = self.evaluate(&raw, guard);
            for issue in &result.issues {
                debug!(trace_id = %ctx.trace_id, attempt = attempts, %issue, "guard issue");
            }
            all_issues.extend(result.issues);

            let status = match result.action {
                GuardAction::Retry => {
                    request.temperature = result.temperature;
                    request.corrective_prompt = result.corrective_prompt;
                    continue;
                }
                GuardAction::Pass => TurnStatus::Approved,
                GuardAction::Modified => TurnStatus::Corrected,
                GuardAction::SoftFail => {
                    warn!(trace_id = %ctx.trace_id, attempts, "retry budget exhausted, using fallback");
                    TurnStatus::SoftFailed
                }
            };

            return Ok(TurnDecision {
                output: result.output,
                status,
                attempts,
                issues: all_issues,
                approved_tool: result.approved_tool,
            });
        }
    }
}
