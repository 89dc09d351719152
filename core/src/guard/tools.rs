//! Tool usage policy
//!
//! Per-agent cooldowns and per-turn quotas. A tool is used only through an
//! approved intent; an inline `[TOOL: ...]` tag in speech counts as an
//! intent and goes through the same checks.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::cognitive::tag_pattern;
use super::types::{BlockReason, GuardIssue, StructuredOutput, ToolIntent};
use crate::config::GuardConfig;

#[derive(Debug, Default)]
struct AgentTools {
    /// Tool name (uppercase) -> last approved use, epoch ms
    last_used: HashMap<String, i64>,
    used_this_turn: u32,
}

/// Tool gate, partitioned by agent id
#[derive(Debug, Default)]
pub struct ToolGate {
    agents: Mutex<HashMap<String, AgentTools>>,
}

impl ToolGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the per-turn quota; cooldowns carry over
    pub fn begin_turn(&self, agent_id: &str) {
        if let Some(agent) = self.agents.lock().get_mut(agent_id) {
            agent.used_this_turn = 0;
        }
    }

    /// Read-only policy check
    pub fn check(
        &self,
        agent_id: &str,
        tool: &str,
        energy: f64,
        now_ms: i64,
        config: &GuardConfig,
    ) -> Result<(), BlockReason> {
        let policy = config.tool(tool).ok_or(BlockReason::UnknownTool)?;

        if !(energy >= policy.min_energy) {
            return Err(BlockReason::LowEnergy {
                required: policy.min_energy,
                current: energy,
            });
        }

        let agents = self.agents.lock();
        if let Some(agent) = agents.get(agent_id) {
            if agent.used_this_turn >= config.tool_quota_per_turn {
                return Err(BlockReason::QuotaExhausted {
                    quota: config.tool_quota_per_turn,
                });
            }
            if let Some(last) = agent.last_used.get(&policy.name.to_ascii_uppercase()) {
                let ready_at = last.saturating_add(policy.cooldown_ms as i64);
                if now_ms < ready_at {
                    return Err(BlockReason::Cooldown {
                        remaining_ms: ready_at - now_ms,
                    });
                }
            }
        } else if config.tool_quota_per_turn == 0 {
            return Err(BlockReason::QuotaExhausted { quota: 0 });
        }
        Ok(())
    }

    /// Record an approved use: starts the cooldown and spends quota
    pub fn record_use(&self, agent_id: &str, tool: &str, now_ms: i64) {
        let mut agents = self.agents.lock();
        let agent = agents.entry(agent_id.to_string()).or_default();
        agent.last_used.insert(tool.to_ascii_uppercase(), now_ms);
        agent.used_this_turn += 1;
    }

    /// Apply the policy to one attempt's output, in place.
    ///
    /// On approval `output.tool_intent` holds the approved intent and the
    /// speech carries its tag. On a block the intent is dropped and every
    /// tool tag is stripped from speech. Nothing is recorded here; the
    /// pipeline records the use once the attempt is accepted.
    pub fn review(
        &self,
        output: &mut StructuredOutput,
        agent_id: &str,
        energy: f64,
        now_ms: i64,
        config: &GuardConfig,
    ) -> Option<GuardIssue> {
        let mut intent = output
            .tool_intent
            .take()
            .or_else(|| first_inline_intent(&output.speech_content, config))?;
        intent.tool = intent.tool.trim().to_ascii_uppercase();

        match self.check(agent_id, &intent.tool, energy, now_ms, config) {
            Ok(()) => {
                let mut speech = strip_tool_tags(&output.speech_content, Some(&intent.tool), config);
                if !has_tag_for(&speech, &intent.tool) {
                    if !speech.is_empty() {
                        speech.push(' ');
                    }
                    speech.push_str(&intent.tag());
                }
                output.speech_content = speech;
                output.tool_intent = Some(intent);
                None
            }
            Err(reason) => {
                tracing::debug!(agent = agent_id, tool = %intent.tool, %reason, "tool intent blocked");
                output.speech_content = strip_tool_tags(&output.speech_content, None, config);
                Some(GuardIssue::PolicyBlocked {
                    tool: intent.tool,
                    reason,
                })
            }
        }
    }

    pub fn reset_agent(&self, agent_id: &str) {
        self.agents.lock().remove(agent_id);
    }

    pub fn reset_all(&self) {
        self.agents.lock().clear();
    }
}

fn is_tool_tag(name: &str, config: &GuardConfig) -> bool {
    config.tool(name).is_some()
}

fn first_inline_intent(speech: &str, config: &GuardConfig) -> Option<ToolIntent> {
    tag_pattern()
        .captures_iter(speech)
        .find(|caps| is_tool_tag(&caps[1], config))
        .map(|caps| {
            let whole = &caps[0];
            let query = whole[caps[1].len() + 2..whole.len() - 1].trim().to_string();
            ToolIntent {
                tool: caps[1].to_string(),
                query,
                reason: String::new(),
            }
        })
}

fn has_tag_for(speech: &str, tool: &str) -> bool {
    tag_pattern()
        .captures_iter(speech)
        .any(|caps| caps[1].eq_ignore_ascii_case(tool))
}

/// Remove configured tool tags, except those for `keep`
fn strip_tool_tags(speech: &str, keep: Option<&str>, config: &GuardConfig) -> String {
    let stripped = tag_pattern().replace_all(speech, |caps: &regex::Captures| {
        let name = &caps[1];
        let kept = keep.is_some_and(|k| k.eq_ignore_ascii_case(name));
        if kept || !is_tool_tag(name, config) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
