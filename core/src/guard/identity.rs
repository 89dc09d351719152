//! Identity / persona checks
//!
//! Out-of-character phrasing in speech: the agent calling itself an AI or
//! a language model, assistant filler, or answering to another name.

use regex::Regex;

use super::types::GuardIssue;

/// Swappable persona-drift detector
pub trait IdentityMatcher: Send + Sync {
    /// Issues found in `speech` for an agent called `agent_name`
    fn check(&self, speech: &str, agent_name: &str) -> Vec<GuardIssue>;

    /// Human-readable rules, quoted in corrective prompts
    fn rules(&self) -> Vec<String>;
}

/// A named pattern
#[derive(Debug, Clone)]
pub struct IdentityRule {
    pub name: String,
    pub description: String,
    pattern: Regex,
}

impl IdentityRule {
    pub fn new(name: &str, description: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }
}

/// Default matcher: a fixed rule list plus a self-naming check
#[derive(Debug, Clone)]
pub struct RegexIdentityMatcher {
    rules: Vec<IdentityRule>,
    self_naming: Regex,
}

const DEFAULT_RULES: &[(&str, &str, &str)] = &[
    (
        "ai-self-reference",
        "Never describe yourself as an AI or a program",
        r"(?i)\b(?:as an? (?:ai|artificial intelligence)|i(?:'m| am) (?:just |only )?an? (?:ai|artificial intelligence|computer program|chatbot|bot))\b",
    ),
    (
        "language-model",
        "Never mention language models or training data",
        r"(?i)\b(?:(?:large )?language model|llm|my training data)\b",
    ),
    (
        "assistant-filler",
        "Do not talk like a customer-service assistant",
        r"(?i)(?:how (?:can|may) i (?:help|assist) you(?: today)?|i hope this helps|i'?m (?:here|happy) to (?:help|assist)|as your (?:virtual )?assistant)",
    ),
    (
        "foreign-persona",
        "Never claim to be another product or vendor",
        r"(?i)\b(?:chatgpt|openai|anthropic|claude|gemini|copilot)\b",
    ),
];

impl RegexIdentityMatcher {
    pub fn new() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(name, description, pattern)| {
                IdentityRule::new(name, description, pattern).expect("valid regex")
            })
            .collect();
        Self::with_rules(rules)
    }

    pub fn with_rules(rules: Vec<IdentityRule>) -> Self {
        Self {
            rules,
            self_naming: Regex::new(r"\b(?:[Mm]y name is|[Cc]all me)\s+([A-Z][\w-]*)")
                .expect("valid regex"),
        }
    }

    /// Add a rule on top of the current list
    pub fn with_rule(mut self, rule: IdentityRule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl Default for RegexIdentityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMatcher for RegexIdentityMatcher {
    fn check(&self, speech: &str, agent_name: &str) -> Vec<GuardIssue> {
        let mut issues: Vec<GuardIssue> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.pattern.find(speech).map(|m| GuardIssue::IdentityLeak {
                    rule: rule.name.clone(),
                    matched: m.as_str().to_string(),
                })
            })
            .collect();

        let own_name = agent_name.trim();
        let wrong_name = self
            .self_naming
            .captures_iter(speech)
            .find(|caps| !caps[1].eq_ignore_ascii_case(own_name));
        if let Some(caps) = wrong_name {
            issues.push(GuardIssue::IdentityLeak {
                rule: "wrong-name".to_string(),
                matched: caps[0].to_string(),
            });
        }

        issues
    }

    fn rules(&self) -> Vec<String> {
        let mut rules: Vec<String> = self.rules.iter().map(|r| r.description.clone()).collect();
        rules.push("Only ever call yourself by your own name".to_string());
        rules
    }
}
