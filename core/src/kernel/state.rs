//! Kernel state
//!
//! The single mutable record of one agent session. The engine owns it; every
//! other component only ever sees an `Arc<KernelState>` snapshot.
//!
//! Bounded fields are clamped, never rejected. Non-finite candidates leave the
//! current value untouched.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::kernel::history::{truncate_front, Message};

pub const EVENT_HISTORY_CAP: usize = 100;
pub const THOUGHT_HISTORY_CAP: usize = 20;
pub const CONVERSATION_CAP: usize = 50;
pub const ASSOCIATION_CAP: usize = 32;
pub const GOAL_BACKLOG_CAP: usize = 10;
/// Goal formations allowed inside one rolling window
pub const GOAL_FORMATION_LIMIT: usize = 3;
pub const GOAL_FORMATION_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Declared range of a substrate field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// `[0, 1]` - emotions and traits
    Unit,
    /// `[0, 100]` - body and neurochemistry
    Percent,
}

impl Bound {
    pub fn max(self) -> f64 {
        match self {
            Bound::Unit => 1.0,
            Bound::Percent => 100.0,
        }
    }

    pub fn contains(self, value: f64) -> bool {
        value.is_finite() && (0.0..=self.max()).contains(&value)
    }

    /// Clamp `candidate` into range; keep `current` if `candidate` is NaN/inf.
    pub fn apply(self, current: f64, candidate: f64) -> f64 {
        if candidate.is_finite() {
            candidate.clamp(0.0, self.max())
        } else {
            self.sanitize(current)
        }
    }

    /// Force a possibly-corrupt value back into range.
    pub fn sanitize(self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(0.0, self.max())
        } else {
            0.0
        }
    }
}

/// A substrate whose fields can be addressed by name (state overrides).
pub trait Substrate {
    const BOUND: Bound;

    fn field_mut(&mut self, key: &str) -> Option<&mut f64>;

    fn fields(&self) -> Vec<f64>;

    fn clamp_all(&mut self);
}

/// Emotion dimensions the limbic substrate tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Fear,
    Curiosity,
    Frustration,
    Satisfaction,
}

/// One learned link between a trigger and an emotional response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub trigger: String,
    pub emotion: Emotion,
    /// Signed strength of the response, clamped to `[-1, 1]`
    pub weight: f64,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limbic {
    pub fear: f64,
    pub curiosity: f64,
    pub frustration: f64,
    pub satisfaction: f64,
    pub associations: VecDeque<Association>,
}

impl Default for Limbic {
    fn default() -> Self {
        Self {
            fear: 0.1,
            curiosity: 0.5,
            frustration: 0.0,
            satisfaction: 0.5,
            associations: VecDeque::new(),
        }
    }
}

impl Limbic {
    pub fn emotion_mut(&mut self, emotion: Emotion) -> &mut f64 {
        match emotion {
            Emotion::Fear => &mut self.fear,
            Emotion::Curiosity => &mut self.curiosity,
            Emotion::Frustration => &mut self.frustration,
            Emotion::Satisfaction => &mut self.satisfaction,
        }
    }
}

impl Substrate for Limbic {
    const BOUND: Bound = Bound::Unit;

    fn field_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            "fear" => Some(&mut self.fear),
            "curiosity" => Some(&mut self.curiosity),
            "frustration" => Some(&mut self.frustration),
            "satisfaction" => Some(&mut self.satisfaction),
            _ => None,
        }
    }

    fn fields(&self) -> Vec<f64> {
        vec![self.fear, self.curiosity, self.frustration, self.satisfaction]
    }

    fn clamp_all(&mut self) {
        for value in [
            &mut self.fear,
            &mut self.curiosity,
            &mut self.frustration,
            &mut self.satisfaction,
        ] {
            *value = Self::BOUND.sanitize(*value);
        }
        for assoc in self.associations.iter_mut() {
            assoc.weight = if assoc.weight.is_finite() {
                assoc.weight.clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
        truncate_front(&mut self.associations, ASSOCIATION_CAP);
    }
}

/// Body state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Soma {
    pub energy: f64,
    pub cognitive_load: f64,
    pub sleeping: bool,
}

impl Default for Soma {
    fn default() -> Self {
        Self {
            energy: 100.0,
            cognitive_load: 0.0,
            sleeping: false,
        }
    }
}

impl Substrate for Soma {
    const BOUND: Bound = Bound::Percent;

    fn field_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            "energy" => Some(&mut self.energy),
            "cognitive_load" | "cognitiveLoad" => Some(&mut self.cognitive_load),
            _ => None,
        }
    }

    fn fields(&self) -> Vec<f64> {
        vec![self.energy, self.cognitive_load]
    }

    fn clamp_all(&mut self) {
        self.energy = Self::BOUND.sanitize(self.energy);
        self.cognitive_load = Self::BOUND.sanitize(self.cognitive_load);
    }
}

/// Neurochemical analogs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Neuro {
    pub dopamine: f64,
    pub serotonin: f64,
    pub cortisol: f64,
    pub oxytocin: f64,
}

impl Neuro {
    /// Levels restored at the start of every sleep
    pub fn baseline() -> Self {
        Self {
            dopamine: 50.0,
            serotonin: 50.0,
            cortisol: 20.0,
            oxytocin: 40.0,
        }
    }
}

impl Default for Neuro {
    fn default() -> Self {
        Self::baseline()
    }
}

impl Substrate for Neuro {
    const BOUND: Bound = Bound::Percent;

    fn field_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            "dopamine" => Some(&mut self.dopamine),
            "serotonin" => Some(&mut self.serotonin),
            "cortisol" => Some(&mut self.cortisol),
            "oxytocin" => Some(&mut self.oxytocin),
            _ => None,
        }
    }

    fn fields(&self) -> Vec<f64> {
        vec![self.dopamine, self.serotonin, self.cortisol, self.oxytocin]
    }

    fn clamp_all(&mut self) {
        for value in [
            &mut self.dopamine,
            &mut self.serotonin,
            &mut self.cortisol,
            &mut self.oxytocin,
        ] {
            *value = Self::BOUND.sanitize(*value);
        }
    }
}

/// Personality weights. Evolved outside the kernel; survives `Reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitVector {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl Default for TraitVector {
    fn default() -> Self {
        Self {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

impl TraitVector {
    fn clamp_all(&mut self) {
        for value in [
            &mut self.openness,
            &mut self.conscientiousness,
            &mut self.extraversion,
            &mut self.agreeableness,
            &mut self.neuroticism,
        ] {
            *value = Bound::Unit.sanitize(*value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    pub formed_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Goals {
    pub active: Option<Goal>,
    pub backlog: VecDeque<Goal>,
    pub recent_formations: Vec<i64>,
}

impl Goals {
    /// Formations still inside the rate-limit window at `now`
    pub fn formations_since(&self, now: i64) -> usize {
        self.recent_formations
            .iter()
            .filter(|&&t| now - t < GOAL_FORMATION_WINDOW_MS)
            .count()
    }
}

/// Autonomous speech economy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Social {
    /// Budget spent per autonomous utterance
    pub speech_cost: f64,
    pub speech_budget: f64,
    pub max_budget: f64,
    /// Autonomous utterances since the user last replied
    pub unreplied_autonomous: u32,
}

impl Default for Social {
    fn default() -> Self {
        Self {
            speech_cost: 1.0,
            speech_budget: 5.0,
            max_budget: 5.0,
            unreplied_autonomous: 0,
        }
    }
}

impl Social {
    pub fn can_afford_speech(&self) -> bool {
        self.speech_budget >= self.speech_cost
    }

    /// Clamp `candidate` into `[0, max_budget]`.
    pub fn set_budget(&mut self, candidate: f64) {
        if candidate.is_finite() {
            self.speech_budget = candidate.clamp(0.0, self.max_budget);
        }
    }

    fn clamp_all(&mut self) {
        if !self.max_budget.is_finite() || self.max_budget < 0.0 {
            self.max_budget = Social::default().max_budget;
        }
        if !self.speech_cost.is_finite() || self.speech_cost < 0.0 {
            self.speech_cost = Social::default().speech_cost;
        }
        self.speech_budget = if self.speech_budget.is_finite() {
            self.speech_budget.clamp(0.0, self.max_budget)
        } else {
            self.max_budget
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modes {
    pub autonomy_enabled: bool,
    pub poetic: bool,
    pub chemistry_enabled: bool,
    /// Dream consolidation already ran during the current sleep
    pub consolidated: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            autonomy_enabled: true,
            poetic: false,
            chemistry_enabled: true,
            consolidated: false,
        }
    }
}

/// Complete runtime state of one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelState {
    pub limbic: Limbic,
    pub soma: Soma,
    pub neuro: Neuro,
    pub traits: TraitVector,
    pub goals: Goals,
    pub social: Social,
    pub modes: Modes,

    pub last_speak_at: Option<i64>,
    pub silence_started_at: Option<i64>,
    pub last_user_interaction_at: Option<i64>,
    pub consecutive_agent_speeches: u32,
    pub ticks_since_reward: u64,
    pub thoughts: VecDeque<String>,
    pub conversation: VecDeque<Message>,
    pub last_document: Option<String>,
}

impl KernelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default state carrying an existing trait vector
    pub fn with_traits(traits: TraitVector) -> Self {
        Self {
            traits,
            ..Self::default()
        }
    }

    /// Bring an untrusted value (e.g. a persisted blob) back inside every
    /// invariant: bounds, history caps, exclusive active goal.
    pub fn sanitized(mut self) -> Self {
        self.limbic.clamp_all();
        self.soma.clamp_all();
        self.neuro.clamp_all();
        self.traits.clamp_all();
        self.social.clamp_all();
        truncate_front(&mut self.thoughts, THOUGHT_HISTORY_CAP);
        truncate_front(&mut self.conversation, CONVERSATION_CAP);
        truncate_front(&mut self.goals.backlog, GOAL_BACKLOG_CAP);
        if self.goals.active.is_none() {
            self.goals.active = self.goals.backlog.pop_front();
        }
        self
    }

    /// True when every bounded field is inside its declared range and every
    /// history respects its cap.
    pub fn within_bounds(&self) -> bool {
        let substrates = self.limbic.fields().into_iter().all(|v| Limbic::BOUND.contains(v))
            && self.soma.fields().into_iter().all(|v| Soma::BOUND.contains(v))
            && self.neuro.fields().into_iter().all(|v| Neuro::BOUND.contains(v));
        let traits = [
            self.traits.openness,
            self.traits.conscientiousness,
            self.traits.extraversion,
            self.traits.agreeableness,
            self.traits.neuroticism,
        ]
        .into_iter()
        .all(|v| Bound::Unit.contains(v));
        let social = self.social.speech_budget >= 0.0
            && self.social.speech_budget <= self.social.max_budget;
        let histories = self.thoughts.len() <= THOUGHT_HISTORY_CAP
            && self.conversation.len() <= CONVERSATION_CAP
            && self.limbic.associations.len() <= ASSOCIATION_CAP
            && self.goals.backlog.len() <= GOAL_BACKLOG_CAP;
        substrates && traits && social && histories
    }

    /// Milliseconds the conversation has been quiet at `now`.
    ///
    /// Measured from the last user interaction, falling back to the start of
    /// the current silence window. `None` when neither has happened yet.
    pub fn silence_ms(&self, now: i64) -> Option<i64> {
        self.last_user_interaction_at
            .or(self.silence_started_at)
            .map(|since| (now - since).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_within_bounds() {
        assert!(KernelState::new().within_bounds());
    }

    #[test]
    fn test_bound_apply_ignores_non_finite() {
        assert_eq!(Bound::Unit.apply(0.4, f64::NAN), 0.4);
        assert_eq!(Bound::Unit.apply(0.4, 3.0), 1.0);
        assert_eq!(Bound::Percent.apply(10.0, -5.0), 0.0);
        assert_eq!(Bound::Percent.apply(10.0, f64::INFINITY), 10.0);
    }

    #[test]
    fn test_sanitized_repairs_corrupt_blob() {
        let mut state = KernelState::new();
        state.limbic.fear = 7.0;
        state.soma.energy = -30.0;
        state.neuro.cortisol = f64::NAN;
        state.traits.openness = 1.5;
        state.social.speech_budget = 99.0;
        for i in 0..40 {
            state.thoughts.push_back(format!("t{}", i));
        }
        state.goals.backlog.push_back(Goal {
            description: "learn".into(),
            formed_at: 1,
        });

        let state = state.sanitized();
        assert!(state.within_bounds());
        assert_eq!(state.limbic.fear, 1.0);
        assert_eq!(state.soma.energy, 0.0);
        assert_eq!(state.neuro.cortisol, 0.0);
        assert_eq!(state.thoughts.len(), THOUGHT_HISTORY_CAP);
        assert_eq!(state.thoughts.front().map(String::as_str), Some("t20"));
        assert_eq!(state.goals.active.as_ref().map(|g| g.description.as_str()), Some("learn"));
        assert!(state.goals.backlog.is_empty());
    }

    #[test]
    fn test_silence_prefers_last_user_interaction() {
        let mut state = KernelState::new();
        assert_eq!(state.silence_ms(1_000), None);
        state.silence_started_at = Some(500);
        assert_eq!(state.silence_ms(1_000), Some(500));
        state.last_user_interaction_at = Some(900);
        assert_eq!(state.silence_ms(1_000), Some(100));
    }

    #[test]
    fn test_state_deserializes_with_missing_fields() {
        let state: KernelState = serde_json::from_str(r#"{"soma":{"energy":12.0}}"#).unwrap();
        assert_eq!(state.soma.energy, 12.0);
        assert_eq!(state.soma.cognitive_load, 0.0);
        assert_eq!(state.neuro, Neuro::baseline());
    }
}
