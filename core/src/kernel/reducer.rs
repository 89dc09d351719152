//! State reducer
//!
//! `(state, event) -> (next_state, outputs)`. Total and deterministic: no
//! clock except the event timestamp, no RNG, no IO. A malformed payload
//! degrades to a no-op on the affected fields; it never fails.

use serde_json::json;

use crate::kernel::event::{EmotionDelta, EventKind, KernelEvent, NeuroLevels};
use crate::kernel::history::{push_capped, Message};
use crate::kernel::output::{KernelOutput, LogLevel};
use crate::kernel::state::{
    Association, Emotion, Goal, KernelState, Limbic, Neuro, Soma, Substrate,
    ASSOCIATION_CAP, CONVERSATION_CAP, GOAL_BACKLOG_CAP, GOAL_FORMATION_LIMIT,
    GOAL_FORMATION_WINDOW_MS, THOUGHT_HISTORY_CAP,
};

const USER_INPUT_LOAD: f64 = 5.0;
const TICK_LOAD_DECAY: f64 = 1.0;
const SPEECH_ENERGY_COST: f64 = 1.0;
const TOOL_ENERGY_COST: f64 = 2.0;
const SLEEP_ENERGY_REGEN: f64 = 5.0;
const TICK_BUDGET_REGEN: f64 = 0.25;
const GOAL_SATISFACTION_REWARD: f64 = 0.1;

/// Result of one reducer step
#[derive(Debug, Clone)]
pub struct Transition {
    pub next_state: KernelState,
    pub outputs: Vec<KernelOutput>,
}

impl Transition {
    fn new(next_state: KernelState, outputs: Vec<KernelOutput>) -> Self {
        Self {
            next_state,
            outputs,
        }
    }

    fn silent(next_state: KernelState) -> Self {
        Self::new(next_state, Vec::new())
    }
}

/// Apply one event to a state snapshot.
pub fn reduce(state: &KernelState, event: &KernelEvent) -> Transition {
    let mut next = state.clone();
    let at = event.timestamp;

    match &event.kind {
        EventKind::UserInput { text } => {
            next.consecutive_agent_speeches = 0;
            next.social.unreplied_autonomous = 0;
            next.last_user_interaction_at = Some(at);
            next.silence_started_at = Some(at);
            let max_budget = next.social.max_budget;
            next.social.set_budget(max_budget);
            next.soma.cognitive_load = Soma::BOUND.apply(
                next.soma.cognitive_load,
                next.soma.cognitive_load + USER_INPUT_LOAD,
            );
            push_capped(&mut next.conversation, Message::user(text.clone(), at), CONVERSATION_CAP);
            let outputs = vec![KernelOutput::publish("user.input", json!({ "text": text, "at": at }))];
            Transition::new(next, outputs)
        }

        EventKind::AgentSpoke {
            thought,
            speech,
            autonomous,
            degraded,
        } => {
            next.consecutive_agent_speeches = next.consecutive_agent_speeches.saturating_add(1);
            next.last_speak_at = Some(at);
            next.silence_started_at = Some(at);
            next.soma.energy = Soma::BOUND.apply(next.soma.energy, next.soma.energy - SPEECH_ENERGY_COST);
            if !thought.is_empty() {
                push_capped(&mut next.thoughts, thought.clone(), THOUGHT_HISTORY_CAP);
            }
            if !speech.is_empty() {
                push_capped(&mut next.conversation, Message::agent(speech.clone(), at), CONVERSATION_CAP);
            }
            if *autonomous {
                next.social.unreplied_autonomous = next.social.unreplied_autonomous.saturating_add(1);
                let spent = next.social.speech_budget - next.social.speech_cost;
                next.social.set_budget(spent);
            }
            let outputs = vec![KernelOutput::publish(
                "agent.spoke",
                json!({
                    "speech": speech,
                    "autonomous": autonomous,
                    "degraded": degraded,
                    "at": at,
                }),
            )];
            Transition::new(next, outputs)
        }

        EventKind::ToolResult {
            tool,
            content,
            success,
            document,
        } => {
            next.soma.energy = Soma::BOUND.apply(next.soma.energy, next.soma.energy - TOOL_ENERGY_COST);
            if *success {
                next.ticks_since_reward = 0;
            }
            if let Some(doc) = document.as_ref().filter(|d| !d.trim().is_empty()) {
                next.last_document = Some(doc.clone());
            }
            let line = format!("[{}] {}", tool, content);
            push_capped(&mut next.conversation, Message::tool(line, at), CONVERSATION_CAP);
            Transition::silent(next)
        }

        EventKind::SleepStart => {
            next.soma.sleeping = true;
            next.neuro = Neuro::baseline();
            next.modes.consolidated = false;
            let outputs = vec![
                KernelOutput::info("sleep started; neurochemistry reset to baseline"),
                KernelOutput::BeginDreamConsolidation,
            ];
            Transition::new(next, outputs)
        }

        EventKind::SleepEnd => {
            next.soma.sleeping = false;
            Transition::new(next, vec![KernelOutput::BeginWakeProcess])
        }

        EventKind::DreamConsolidated => {
            if next.soma.sleeping && !next.modes.consolidated {
                next.modes.consolidated = true;
                Transition::new(next, vec![KernelOutput::info("dream consolidation complete")])
            } else {
                Transition::silent(next)
            }
        }

        EventKind::MoodShift { deltas, trigger } => {
            apply_mood_shift(&mut next.limbic, deltas, trigger.as_deref(), at);
            let outputs = vec![KernelOutput::publish(
                "mood.shifted",
                json!({
                    "fear": next.limbic.fear,
                    "curiosity": next.limbic.curiosity,
                    "frustration": next.limbic.frustration,
                    "satisfaction": next.limbic.satisfaction,
                }),
            )];
            Transition::new(next, outputs)
        }

        EventKind::NeuroUpdate { values } => {
            if next.modes.chemistry_enabled {
                apply_neuro_levels(&mut next.neuro, values);
            }
            Transition::silent(next)
        }

        EventKind::ToggleAutonomy => {
            next.modes.autonomy_enabled = !next.modes.autonomy_enabled;
            let enabled = next.modes.autonomy_enabled;
            let outputs = vec![
                KernelOutput::info(format!("autonomy {}", on_off(enabled))),
                KernelOutput::publish("autonomy.changed", json!({ "enabled": enabled })),
            ];
            Transition::new(next, outputs)
        }

        EventKind::ToggleChemistry => {
            next.modes.chemistry_enabled = !next.modes.chemistry_enabled;
            let message = format!("chemistry {}", on_off(next.modes.chemistry_enabled));
            Transition::new(next, vec![KernelOutput::info(message)])
        }

        EventKind::TogglePoetic => {
            next.modes.poetic = !next.modes.poetic;
            let message = format!("poetic mode {}", on_off(next.modes.poetic));
            Transition::new(next, vec![KernelOutput::info(message)])
        }

        EventKind::StateOverride { target, key, value } => {
            match target.as_str() {
                "limbic" => override_field(&mut next.limbic, key, *value),
                "soma" => override_field(&mut next.soma, key, *value),
                "neuro" => override_field(&mut next.neuro, key, *value),
                // Unknown target: documented no-op
                _ => {}
            }
            Transition::silent(next)
        }

        EventKind::GoalFormed { description } => form_goal(next, description, at),

        EventKind::GoalCompleted => {
            let Some(done) = next.goals.active.take() else {
                return Transition::silent(next);
            };
            next.goals.active = next.goals.backlog.pop_front();
            next.ticks_since_reward = 0;
            next.limbic.satisfaction = Limbic::BOUND.apply(
                next.limbic.satisfaction,
                next.limbic.satisfaction + GOAL_SATISFACTION_REWARD,
            );
            let outputs = vec![KernelOutput::publish(
                "goal.completed",
                json!({ "description": done.description, "at": at }),
            )];
            Transition::new(next, outputs)
        }

        EventKind::Reset => {
            let next = KernelState::with_traits(state.traits.clone());
            Transition::new(next, vec![KernelOutput::info("kernel state reset (traits preserved)")])
        }

        EventKind::Tick => {
            next.ticks_since_reward = next.ticks_since_reward.saturating_add(1);
            next.soma.cognitive_load = Soma::BOUND.apply(
                next.soma.cognitive_load,
                next.soma.cognitive_load - TICK_LOAD_DECAY,
            );
            let regen = next.social.speech_budget + TICK_BUDGET_REGEN;
            next.social.set_budget(regen);
            if next.soma.sleeping {
                next.soma.energy = Soma::BOUND.apply(next.soma.energy, next.soma.energy + SLEEP_ENERGY_REGEN);
            }
            Transition::silent(next)
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn override_field<S: Substrate>(substrate: &mut S, key: &str, value: f64) {
    // Unknown key: documented no-op
    if let Some(field) = substrate.field_mut(key) {
        *field = S::BOUND.apply(*field, value);
    }
}

fn apply_mood_shift(limbic: &mut Limbic, deltas: &EmotionDelta, trigger: Option<&str>, at: i64) {
    let pairs = [
        (Emotion::Fear, deltas.fear),
        (Emotion::Curiosity, deltas.curiosity),
        (Emotion::Frustration, deltas.frustration),
        (Emotion::Satisfaction, deltas.satisfaction),
    ];

    let mut dominant: Option<(Emotion, f64)> = None;
    for (emotion, delta) in pairs {
        let Some(delta) = delta.filter(|d| d.is_finite()) else {
            continue;
        };
        let field = limbic.emotion_mut(emotion);
        *field = Limbic::BOUND.apply(*field, *field + delta);
        if dominant.map_or(true, |(_, d)| delta.abs() > d.abs()) {
            dominant = Some((emotion, delta));
        }
    }

    let trigger = trigger.map(str::trim).filter(|t| !t.is_empty());
    if let (Some(trigger), Some((emotion, delta))) = (trigger, dominant) {
        push_capped(
            &mut limbic.associations,
            Association {
                trigger: trigger.to_string(),
                emotion,
                weight: delta.clamp(-1.0, 1.0),
                at,
            },
            ASSOCIATION_CAP,
        );
    }
}

fn apply_neuro_levels(neuro: &mut Neuro, values: &NeuroLevels) {
    for (field, value) in [
        (&mut neuro.dopamine, values.dopamine),
        (&mut neuro.serotonin, values.serotonin),
        (&mut neuro.cortisol, values.cortisol),
        (&mut neuro.oxytocin, values.oxytocin),
    ] {
        if let Some(value) = value {
            *field = Neuro::BOUND.apply(*field, value);
        }
    }
}

fn form_goal(mut next: KernelState, description: &str, at: i64) -> Transition {
    let description = description.trim();
    if description.is_empty() {
        return Transition::silent(next);
    }

    next.goals
        .recent_formations
        .retain(|&t| at - t < GOAL_FORMATION_WINDOW_MS);
    if next.goals.recent_formations.len() >= GOAL_FORMATION_LIMIT {
        let message = format!("goal formation rate-limited: {}", description);
        return Transition::new(next, vec![KernelOutput::log(LogLevel::Warn, message)]);
    }
    next.goals.recent_formations.push(at);

    let goal = Goal {
        description: description.to_string(),
        formed_at: at,
    };
    if next.goals.active.is_none() {
        next.goals.active = Some(goal);
    } else {
        push_capped(&mut next.goals.backlog, goal, GOAL_BACKLOG_CAP);
    }
    let outputs = vec![KernelOutput::publish(
        "goal.formed",
        json!({ "description": description, "at": at }),
    )];
    Transition::new(next, outputs)
}
