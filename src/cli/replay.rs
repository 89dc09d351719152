//! `animus replay`: feed a recorded event log through the pure kernel

use anyhow::{Context, Result};
use console::Style;
use serde::Deserialize;
use std::path::Path;

use animus_core::kernel::{KernelEngine, KernelEvent, KernelOutput, KernelState};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Events(Vec<KernelEvent>),
    WithState {
        #[serde(default)]
        state: Option<KernelState>,
        events: Vec<KernelEvent>,
    },
}

/// Load a replay file: the optional starting state and the events.
///
/// Accepts a JSON document or JSONL with one event per line.
pub fn load(path: &Path) -> Result<(Option<KernelState>, Vec<KernelEvent>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;

    if let Ok(file) = serde_json::from_str::<ReplayFile>(&content) {
        return Ok(match file {
            ReplayFile::Events(events) => (None, events),
            ReplayFile::WithState { state, events } => (state, events),
        });
    }

    let mut events = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event = serde_json::from_str(line)
            .with_context(|| format!("Invalid event on line {} of {}", n + 1, path.display()))?;
        events.push(event);
    }
    Ok((None, events))
}

/// Run the events; returns the engine for inspection
pub fn run(state: Option<KernelState>, events: Vec<KernelEvent>, verbose: bool) -> KernelEngine {
    let mut engine = KernelEngine::new();
    if let Some(state) = state {
        engine.hydrate(state);
    }

    let dim = Style::new().dim();
    let cyan = Style::new().cyan();
    for event in events {
        let name = event.name();
        let timestamp = event.timestamp;
        let outputs = engine.dispatch(event);
        if verbose {
            println!("{} {}", dim.apply_to(format!("[{:>13}]", timestamp)), cyan.apply_to(name));
            for output in &outputs {
                println!("    -> {}", describe(output));
            }
        }
    }
    engine
}

fn describe(output: &KernelOutput) -> String {
    match output {
        KernelOutput::Publish { topic, payload } => format!("publish {} {}", topic, payload),
        KernelOutput::WriteLog { level, message } => format!("log [{}] {}", level.as_str(), message),
        KernelOutput::BeginDreamConsolidation => "begin dream consolidation".to_string(),
        KernelOutput::BeginWakeProcess => "begin wake process".to_string(),
    }
}

pub fn handle(path: &Path, json: bool) -> Result<()> {
    let (state, events) = load(path)?;
    let count = events.len();
    let engine = run(state, events, !json);
    let state = engine.state();

    if json {
        println!("{}", serde_json::to_string_pretty(&*state)?);
        return Ok(());
    }

    let bold = Style::new().bold();
    println!();
    println!("{} {} event(s)", bold.apply_to("Replayed"), count);
    println!(
        "  energy {:.1}  load {:.1}  sleeping {}  consolidated {}",
        state.soma.energy, state.soma.cognitive_load, state.soma.sleeping, state.modes.consolidated
    );
    println!(
        "  fear {:.2}  curiosity {:.2}  frustration {:.2}  satisfaction {:.2}",
        state.limbic.fear, state.limbic.curiosity, state.limbic.frustration, state.limbic.satisfaction
    );
    println!(
        "  speech budget {:.2}/{:.2}  unreplied {}  goal {}",
        state.social.speech_budget,
        state.social.max_budget,
        state.social.unreplied_autonomous,
        state
            .goals
            .active
            .as_ref()
            .map(|g| g.description.as_str())
            .unwrap_or("-")
    );
    println!("  conversation {} message(s), thoughts {}", state.conversation.len(), state.thoughts.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_plain_event_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            r#"[{"kind":{"type":"USER_INPUT","payload":{"text":"hi"}},"timestamp":1},
                {"kind":{"type":"SLEEP_START"},"timestamp":2}]"#,
        )
        .unwrap();

        let (state, events) = load(&path).unwrap();
        assert!(state.is_none());
        assert_eq!(events.len(), 2);

        let engine = run(state, events, false);
        assert!(engine.state().soma.sleeping);
        assert_eq!(engine.event_history().len(), 2);
    }

    #[test]
    fn test_load_with_starting_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(
            &path,
            r#"{"state":{"soma":{"energy":250}},"events":[{"kind":{"type":"TICK"},"timestamp":5}]}"#,
        )
        .unwrap();

        let (state, events) = load(&path).unwrap();
        let engine = run(state, events, false);
        assert_eq!(engine.state().soma.energy, 100.0);
        assert_eq!(engine.state().ticks_since_reward, 1);
    }

    #[test]
    fn test_load_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            "{\"kind\":{\"type\":\"TOGGLE_AUTONOMY\"},\"timestamp\":1}\n\n{\"kind\":{\"type\":\"TICK\"},\"timestamp\":2}\n",
        )
        .unwrap();

        let (_, events) = load(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].name(), "TICK");
    }

    #[test]
    fn test_bad_jsonl_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"kind\":{\"type\":\"TICK\"},\"timestamp\":2}\nnot json\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
