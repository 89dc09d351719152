//! `animus chat`: drive the full runtime from the terminal
//!
//! Uses the offline model, so it runs without any provider. Every user line
//! is also stored as a memory for later recall.

use anyhow::{Context, Result};
use async_trait::async_trait;
use console::Style;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use animus_core::error::SinkError;
use animus_core::kernel::{EventKind, KernelEvent, KernelState, LogLevel};
use animus_core::runtime::impls::{EchoInference, InMemoryVectorSearch, LogSink};
use animus_core::runtime::{
    Capability, Clock, OutputSink, RuntimeContext, RuntimeLoop, SystemClock, TickOutcome,
};
use animus_core::{AnimusConfig, RuntimeError, TurnOutcome};

/// Prints what the agent says; everything else goes to [`LogSink`]
#[derive(Debug, Default)]
pub struct ConsoleSink {
    inner: LogSink,
}

impl Capability for ConsoleSink {
    fn name(&self) -> &'static str {
        "console-sink"
    }
}

#[async_trait]
impl OutputSink for ConsoleSink {
    async fn publish(&self, ctx: &RuntimeContext, topic: &str, payload: &Value) -> Result<(), SinkError> {
        if topic == "agent.spoke" {
            let speech = payload.get("speech").and_then(Value::as_str).unwrap_or_default();
            let autonomous = payload.get("autonomous").and_then(Value::as_bool).unwrap_or(false);
            let degraded = payload.get("degraded").and_then(Value::as_bool).unwrap_or(false);
            let style = if degraded { Style::new().yellow() } else { Style::new().green() };
            let prefix = if autonomous { "~ " } else { "> " };
            println!("{}{}", style.apply_to(prefix), style.apply_to(speech));
        }
        self.inner.publish(ctx, topic, payload).await
    }

    async fn write_log(&self, ctx: &RuntimeContext, level: LogLevel, message: &str) -> Result<(), SinkError> {
        self.inner.write_log(ctx, level, message).await
    }

    async fn begin_dream_consolidation(&self, ctx: &RuntimeContext) -> Result<(), SinkError> {
        println!("{}", Style::new().dim().apply_to("(dreaming...)"));
        self.inner.begin_dream_consolidation(ctx).await
    }

    async fn begin_wake_process(&self, ctx: &RuntimeContext) -> Result<(), SinkError> {
        self.inner.begin_wake_process(ctx).await
    }

    async fn system_error(&self, ctx: &RuntimeContext, error: &RuntimeError) {
        eprintln!("{} {}", Style::new().red().bold().apply_to("system error:"), error);
        self.inner.system_error(ctx, error).await
    }
}

/// A line of chat input
#[derive(Debug, Clone, PartialEq)]
enum Input {
    Say(String),
    Sleep,
    Wake,
    State,
    Autonomy,
    Tick,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::Say(line.to_string()));
    };
    Some(match command.trim() {
        "sleep" => Input::Sleep,
        "wake" => Input::Wake,
        "state" => Input::State,
        "autonomy" => Input::Autonomy,
        "tick" => Input::Tick,
        "quit" | "exit" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    })
}

pub async fn handle(
    mut config: AnimusConfig,
    script: Option<PathBuf>,
    agent_name: Option<String>,
    autonomy: bool,
) -> Result<()> {
    if let Some(name) = agent_name {
        config.agent.name = name;
    }
    config.validate()?;

    let memories = Arc::new(InMemoryVectorSearch::new().with_min_score(0.5));
    let runtime = RuntimeLoop::builder(config, Arc::new(EchoInference))
        .with_sink(Arc::new(ConsoleSink::default()))
        .with_search(memories.clone())
        .build();

    if autonomy && !runtime.state().modes.autonomy_enabled {
        runtime
            .dispatch_external(KernelEvent::new(EventKind::ToggleAutonomy, SystemClock.now_ms()))
            .await;
    }
    if runtime.state().modes.autonomy_enabled {
        runtime.start();
    }

    let dim = Style::new().dim();
    println!(
        "{} {}",
        Style::new().bold().apply_to(&runtime.config().agent.name),
        dim.apply_to("is listening. /sleep /wake /state /autonomy /tick /quit")
    );

    let lines: Vec<String> = match &script {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    let mut scripted = lines.into_iter();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = if script.is_some() {
            match scripted.next() {
                Some(line) => line,
                None => break,
            }
        } else {
            match stdin.next_line().await? {
                Some(line) => line,
                None => break,
            }
        };

        let Some(input) = parse_input(&line) else {
            continue;
        };
        let now = SystemClock.now_ms();
        match input {
            Input::Say(text) => {
                memories.store(text.clone());
                if let TurnOutcome::Failed { error } = runtime.ask(text).await {
                    tracing::debug!(error = %error, "turn failed");
                }
            }
            Input::Sleep => {
                runtime.dispatch_external(KernelEvent::new(EventKind::SleepStart, now)).await;
            }
            Input::Wake => {
                runtime.dispatch_external(KernelEvent::new(EventKind::SleepEnd, now)).await;
            }
            Input::Autonomy => {
                runtime.dispatch_external(KernelEvent::new(EventKind::ToggleAutonomy, now)).await;
                if runtime.state().modes.autonomy_enabled {
                    runtime.start();
                }
                println!(
                    "{}",
                    dim.apply_to(format!("autonomy {}", on_off(runtime.state().modes.autonomy_enabled)))
                );
            }
            Input::State => print_state(&runtime.state(), now),
            Input::Tick => match runtime.tick().await {
                TickOutcome::Skipped(reason) => println!("{}", dim.apply_to(format!("skipped: {:?}", reason))),
                TickOutcome::Ran(_) => {}
            },
            Input::Quit => break,
            Input::Unknown(command) => {
                println!("{}", Style::new().red().apply_to(format!("unknown command: /{}", command)));
            }
        }
    }

    runtime.stop().await;
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn print_state(state: &KernelState, now: i64) {
    let dim = Style::new().dim();
    println!(
        "{}",
        dim.apply_to(format!(
            "energy {:.1} | load {:.1} | {} | budget {:.2} | unreplied {} | silence {}",
            state.soma.energy,
            state.soma.cognitive_load,
            if state.soma.sleeping { "asleep" } else { "awake" },
            state.social.speech_budget,
            state.social.unreplied_autonomous,
            state
                .silence_ms(now)
                .map(|ms| format!("{}s", ms / 1000))
                .unwrap_or_else(|| "-".to_string()),
        ))
    );
    println!(
        "{}",
        dim.apply_to(format!(
            "fear {:.2} | curiosity {:.2} | frustration {:.2} | satisfaction {:.2}",
            state.limbic.fear, state.limbic.curiosity, state.limbic.frustration, state.limbic.satisfaction
        ))
    );
}
