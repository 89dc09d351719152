//! Runtime loop
//!
//! The only component that performs I/O, reads the clock or runs timers.
//! User input is queued FIFO and drained by a single task; autonomy ticks
//! share the same turn lock, so turns never overlap.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::capability::{FactSource, InferenceCapability, InferenceRequest, OutputSink, StateFactSource};
use super::clock::{Clock, SystemClock};
use super::context::{RuntimeContext, TraceId};
use super::impls::LogSink;
use crate::config::AnimusConfig;
use crate::error::RuntimeError;
use crate::guard::{DecisionPipeline, GuardIssue, GuardRequest, IdentityMatcher, ToolIntent, TurnStatus};
use crate::kernel::{
    EventKind, KernelEngine, KernelEvent, KernelOutput, KernelState, Subscription,
};
use crate::memory::{RecallCache, SearchHit, SemanticSearch, TtlCache};

/// Coarse runtime status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeStatus {
    Idle,
    /// A turn is in progress
    Thinking,
    /// The last turn failed; cleared by the next successful turn
    SystemError { message: String },
    Stopped,
}

/// A completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub trace_id: TraceId,
    pub thought: String,
    pub speech: String,
    pub status: TurnStatus,
    pub autonomous: bool,
    pub attempts: u32,
    pub issues: Vec<GuardIssue>,
    /// Tool the surrounding application may now execute
    pub approved_tool: Option<ToolIntent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Spoke(TurnReport),
    Failed { error: RuntimeError },
}

impl TurnOutcome {
    pub fn speech(&self) -> Option<&str> {
        match self {
            TurnOutcome::Spoke(report) => Some(&report.speech),
            TurnOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed { .. })
    }
}

/// Resolves once the submitted input has been answered
#[derive(Debug)]
pub struct TurnHandle {
    rx: oneshot::Receiver<TurnOutcome>,
}

impl TurnHandle {
    pub async fn outcome(self) -> TurnOutcome {
        self.rx.await.unwrap_or(TurnOutcome::Failed {
            error: RuntimeError::Stopped,
        })
    }
}

/// Why an autonomy tick did not speak
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Stopped,
    AutonomyDisabled,
    Sleeping,
    /// A turn is running or user input is waiting
    Busy,
    SilenceTooShort { remaining_ms: i64 },
    TooManyUnreplied,
    NoSpeechBudget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Ran(TurnOutcome),
}

struct PendingTurn {
    text: String,
    reply: oneshot::Sender<TurnOutcome>,
}

struct Inner {
    config: AnimusConfig,
    engine: Mutex<KernelEngine>,
    pipeline: DecisionPipeline,
    inference: Arc<dyn InferenceCapability>,
    facts: Arc<dyn FactSource>,
    sink: Arc<dyn OutputSink>,
    recall: Option<RecallCache>,
    lookups: TtlCache<Vec<SearchHit>>,
    clock: Arc<dyn Clock>,
    queue: Mutex<VecDeque<PendingTurn>>,
    draining: AtomicBool,
    turn_lock: tokio::sync::Mutex<()>,
    status: Mutex<RuntimeStatus>,
    cancel: CancellationToken,
    autonomy_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`RuntimeLoop`]
pub struct RuntimeBuilder {
    config: AnimusConfig,
    inference: Arc<dyn InferenceCapability>,
    facts: Option<Arc<dyn FactSource>>,
    sink: Option<Arc<dyn OutputSink>>,
    search: Option<Arc<dyn SemanticSearch>>,
    clock: Option<Arc<dyn Clock>>,
    identity: Option<Arc<dyn IdentityMatcher>>,
    state: Option<KernelState>,
}

impl RuntimeBuilder {
    pub fn with_fact_source(mut self, facts: Arc<dyn FactSource>) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_identity_matcher(mut self, matcher: Arc<dyn IdentityMatcher>) -> Self {
        self.identity = Some(matcher);
        self
    }

    /// Initial kernel state (sanitized)
    pub fn with_state(mut self, state: KernelState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> RuntimeLoop {
        let mut pipeline = DecisionPipeline::new(self.config.guard.clone());
        if let Some(matcher) = self.identity {
            pipeline = pipeline.with_identity_matcher(matcher);
        }
        let facts = self
            .facts
            .unwrap_or_else(|| Arc::new(StateFactSource::new(self.config.agent.name.clone())));
        let recall = self
            .search
            .filter(|_| self.config.memory.recall_enabled)
            .map(RecallCache::new);
        let lookup_ttl = Duration::from_millis(self.config.memory.lookup_ttl_ms);

        RuntimeLoop {
            inner: Arc::new(Inner {
                engine: Mutex::new(KernelEngine::with_state(self.state.unwrap_or_default())),
                pipeline,
                inference: self.inference,
                facts,
                sink: self.sink.unwrap_or_else(|| Arc::new(LogSink::new())),
                recall,
                lookups: TtlCache::new(lookup_ttl),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                turn_lock: tokio::sync::Mutex::new(()),
                status: Mutex::new(RuntimeStatus::Idle),
                cancel: CancellationToken::new(),
                autonomy_task: Mutex::new(None),
                config: self.config,
            }),
        }
    }
}

/// Cloneable handle to one agent's runtime
#[derive(Clone)]
pub struct RuntimeLoop {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RuntimeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLoop")
            .field("agent", &self.inner.config.agent.id)
            .field("status", &self.status())
            .field("queued", &self.inner.queue.lock().len())
            .finish()
    }
}

impl RuntimeLoop {
    pub fn builder(config: AnimusConfig, inference: Arc<dyn InferenceCapability>) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            inference,
            facts: None,
            sink: None,
            search: None,
            clock: None,
            identity: None,
            state: None,
        }
    }

    pub fn config(&self) -> &AnimusConfig {
        &self.inner.config
    }

    pub fn status(&self) -> RuntimeStatus {
        self.inner.status.lock().clone()
    }

    /// Current kernel snapshot
    pub fn state(&self) -> Arc<KernelState> {
        self.inner.engine.lock().state()
    }

    pub fn event_history(&self) -> Vec<KernelEvent> {
        self.inner.engine.lock().event_history()
    }

    /// Observe committed transitions.
    ///
    /// Listeners run while the engine is locked and must not call back into
    /// the runtime.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&KernelState, &[KernelOutput]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.engine.lock().subscribe(listener)
    }

    /// Restore persisted state (clamped, no outputs, no listeners)
    pub fn hydrate(&self, state: KernelState) {
        self.inner.engine.lock().hydrate(state);
    }

    pub fn pipeline(&self) -> &DecisionPipeline {
        &self.inner.pipeline
    }

    /// Queue user input. Inputs are answered strictly in submission order.
    pub fn submit(&self, text: impl Into<String>) -> TurnHandle {
        let (reply, rx) = oneshot::channel();
        let handle = TurnHandle { rx };

        if self.inner.cancel.is_cancelled() {
            let _ = reply.send(TurnOutcome::Failed {
                error: RuntimeError::Stopped,
            });
            return handle;
        }

        self.inner.queue.lock().push_back(PendingTurn {
            text: text.into(),
            reply,
        });
        if !self.inner.draining.swap(true, Ordering::SeqCst) {
            let runtime = self.clone();
            tokio::spawn(async move { runtime.drain().await });
        }
        handle
    }

    /// Submit and wait for the answer
    pub async fn ask(&self, text: impl Into<String>) -> TurnOutcome {
        self.submit(text).outcome().await
    }

    async fn drain(&self) {
        loop {
            let next = self.inner.queue.lock().pop_front();
            let Some(turn) = next else {
                self.inner.draining.store(false, Ordering::SeqCst);
                // Input pushed between the pop and the store would be stranded
                let refill = !self.inner.queue.lock().is_empty();
                if refill && !self.inner.draining.swap(true, Ordering::SeqCst) {
                    continue;
                }
                break;
            };

            let ctx = self.context();
            let outcome = self.contained(&ctx, self.user_turn(&ctx, turn.text)).await;
            let _ = turn.reply.send(outcome);
        }
    }

    async fn user_turn(&self, ctx: &RuntimeContext, text: String) -> TurnOutcome {
        let _turn = self.inner.turn_lock.lock().await;
        if self.inner.cancel.is_cancelled() {
            return TurnOutcome::Failed {
                error: RuntimeError::Stopped,
            };
        }

        let now = self.inner.clock.now_ms();
        let outputs = self.dispatch_now(KernelEvent::user_input(text.clone(), now));
        self.execute(ctx, outputs).await;

        self.think(ctx, Some(text)).await
    }

    /// Run a turn, turning a panic anywhere inside it into a failed turn.
    /// The turn lock is released on unwind, so the next turn can proceed.
    async fn contained<F>(&self, ctx: &RuntimeContext, turn: F) -> TurnOutcome
    where
        F: Future<Output = TurnOutcome>,
    {
        match AssertUnwindSafe(turn).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let error = RuntimeError::Panicked {
                    message: panic_message(panic.as_ref()),
                };
                error!(trace_id = %ctx.trace_id, error = %error, "turn panicked");
                self.set_status(RuntimeStatus::SystemError {
                    message: error.to_string(),
                });
                if AssertUnwindSafe(self.inner.sink.system_error(ctx, &error))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    warn!(trace_id = %ctx.trace_id, "output sink panicked reporting a panic");
                }
                crate::error_log!("turn {} failed: {}", ctx.trace_id, error);
                TurnOutcome::Failed { error }
            }
        }
    }

    /// Run one autonomy tick: dispatch `Tick`, then speak unprompted if
    /// every gate is open.
    pub async fn tick(&self) -> TickOutcome {
        if self.inner.cancel.is_cancelled() {
            return TickOutcome::Skipped(SkipReason::Stopped);
        }

        let ctx = self.context();
        let now = self.inner.clock.now_ms();
        let outputs = self.dispatch_now(KernelEvent::new(EventKind::Tick, now));
        self.execute(&ctx, outputs).await;

        let state = self.state();
        if let Some(reason) = self.autonomy_gate(&state, now) {
            debug!(?reason, "autonomy tick skipped");
            return TickOutcome::Skipped(reason);
        }

        if self.inner.draining.load(Ordering::SeqCst) {
            return TickOutcome::Skipped(SkipReason::Busy);
        }
        let Ok(_turn) = self.inner.turn_lock.try_lock() else {
            return TickOutcome::Skipped(SkipReason::Busy);
        };

        TickOutcome::Ran(self.contained(&ctx, self.think(&ctx, None)).await)
    }

    fn autonomy_gate(&self, state: &KernelState, now: i64) -> Option<SkipReason> {
        let autonomy = &self.inner.config.autonomy;

        if !state.modes.autonomy_enabled {
            return Some(SkipReason::AutonomyDisabled);
        }
        if state.soma.sleeping {
            return Some(SkipReason::Sleeping);
        }
        if let Some(silence) = state.silence_ms(now) {
            let min = autonomy.min_silence_ms as i64;
            if silence < min {
                return Some(SkipReason::SilenceTooShort {
                    remaining_ms: min - silence,
                });
            }
        }
        if state.social.unreplied_autonomous >= autonomy.max_unreplied {
            return Some(SkipReason::TooManyUnreplied);
        }
        if !state.social.can_afford_speech() {
            return Some(SkipReason::NoSpeechBudget);
        }
        None
    }

    /// Start the self-rescheduling autonomy timer. The interval stretches
    /// as energy drops. No-op if already running or stopped.
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let mut task = self.inner.autonomy_task.lock();
        if task.is_some() {
            return;
        }

        let runtime = self.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                let energy = runtime.state().soma.energy;
                let interval = runtime.inner.config.autonomy.interval_for_energy(energy);
                tokio::select! {
                    _ = runtime.inner.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match AssertUnwindSafe(runtime.tick()).catch_unwind().await {
                    Ok(TickOutcome::Skipped(reason)) => debug!(?reason, "tick skipped"),
                    Ok(TickOutcome::Ran(outcome)) => debug!(failed = outcome.is_failed(), "autonomous turn finished"),
                    Err(panic) => error!(panic = %panic_message(panic.as_ref()), "autonomy tick panicked"),
                }
            }
        }));
        info!(agent = %self.inner.config.agent.id, "autonomy started");
    }

    /// Cancel timers and in-flight work, fail queued input. A stopped loop
    /// stays stopped.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let task = self.inner.autonomy_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let pending: Vec<PendingTurn> = self.inner.queue.lock().drain(..).collect();
        for turn in pending {
            let _ = turn.reply.send(TurnOutcome::Failed {
                error: RuntimeError::Stopped,
            });
        }
        self.set_status(RuntimeStatus::Stopped);
        info!(agent = %self.inner.config.agent.id, "runtime stopped");
    }

    /// Dispatch an event from the surrounding application (tool results,
    /// sleep, toggles, overrides) and execute its outputs.
    pub async fn dispatch_external(&self, event: KernelEvent) -> Vec<KernelOutput> {
        let ctx = self.context();
        let outputs = self.dispatch_now(event);
        self.execute(&ctx, outputs.clone()).await;
        outputs
    }

    fn context(&self) -> RuntimeContext {
        RuntimeContext::new(self.inner.config.agent.id.clone())
            .with_cancellation(self.inner.cancel.child_token())
    }

    fn dispatch_now(&self, event: KernelEvent) -> Vec<KernelOutput> {
        self.inner.engine.lock().dispatch(event)
    }

    fn set_status(&self, status: RuntimeStatus) {
        let mut current = self.inner.status.lock();
        if *current != RuntimeStatus::Stopped {
            *current = status;
        }
    }

    /// Inference + guard for one turn, then commit what was said
    async fn think(&self, ctx: &RuntimeContext, input: Option<String>) -> TurnOutcome {
        self.set_status(RuntimeStatus::Thinking);
        let autonomous = input.is_none();
        let agent = &self.inner.config.agent;

        let state = self.state();
        let now = self.inner.clock.now_ms();
        let facts = self.inner.facts.facts(&state, now).await;
        let memories = self.memories(&state, input.as_deref()).await;

        let mut request = InferenceRequest::new(agent.name.clone());
        request.transcript = state.conversation.iter().cloned().collect();
        request.input = input;
        request.autonomous = autonomous;
        request.memories = memories;

        let guard = GuardRequest::new(agent.id.clone(), agent.name.clone())
            .with_energy(state.soma.energy)
            .at(now)
            .with_facts(facts);

        let result = tokio::select! {
            result = self.inner.pipeline.run(self.inner.inference.as_ref(), ctx, request, &guard) => {
                result.map_err(RuntimeError::from)
            }
            _ = ctx.cancellation.cancelled() => Err(RuntimeError::Stopped),
        };

        let decision = match result {
            Ok(decision) => decision,
            Err(error) => {
                if error != RuntimeError::Stopped {
                    self.set_status(RuntimeStatus::SystemError {
                        message: error.to_string(),
                    });
                    self.inner.sink.system_error(ctx, &error).await;
                    crate::error_log!("turn {} failed: {}", ctx.trace_id, error);
                }
                return TurnOutcome::Failed { error };
            }
        };

        let event = KernelEvent::new(
            EventKind::AgentSpoke {
                thought: decision.output.internal_thought.clone(),
                speech: decision.output.speech_content.clone(),
                autonomous,
                degraded: decision.status.is_degraded(),
            },
            self.inner.clock.now_ms(),
        );
        let outputs = self.dispatch_now(event);
        self.execute(ctx, outputs).await;
        self.set_status(RuntimeStatus::Idle);

        crate::info_log!(
            "turn {} {:?} after {} attempt(s){}",
            ctx.trace_id,
            decision.status,
            decision.attempts,
            if autonomous { " (autonomous)" } else { "" }
        );

        TurnOutcome::Spoke(TurnReport {
            trace_id: ctx.trace_id.clone(),
            thought: decision.output.internal_thought,
            speech: decision.output.speech_content,
            status: decision.status,
            autonomous,
            attempts: decision.attempts,
            issues: decision.issues,
            approved_tool: decision.approved_tool,
        })
    }

    /// User turns go through the de-duplicating recall cache; autonomous
    /// musings use the TTL cache so they can change over time.
    async fn memories(&self, state: &KernelState, input: Option<&str>) -> Vec<SearchHit> {
        let Some(recall) = &self.inner.recall else {
            return Vec::new();
        };
        let limit = self.inner.config.memory.recall_limit;

        match input {
            Some(text) => recall.recall(text, limit).await,
            None => {
                let topic = state
                    .goals
                    .active
                    .as_ref()
                    .map(|goal| goal.description.clone())
                    .or_else(|| state.thoughts.back().cloned())
                    .unwrap_or_else(|| "recent conversation".to_string());
                self.inner
                    .lookups
                    .get_or_load(&topic, || recall.search_or_empty(&topic, limit))
                    .await
            }
        }
    }

    /// Execute outputs in order. A finished dream consolidation feeds
    /// `DreamConsolidated` back into the kernel.
    async fn execute(&self, ctx: &RuntimeContext, outputs: Vec<KernelOutput>) {
        let sink = &self.inner.sink;
        let mut pending: VecDeque<KernelOutput> = outputs.into();

        while let Some(output) = pending.pop_front() {
            let result = match &output {
                KernelOutput::Publish { topic, payload } => sink.publish(ctx, topic, payload).await,
                KernelOutput::WriteLog { level, message } => sink.write_log(ctx, *level, message).await,
                KernelOutput::BeginWakeProcess => sink.begin_wake_process(ctx).await,
                KernelOutput::BeginDreamConsolidation => {
                    let result = sink.begin_dream_consolidation(ctx).await;
                    if result.is_ok() {
                        let now = self.inner.clock.now_ms();
                        pending.extend(self.dispatch_now(KernelEvent::new(EventKind::DreamConsolidated, now)));
                    }
                    result
                }
            };
            if let Err(e) = result {
                warn!(trace_id = %ctx.trace_id, error = %e, "output sink failed");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
