//! Integration tests for the runtime loop
//!
//! Kernel, guard pipeline, memory and runtime wired together with scripted
//! capabilities and a manual clock.

#[cfg(test)]
mod tests {
    use crate::config::AnimusConfig;
    use crate::error::{GuardError, InferenceError, RuntimeError};
    use crate::guard::TurnStatus;
    use crate::kernel::{EventKind, KernelEvent, KernelState, MessageRole};
    use crate::memory::SemanticSearch;
    use crate::runtime::impls::{EchoInference, InMemoryVectorSearch, RecordingSink, ScriptedInference, SinkCall};
    use crate::runtime::{
        Capability, InferenceCapability, InferenceRequest, ManualClock, RuntimeContext, RuntimeLoop,
        RuntimeStatus, SkipReason, TickOutcome, TurnOutcome,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn reply(speech: &str) -> Result<String, InferenceError> {
        Ok(json!({ "internal_thought": "thinking", "speech_content": speech }).to_string())
    }

    struct Harness {
        runtime: RuntimeLoop,
        inference: Arc<ScriptedInference>,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
    }

    fn harness(inference: ScriptedInference) -> Harness {
        harness_with(AnimusConfig::default(), inference)
    }

    fn harness_with(config: AnimusConfig, inference: ScriptedInference) -> Harness {
        let inference = Arc::new(inference);
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(0));
        let runtime = RuntimeLoop::builder(config, inference.clone())
            .with_sink(sink.clone())
            .with_clock(clock.clone())
            .build();
        Harness {
            runtime,
            inference,
            sink,
            clock,
        }
    }

    fn spoken(outcome: &TurnOutcome) -> &str {
        outcome.speech().expect("turn should have spoken")
    }

    #[tokio::test(start_paused = true)]
    async fn test_inputs_answered_in_fifo_order() {
        let h = harness(
            ScriptedInference::new(vec![reply("one"), reply("two"), reply("three")])
                .with_delay(Duration::from_millis(50)),
        );

        let handles = vec![h.runtime.submit("a"), h.runtime.submit("b"), h.runtime.submit("c")];
        let outcomes = futures::future::join_all(handles.into_iter().map(|handle| handle.outcome())).await;
        let speeches: Vec<&str> = outcomes.iter().map(spoken).collect();
        assert_eq!(speeches, vec!["one", "two", "three"]);

        let inputs: Vec<Option<String>> = h.inference.requests().into_iter().map(|r| r.input).collect();
        assert_eq!(
            inputs,
            vec![Some("a".to_string()), Some("b".to_string()), Some("c".to_string())]
        );

        let state = h.runtime.state();
        let roles: Vec<MessageRole> = state.conversation.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Agent,
                MessageRole::User,
                MessageRole::Agent,
                MessageRole::User,
                MessageRole::Agent,
            ]
        );
        assert_eq!(
            h.sink.topics(),
            vec!["user.input", "agent.spoke", "user.input", "agent.spoke", "user.input", "agent.spoke"]
        );
        assert_eq!(h.runtime.status(), RuntimeStatus::Idle);
    }

    #[tokio::test]
    async fn test_error_boundary_keeps_the_queue_moving() {
        let h = harness(ScriptedInference::new(vec![
            Err(InferenceError::Rejected {
                message: "nope".into(),
            }),
            reply("recovered"),
        ]));

        let failed = h.runtime.submit("first");
        let ok = h.runtime.submit("second");

        let failed = failed.outcome().await;
        assert!(matches!(
            failed,
            TurnOutcome::Failed {
                error: RuntimeError::Guard(GuardError::HardFail { attempts: 1, .. })
            }
        ));
        assert_eq!(spoken(&ok.outcome().await), "recovered");

        assert_eq!(h.sink.system_errors().len(), 1);
        assert_eq!(h.runtime.status(), RuntimeStatus::Idle);
    }

    /// Panics on its first call, then echoes the input
    #[derive(Debug, Default)]
    struct PanicsOnce {
        calls: AtomicUsize,
    }

    impl Capability for PanicsOnce {
        fn name(&self) -> &'static str {
            "panics-once"
        }
    }

    #[async_trait::async_trait]
    impl InferenceCapability for PanicsOnce {
        async fn infer(&self, _ctx: &RuntimeContext, req: InferenceRequest) -> Result<String, InferenceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("adapter bug");
            }
            reply(req.input.as_deref().unwrap_or("quiet"))
        }
    }

    fn panicking_runtime() -> (RuntimeLoop, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let runtime = RuntimeLoop::builder(AnimusConfig::default(), Arc::new(PanicsOnce::default()))
            .with_sink(sink.clone())
            .with_clock(Arc::new(ManualClock::new(0)))
            .build();
        (runtime, sink)
    }

    #[tokio::test]
    async fn test_panicking_turn_keeps_the_queue_moving() {
        let (runtime, sink) = panicking_runtime();

        let first = runtime.submit("one");
        let second = runtime.submit("two");

        let first = first.outcome().await;
        assert!(matches!(
            first,
            TurnOutcome::Failed {
                error: RuntimeError::Panicked { ref message }
            } if message == "adapter bug"
        ));

        let second = tokio::time::timeout(Duration::from_secs(2), second.outcome())
            .await
            .expect("second input answered");
        assert_eq!(spoken(&second), "two");
        assert_eq!(runtime.status(), RuntimeStatus::Idle);
        assert_eq!(sink.system_errors(), vec!["turn panicked: adapter bug".to_string()]);

        // A later submit still gets a drainer
        assert_eq!(spoken(&runtime.ask("three").await), "three");
    }

    #[tokio::test]
    async fn test_panicking_autonomous_turn_is_contained() {
        let (runtime, _sink) = panicking_runtime();

        match runtime.tick().await {
            TickOutcome::Ran(TurnOutcome::Failed {
                error: RuntimeError::Panicked { .. },
            }) => {}
            other => panic!("expected a contained panic, got {:?}", other),
        }
        assert!(matches!(runtime.status(), RuntimeStatus::SystemError { .. }));

        assert_eq!(spoken(&runtime.ask("hello").await), "hello");
    }

    #[tokio::test]
    async fn test_failed_turn_sets_system_error_status() {
        let h = harness(ScriptedInference::repeating(Err(InferenceError::unavailable("down"))));

        let outcome = h.runtime.ask("hello?").await;
        assert!(outcome.is_failed());
        assert_eq!(h.inference.calls(), 3);
        assert!(matches!(h.runtime.status(), RuntimeStatus::SystemError { .. }));

        // The user input was still recorded; no agent speech was
        let state = h.runtime.state();
        assert_eq!(state.conversation.len(), 1);
        assert_eq!(state.consecutive_agent_speeches, 0);
    }

    #[tokio::test]
    async fn test_soft_fail_speaks_fallback_and_marks_degraded() {
        let bad = json!({
            "internal_thought": "boast",
            "speech_content": "I'm at 80 energy!",
            "fact_echo": {"energy": 80}
        })
        .to_string();
        let h = harness(ScriptedInference::repeating(Ok(bad)));

        let outcome = h.runtime.ask("how are you?").await;
        let TurnOutcome::Spoke(report) = outcome else {
            panic!("expected speech");
        };
        assert_eq!(report.status, TurnStatus::SoftFailed);
        assert_eq!(report.speech, AnimusConfig::default().guard.fallback_response);
        assert_eq!(h.inference.calls(), 3);

        let spoke = h.sink.published("agent.spoke");
        assert_eq!(spoke[0]["degraded"], json!(true));
        assert_eq!(spoke[0]["speech"], json!(report.speech));
    }

    #[tokio::test]
    async fn test_autonomy_gates() {
        let h = harness(ScriptedInference::repeating(reply("Still here.")));

        h.runtime.ask("hi").await;
        h.clock.set(10_000);
        assert_eq!(
            h.runtime.tick().await,
            TickOutcome::Skipped(SkipReason::SilenceTooShort { remaining_ms: 35_000 })
        );

        h.clock.set(60_000);
        for _ in 0..3 {
            match h.runtime.tick().await {
                TickOutcome::Ran(TurnOutcome::Spoke(report)) => assert!(report.autonomous),
                other => panic!("expected autonomous speech, got {:?}", other),
            }
        }
        assert_eq!(
            h.runtime.tick().await,
            TickOutcome::Skipped(SkipReason::TooManyUnreplied)
        );
        assert_eq!(h.runtime.state().social.unreplied_autonomous, 3);

        // A user reply reopens the gate
        h.runtime.ask("sorry, was away").await;
        h.clock.set(200_000);
        assert!(matches!(h.runtime.tick().await, TickOutcome::Ran(_)));

        let requests = h.inference.requests();
        assert!(requests.iter().filter(|r| r.autonomous).all(|r| r.input.is_none()));
    }

    #[tokio::test]
    async fn test_autonomy_disabled_and_sleep() {
        let h = harness(ScriptedInference::repeating(reply("hm")));

        h.runtime
            .dispatch_external(KernelEvent::new(EventKind::ToggleAutonomy, 0))
            .await;
        assert_eq!(
            h.runtime.tick().await,
            TickOutcome::Skipped(SkipReason::AutonomyDisabled)
        );
        assert!(h.sink.topics().contains(&"autonomy.changed".to_string()));

        h.runtime
            .dispatch_external(KernelEvent::new(EventKind::ToggleAutonomy, 1))
            .await;
        h.runtime
            .dispatch_external(KernelEvent::new(EventKind::SleepStart, 2))
            .await;
        assert_eq!(h.runtime.tick().await, TickOutcome::Skipped(SkipReason::Sleeping));
        assert_eq!(h.inference.calls(), 0);

        // Consolidation finished, so the kernel recorded it
        assert!(h.runtime.state().modes.consolidated);
        assert!(h.sink.calls().contains(&SinkCall::DreamConsolidation));

        h.runtime
            .dispatch_external(KernelEvent::new(EventKind::SleepEnd, 3))
            .await;
        assert!(h.sink.calls().contains(&SinkCall::WakeProcess));
        assert!(!h.runtime.state().soma.sleeping);
    }

    #[tokio::test]
    async fn test_failed_consolidation_is_not_recorded() {
        let inference = Arc::new(ScriptedInference::new(Vec::new()));
        let sink = Arc::new(RecordingSink::new().failing_consolidation());
        let runtime = RuntimeLoop::builder(AnimusConfig::default(), inference)
            .with_sink(sink.clone())
            .with_clock(Arc::new(ManualClock::new(0)))
            .build();

        runtime
            .dispatch_external(KernelEvent::new(EventKind::SleepStart, 0))
            .await;
        assert!(runtime.state().soma.sleeping);
        assert!(!runtime.state().modes.consolidated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_is_busy_while_input_pending() {
        let h = harness(ScriptedInference::repeating(reply("ok")).with_delay(Duration::from_secs(5)));

        let pending = h.runtime.submit("long question");
        assert_eq!(h.runtime.tick().await, TickOutcome::Skipped(SkipReason::Busy));

        assert_eq!(spoken(&pending.outcome().await), "ok");
        assert_eq!(h.inference.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_during_autonomous_turn_queues_behind_it() {
        let h = harness(
            ScriptedInference::new(vec![reply("Just musing."), reply("Yes, I'm here.")])
                .with_delay(Duration::from_secs(5)),
        );

        let runtime = h.runtime.clone();
        let tick = tokio::spawn(async move { runtime.tick().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.inference.calls(), 1);

        let answer = h.runtime.submit("are you there?");
        match tick.await.unwrap() {
            TickOutcome::Ran(TurnOutcome::Spoke(report)) => {
                assert!(report.autonomous);
                assert_eq!(report.speech, "Just musing.");
            }
            other => panic!("expected autonomous speech, got {:?}", other),
        }
        assert_eq!(spoken(&answer.outcome().await), "Yes, I'm here.");

        let inputs: Vec<Option<String>> = h.inference.requests().into_iter().map(|r| r.input).collect();
        assert_eq!(inputs, vec![None, Some("are you there?".to_string())]);

        let state = h.runtime.state();
        let turns: Vec<(MessageRole, &str)> = state
            .conversation
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (MessageRole::Agent, "Just musing."),
                (MessageRole::User, "are you there?"),
                (MessageRole::Agent, "Yes, I'm here."),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_autonomy_timer_ticks_and_stop_cancels() {
        let mut config = AnimusConfig::default();
        config.autonomy.min_silence_ms = 0;
        let h = harness_with(config, ScriptedInference::repeating(reply("Thinking aloud.")));

        h.runtime.start();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.inference.calls(), 1);

        h.runtime.stop().await;
        assert_eq!(h.runtime.status(), RuntimeStatus::Stopped);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.inference.calls(), 1);

        assert_eq!(h.runtime.tick().await, TickOutcome::Skipped(SkipReason::Stopped));
        assert_eq!(
            h.runtime.ask("anyone?").await,
            TurnOutcome::Failed {
                error: RuntimeError::Stopped
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_in_flight_turn() {
        let h = harness(ScriptedInference::repeating(reply("late")).with_delay(Duration::from_secs(30)));

        let pending = h.runtime.submit("question");
        tokio::task::yield_now().await;
        h.runtime.stop().await;

        assert_eq!(
            pending.outcome().await,
            TurnOutcome::Failed {
                error: RuntimeError::Stopped
            }
        );
        assert!(h.sink.system_errors().is_empty());
    }

    #[tokio::test]
    async fn test_approved_tool_and_tool_result() {
        let raw = json!({
            "internal_thought": "I should check",
            "speech_content": "Give me a second.",
            "tool_intent": {"tool": "SEARCH", "query": "moon phase"}
        })
        .to_string();
        let h = harness(ScriptedInference::new(vec![Ok(raw)]));

        let TurnOutcome::Spoke(report) = h.runtime.ask("what's the moon doing?").await else {
            panic!("expected speech");
        };
        assert_eq!(report.status, TurnStatus::Approved);
        assert_eq!(report.speech, "Give me a second. [SEARCH: moon phase]");
        assert_eq!(report.approved_tool.unwrap().query, "moon phase");

        h.runtime
            .dispatch_external(KernelEvent::new(
                EventKind::ToolResult {
                    tool: "SEARCH".into(),
                    content: "waxing gibbous".into(),
                    success: true,
                    document: None,
                },
                5,
            ))
            .await;
        let state = h.runtime.state();
        let last = state.conversation.back().unwrap();
        assert_eq!(last.role, MessageRole::Tool);
        assert!(last.content.contains("waxing gibbous"));
    }

    #[tokio::test]
    async fn test_recall_feeds_inference() {
        let search = Arc::new(InMemoryVectorSearch::new().with_min_score(0.5));
        search.store("moths circle the porch lamp");
        let search_dyn: Arc<dyn SemanticSearch> = search;
        let inference: Arc<dyn InferenceCapability> = Arc::new(EchoInference);

        let runtime = RuntimeLoop::builder(AnimusConfig::default(), inference)
            .with_sink(Arc::new(RecordingSink::new()))
            .with_search(search_dyn)
            .with_clock(Arc::new(ManualClock::new(0)))
            .build();

        let outcome = runtime.ask("moths and lamps").await;
        assert!(spoken(&outcome).contains("It reminds me of: moths circle the porch lamp."));
        let TurnOutcome::Spoke(report) = outcome else {
            unreachable!()
        };
        assert_eq!(report.status, TurnStatus::Approved);
    }

    #[tokio::test]
    async fn test_hydrate_clamps_and_is_not_an_event() {
        let h = harness(ScriptedInference::new(Vec::new()));
        let mut persisted = KernelState::new();
        persisted.soma.energy = 500.0;
        persisted.limbic.fear = f64::NAN;

        h.runtime.hydrate(persisted);

        let state = h.runtime.state();
        assert_eq!(state.soma.energy, 100.0);
        assert!(state.within_bounds());
        assert!(h.runtime.event_history().is_empty());
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_listeners_see_runtime_transitions() {
        let h = harness(ScriptedInference::new(vec![reply("hey")]));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let subscription = h.runtime.subscribe(move |_, outputs| {
            log.lock().push(outputs.len());
            Ok(())
        });

        h.runtime.ask("hello").await;
        assert_eq!(*seen.lock(), vec![1, 1]);

        subscription.unsubscribe();
        h.runtime
            .dispatch_external(KernelEvent::new(EventKind::Tick, 1))
            .await;
        assert_eq!(seen.lock().len(), 2);
    }
}
