//! Output sinks
//!
//! `LogSink` executes outputs into the kernel log and `tracing`.
//! `RecordingSink` keeps every call for inspection.

use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{RuntimeError, SinkError};
use crate::kernel::LogLevel;
use crate::logger;
use crate::runtime::capability::{Capability, OutputSink};
use crate::runtime::context::RuntimeContext;

/// Default sink: kernel log + tracing
#[derive(Debug, Default)]
pub struct LogSink {
    consolidation_time: Duration,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time a dream consolidation takes
    pub fn with_consolidation_time(mut self, duration: Duration) -> Self {
        self.consolidation_time = duration;
        self
    }
}

impl Capability for LogSink {
    fn name(&self) -> &'static str {
        "log-sink"
    }
}

#[async_trait::async_trait]
impl OutputSink for LogSink {
    async fn publish(&self, ctx: &RuntimeContext, topic: &str, payload: &Value) -> Result<(), SinkError> {
        info!(trace_id = %ctx.trace_id, topic, %payload, "publish");
        logger::log(LogLevel::Debug, "publish", format!("{} {}", topic, payload));
        Ok(())
    }

    async fn write_log(&self, _ctx: &RuntimeContext, level: LogLevel, message: &str) -> Result<(), SinkError> {
        logger::log(level, "kernel", message);
        Ok(())
    }

    async fn begin_dream_consolidation(&self, ctx: &RuntimeContext) -> Result<(), SinkError> {
        info!(trace_id = %ctx.trace_id, "dream consolidation started");
        if !self.consolidation_time.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.consolidation_time) => {}
                _ = ctx.cancellation.cancelled() => {
                    return Err(SinkError::new("dream_consolidation", "cancelled"));
                }
            }
        }
        Ok(())
    }

    async fn begin_wake_process(&self, ctx: &RuntimeContext) -> Result<(), SinkError> {
        info!(trace_id = %ctx.trace_id, "waking up");
        logger::log(LogLevel::Info, "kernel", "wake process started");
        Ok(())
    }

    async fn system_error(&self, ctx: &RuntimeContext, err: &RuntimeError) {
        error!(trace_id = %ctx.trace_id, error = %err, "turn failed");
        logger::log(LogLevel::Error, "runtime", err.to_string());
    }
}

/// One call made on a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Publish { topic: String, payload: Value },
    Log { level: LogLevel, message: String },
    DreamConsolidation,
    WakeProcess,
    SystemError(String),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    fail_consolidation: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every dream consolidation as failed
    pub fn failing_consolidation(mut self) -> Self {
        self.fail_consolidation = true;
        self
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Published topics in order
    pub fn topics(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Publish { topic, .. } => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    /// Payloads published under `topic`
    pub fn published(&self, topic: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Publish { topic: t, payload } if t == topic => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn system_errors(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::SystemError(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

impl Capability for RecordingSink {
    fn name(&self) -> &'static str {
        "recording-sink"
    }
}

#[async_trait::async_trait]
impl OutputSink for RecordingSink {
    async fn publish(&self, _ctx: &RuntimeContext, topic: &str, payload: &Value) -> Result<(), SinkError> {
        self.record(SinkCall::Publish {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn write_log(&self, _ctx: &RuntimeContext, level: LogLevel, message: &str) -> Result<(), SinkError> {
        self.record(SinkCall::Log {
            level,
            message: message.to_string(),
        });
        Ok(())
    }

    async fn begin_dream_consolidation(&self, _ctx: &RuntimeContext) -> Result<(), SinkError> {
        self.record(SinkCall::DreamConsolidation);
        if self.fail_consolidation {
            return Err(SinkError::new("dream_consolidation", "archive unavailable"));
        }
        Ok(())
    }

    async fn begin_wake_process(&self, _ctx: &RuntimeContext) -> Result<(), SinkError> {
        self.record(SinkCall::WakeProcess);
        Ok(())
    }

    async fn system_error(&self, _ctx: &RuntimeContext, err: &RuntimeError) {
        self.record(SinkCall::SystemError(err.to_string()));
    }
}
