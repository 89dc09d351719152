//! Kernel outputs
//!
//! Side effects expressed as data. The reducer only describes them; the
//! runtime loop is the sole interpreter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KernelOutput {
    /// Publish a message on the application event bus
    Publish { topic: String, payload: Value },
    /// Append a line to the kernel log
    WriteLog { level: LogLevel, message: String },
    /// Start consolidating the day's memories
    BeginDreamConsolidation,
    /// Run the wake-up routine
    BeginWakeProcess,
}

impl KernelOutput {
    pub fn publish(topic: impl Into<String>, payload: Value) -> Self {
        KernelOutput::Publish {
            topic: topic.into(),
            payload,
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        KernelOutput::WriteLog {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }
}
