//! Structured error types for animus
//!
//! Only unrecoverable failures are errors. Policy blocks, fact mismatches and
//! persona drift are recovered inside the guard pipeline and never show up
//! here.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =========================================================================
// Collaborator errors
// =========================================================================

/// Failure of the external inference collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// Collaborator unreachable (network, process gone)
    #[error("inference unavailable: {message}")]
    Unavailable { message: String },

    /// Call exceeded its deadline
    #[error("inference timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider rejected the request outright
    #[error("inference rejected: {message}")]
    Rejected { message: String },
}

impl InferenceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Transient failures are worth another attempt within the retry budget
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } => true,
            Self::Rejected { .. } => false,
        }
    }
}

/// Failure of the semantic-search collaborator. Always degraded to an empty
/// result by the recall cache.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("semantic search failed: {message}")]
pub struct SearchError {
    pub message: String,
}

impl SearchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure executing a kernel output
#[derive(Error, Debug, Clone, PartialEq)]
#[error("output sink failed ({output}): {message}")]
pub struct SinkError {
    pub output: &'static str,
    pub message: String,
}

impl SinkError {
    pub fn new(output: &'static str, message: impl Into<String>) -> Self {
        Self {
            output,
            message: message.into(),
        }
    }
}

// =========================================================================
// Pipeline / runtime errors
// =========================================================================

/// Terminal failure of the guard pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// Inference never produced a usable answer; the turn must abort
    #[error("hard fail after {attempts} attempt(s): {source}")]
    HardFail {
        attempts: u32,
        #[source]
        source: InferenceError,
    },
}

/// Errors surfaced by the runtime loop's error boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Loop was stopped before the turn ran
    #[error("runtime stopped")]
    Stopped,

    #[error("turn panicked: {message}")]
    Panicked { message: String },
}

// =========================================================================
// Configuration errors
// =========================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_inference_errors() {
        assert!(InferenceError::unavailable("connection reset").is_retryable());
        assert!(InferenceError::Timeout {
            duration: Duration::from_secs(30)
        }
        .is_retryable());
        assert!(!InferenceError::Rejected {
            message: "content policy".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_hard_fail_message_names_attempts() {
        let err = GuardError::HardFail {
            attempts: 3,
            source: InferenceError::unavailable("down"),
        };
        let runtime: RuntimeError = err.into();
        assert_eq!(
            runtime.to_string(),
            "hard fail after 3 attempt(s): inference unavailable: down"
        );
    }
}
