//! Conversation and thought history types

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Role of message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
    Tool,
}

/// Single transcript line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Event timestamp (epoch ms) that produced this line
    pub at: i64,
}

impl Message {
    pub fn user(content: impl Into<String>, at: i64) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            at,
        }
    }

    pub fn agent(content: impl Into<String>, at: i64) -> Self {
        Self {
            role: MessageRole::Agent,
            content: content.into(),
            at,
        }
    }

    pub fn tool(content: impl Into<String>, at: i64) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            at,
        }
    }
}

/// Push onto a FIFO-capped deque, evicting the oldest entries.
pub fn push_capped<T>(deque: &mut VecDeque<T>, item: T, cap: usize) {
    deque.push_back(item);
    truncate_front(deque, cap);
}

/// Drop the oldest entries until at most `cap` remain.
pub fn truncate_front<T>(deque: &mut VecDeque<T>, cap: usize) {
    while deque.len() > cap {
        deque.pop_front();
    }
}
