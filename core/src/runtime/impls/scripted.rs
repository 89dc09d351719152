//! Scripted inference for tests and replays

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::InferenceError;
use crate::runtime::capability::{Capability, InferenceCapability, InferenceRequest};
use crate::runtime::context::RuntimeContext;

type Reply = Result<String, InferenceError>;

/// Returns queued replies in order; once the queue is empty the repeat
/// reply (if any) is returned forever.
#[derive(Debug, Default)]
pub struct ScriptedInference {
    replies: Mutex<VecDeque<Reply>>,
    repeat: Option<Reply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn repeating(reply: Reply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::default()
        }
    }

    /// Sleep before answering (tokio time, so paused tests can advance it)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().clone()
    }
}

impl Capability for ScriptedInference {
    fn name(&self) -> &'static str {
        "scripted-inference"
    }
}

#[async_trait::async_trait]
impl InferenceCapability for ScriptedInference {
    async fn infer(&self, _ctx: &RuntimeContext, req: InferenceRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().pop_front();
        next.or_else(|| self.repeat.clone())
            .unwrap_or_else(|| Err(InferenceError::unavailable("script exhausted")))
    }
}
