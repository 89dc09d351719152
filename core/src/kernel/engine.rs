//! Kernel engine
//!
//! Owns the one `KernelState` of a session. Every mutation goes through
//! `dispatch` (reducer) or `hydrate` (restore). Readers get an `Arc`
//! snapshot which is never mutated; each dispatch allocates a new one.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::kernel::event::KernelEvent;
use crate::kernel::history::push_capped;
use crate::kernel::output::KernelOutput;
use crate::kernel::reducer::reduce;
use crate::kernel::state::{KernelState, EVENT_HISTORY_CAP};

/// Observer of committed transitions
pub type Listener = Arc<dyn Fn(&KernelState, &[KernelOutput]) -> anyhow::Result<()> + Send + Sync>;

struct ListenerEntry {
    id: u64,
    listener: Listener,
}

type Registry = Mutex<Vec<ListenerEntry>>;

/// Handle returned by `subscribe`
///
/// Dropping the handle keeps the listener registered; call `unsubscribe`.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|entry| entry.id != self.id);
        }
    }
}

pub struct KernelEngine {
    state: Arc<KernelState>,
    history: VecDeque<KernelEvent>,
    listeners: Arc<Registry>,
    next_listener_id: AtomicU64,
}

impl std::fmt::Debug for KernelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelEngine")
            .field("history_len", &self.history.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for KernelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelEngine {
    pub fn new() -> Self {
        Self::with_state(KernelState::default())
    }

    /// Start from an existing state (sanitized like `hydrate`)
    pub fn with_state(state: KernelState) -> Self {
        Self {
            state: Arc::new(state.sanitized()),
            history: VecDeque::with_capacity(EVENT_HISTORY_CAP),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Apply an event: record it, reduce, commit, notify, return outputs.
    pub fn dispatch(&mut self, event: KernelEvent) -> Vec<KernelOutput> {
        let transition = reduce(&self.state, &event);
        debug!(
            event = event.name(),
            timestamp = event.timestamp,
            outputs = transition.outputs.len(),
            "dispatch"
        );
        push_capped(&mut self.history, event, EVENT_HISTORY_CAP);
        self.state = Arc::new(transition.next_state);
        self.notify(&transition.outputs);
        transition.outputs
    }

    /// Replace state wholesale from persisted storage.
    ///
    /// Not a transition: no outputs, no listener calls, no history entry.
    pub fn hydrate(&mut self, state: KernelState) {
        let state = state.sanitized();
        info!(
            energy = state.soma.energy,
            sleeping = state.soma.sleeping,
            "kernel state hydrated"
        );
        self.state = Arc::new(state);
    }

    /// Current snapshot
    pub fn state(&self) -> Arc<KernelState> {
        Arc::clone(&self.state)
    }

    /// Most recent events, oldest first (at most `EVENT_HISTORY_CAP`)
    pub fn event_history(&self) -> Vec<KernelEvent> {
        self.history.iter().cloned().collect()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&KernelState, &[KernelOutput]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(ListenerEntry {
            id,
            listener: Arc::new(listener),
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn notify(&self, outputs: &[KernelOutput]) {
        // Copy out so a listener may unsubscribe itself without deadlocking
        let listeners: Vec<(u64, Listener)> = self
            .listeners
            .lock()
            .iter()
            .map(|entry| (entry.id, Arc::clone(&entry.listener)))
            .collect();

        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&self.state, outputs))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(listener = id, error = %e, "kernel listener failed"),
                Err(_) => error!(listener = id, "kernel listener panicked"),
            }
        }
    }
}
