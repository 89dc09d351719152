//! Pure cognitive kernel
//!
//! State, events, outputs, the reducer and the engine that owns them.
//! No async. No IO. The runtime loop is the only caller that touches the
//! outside world.

pub mod engine;
pub mod event;
pub mod history;
pub mod output;
pub mod reducer;
pub mod state;

pub use engine::{KernelEngine, Listener, Subscription};
pub use event::{EmotionDelta, EventKind, KernelEvent, NeuroLevels};
pub use history::{Message, MessageRole};
pub use output::{KernelOutput, LogLevel};
pub use reducer::{reduce, Transition};
pub use state::{
    Association, Bound, Emotion, Goal, Goals, KernelState, Limbic, Modes, Neuro, Social, Soma,
    Substrate, TraitVector,
};
