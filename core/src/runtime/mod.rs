//! Runtime
//!
//! Async, side-effect capable. Drives the kernel and the guard pipeline
//! through capability traits.

pub mod capability;
pub mod clock;
pub mod context;
pub mod impls;
pub mod runtime_loop;

pub use capability::{
    Capability, FactSource, InferenceCapability, InferenceRequest, OutputSink, StateFactSource,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{RuntimeContext, TraceId};
pub use runtime_loop::{
    RuntimeBuilder, RuntimeLoop, RuntimeStatus, SkipReason, TickOutcome, TurnHandle, TurnOutcome,
    TurnReport,
};
