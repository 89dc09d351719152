//! Capability implementations
//!
//! - `LogSink`: executes outputs into the kernel log and tracing
//! - `RecordingSink`: records every output call (testing)
//! - `ScriptedInference`: canned replies (testing, replays)
//! - `EchoInference`: deterministic offline model for the CLI
//! - `InMemoryVectorSearch`: cosine-similarity memory search

pub mod echo;
pub mod scripted;
pub mod sink;
pub mod vector_search;

pub use echo::EchoInference;
pub use scripted::ScriptedInference;
pub use sink::{LogSink, RecordingSink, SinkCall};
pub use vector_search::InMemoryVectorSearch;
