//! Memory / cache layer
//!
//! Two caches over the semantic-search collaborator: a de-duplicating
//! recall cache for user turns and a TTL cache for lookups that should go
//! stale.

pub mod recall;
pub mod ttl;

pub use recall::{RecallCache, SearchHit, SemanticSearch};
pub use ttl::TtlCache;
