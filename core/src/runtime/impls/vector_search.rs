//! In-memory semantic search
//!
//! Bag-of-bytes embeddings with cosine similarity. Good enough for the CLI
//! and tests; a real deployment plugs an external index in behind
//! `SemanticSearch`.

use parking_lot::RwLock;

use crate::error::SearchError;
use crate::memory::{SearchHit, SemanticSearch};
use crate::runtime::capability::Capability;

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    content: String,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorSearch {
    entries: RwLock<Vec<VectorEntry>>,
    /// Hits scoring below this are dropped
    min_score: f32,
}

impl InMemoryVectorSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn store(&self, content: impl Into<String>) {
        let content = content.into();
        self.entries.write().push(VectorEntry {
            embedding: embed(&content),
            content,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Capability for InMemoryVectorSearch {
    fn name(&self) -> &'static str {
        "in-memory-vector-search"
    }
}

#[async_trait::async_trait]
impl SemanticSearch for InMemoryVectorSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let query_embedding = embed(query);
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|entry| (cosine_similarity(&query_embedding, &entry.embedding), entry))
            .filter(|(score, _)| *score >= self.min_score)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, entry)| SearchHit::new(entry.content.clone(), score))
            .collect())
    }
}

/// Lowercased byte-frequency embedding, normalized
fn embed(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; 256];
    for byte in text.to_lowercase().bytes() {
        vec[byte as usize] += 1.0;
    }
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.iter_mut().for_each(|x| *x /= norm);
    }
    vec
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
