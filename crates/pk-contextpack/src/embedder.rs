use async_trait::async_trait;
use sha2::{Digest, Sha256};

use pk_domain::Result;

/// A text embedder, injected the same way a `Provider` is — never looked
/// up from a global. The Relevance truncation strategy is the only
/// consumer; `ConversationOptions::truncation` does not require one unless
/// `Relevance` is selected.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic hash-based embedder for tests — plays the same role
/// `MockProvider` plays for the `Provider` contract. Not meaningful as a
/// similarity space beyond "same text ⇒ same vector, different text ⇒
/// (almost certainly) different vector".
#[derive(Debug, Default, Clone, Copy)]
pub struct MockEmbedder;

const DIMS: usize = 16;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let digest = Sha256::digest(text.as_bytes());
        let mut vector = Vec::with_capacity(DIMS);
        for chunk in digest.chunks(2).take(DIMS) {
            let value = u16::from_be_bytes([chunk[0], *chunk.get(1).unwrap_or(&0)]);
            vector.push((value as f32 / u16::MAX as f32) * 2.0 - 1.0);
        }
        Ok(vector)
    }
}

/// Cosine similarity between two vectors of equal length. Returns 0.0 for
/// mismatched lengths or a zero-magnitude vector rather than panicking or
/// dividing by zero, since a degenerate embedding should score as
/// "unrelated", not crash `ContextAssembly`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
