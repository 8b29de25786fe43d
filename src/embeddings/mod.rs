//! Embedding functions used by the index.
//!
//! The index embeds chunk text and queries through an [`Embedder`]. The
//! default [`HashEmbedder`] needs no model files: it hashes word tokens into
//! a fixed number of buckets, which is enough for lexical similarity and makes
//! every embedding reproducible.

mod hashed;

pub use hashed::HashEmbedder;

/// Text to vector function.
pub trait Embedder: Send + Sync {
    /// Length of every vector produced.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in order.
    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Vec<f32> {
        self.embed(&[text.to_string()])
            .pop()
            .unwrap_or_else(|| vec![0.0; self.dimension()])
    }
}

/// Elementwise arithmetic mean of equally sized vectors.
///
/// Returns `None` for an empty input or mismatched dimensions.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }

    let mut sum = vec![0.0f32; dim];
    for vector in vectors {
        for (s, v) in sum.iter_mut().zip(vector) {
            *s += v;
        }
    }

    let count = vectors.len() as f32;
    for s in &mut sum {
        *s /= count;
    }
    Some(sum)
}

/// Cosine similarity in `[-1, 1]`; zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_unit_vectors() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let mean = mean_embedding(&vectors).unwrap();
        assert_eq!(mean.len(), 3);
        for v in mean {
            assert!((v - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mean_single_vector_is_identity() {
        let mean = mean_embedding(&[vec![0.5, -2.0]]).unwrap();
        assert_eq!(mean, vec![0.5, -2.0]);
    }

    #[test]
    fn test_mean_rejects_empty_and_mismatched() {
        assert!(mean_embedding(&[]).is_none());
        assert!(mean_embedding(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
