//! Cosine similarity between embedding vectors.
//!
//! Pure computation, no I/O. Vectors produced by different embedding models
//! must never be compared; a length mismatch is treated as "no similarity"
//! rather than an error so a model change degrades search instead of
//! breaking it.

/// Cosine similarity of two vectors, in [-1.0, 1.0].
///
/// Returns 0.0 when the vectors differ in length, are empty, or either has
/// zero magnitude. Never panics.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let mag_a = mag_a.sqrt();
    let mag_b = mag_b.sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
