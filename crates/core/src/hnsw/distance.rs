//! Cosine distance kernels for HNSW search.
//!
//! All distances are `1 - cosine_similarity`, range \[0, 2\], lower is better.
//! Norms are precomputed once per vector, so the hot loop is a single dot product.

/// Dot product using 8-wide chunks so the compiler can vectorize the loop.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = [0.0f32; 8];
    let chunks_a = a.chunks_exact(8);
    let chunks_b = b.chunks_exact(8);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();
    for (ca, cb) in chunks_a.zip(chunks_b) {
        for i in 0..8 {
            acc[i] += ca[i] * cb[i];
        }
    }
    let mut sum: f32 = acc.iter().sum();
    for (x, y) in rem_a.iter().zip(rem_b) {
        sum += x * y;
    }
    sum
}

/// Euclidean norm.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Reciprocal of the norm, or 0 for a zero vector (which then scores 0 against everything).
#[inline]
pub fn inverse_norm(v: &[f32]) -> f32 {
    let n = norm(v);
    if n > 0.0 {
        1.0 / n
    } else {
        0.0
    }
}

/// Cosine similarity clamped to \[-1, 1\].
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity_prenorm(a, inverse_norm(a), b, inverse_norm(b))
}

/// Cosine similarity with both reciprocal norms supplied by the caller.
#[inline]
pub fn cosine_similarity_prenorm(a: &[f32], a_inv: f32, b: &[f32], b_inv: f32) -> f32 {
    (dot(a, b) * a_inv * b_inv).clamp(-1.0, 1.0)
}

/// Cosine distance with precomputed reciprocal norms.
#[inline]
pub fn cosine_distance_prenorm(a: &[f32], a_inv: f32, b: &[f32], b_inv: f32) -> f32 {
    1.0 - cosine_similarity_prenorm(a, a_inv, b, b_inv)
}

/// Convert a distance back to the similarity reported to callers.
#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}
