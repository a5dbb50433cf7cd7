//! Pure vector math backing the vector store's ranking step.
//!
//! Length mismatches never error: pairwise operations run over the shared
//! prefix and ignore excess elements. Zero-magnitude vectors short-circuit
//! instead of dividing by zero.

/// L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit Euclidean length. A zero-magnitude vector is returned
/// unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Sum of pairwise products over the shared prefix of `a` and `b`.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0.0 when either vector has zero norm.
///
/// For unit-normalized inputs this equals `dot_product`, which the store
/// uses as the fast path in search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    dot_product(a, b) / (norm_a * norm_b)
}

/// L2 distance over the shared prefix of `a` and `b`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
