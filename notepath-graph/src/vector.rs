/// Cosine similarity; zero when either vector is empty, zero-length or the
/// dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Component-wise mean. Vectors whose dimension disagrees with the first are ignored.
pub fn average_vectors(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dim = vectors.first()?.len();
    if dim == 0 {
        return None;
    }
    let mut sum = vec![0.0f64; dim];
    let mut count = 0usize;
    for vector in vectors.iter().filter(|v| v.len() == dim) {
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += f64::from(*value);
        }
        count += 1;
    }
    Some(sum.into_iter().map(|v| (v / count as f64) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn average_skips_mismatched_dimensions() {
        let avg = average_vectors(&[vec![1.0, 3.0], vec![3.0, 5.0], vec![9.0]]).unwrap();
        assert_eq!(avg, vec![2.0, 4.0]);
        assert!(average_vectors(&[]).is_none());
    }
}
