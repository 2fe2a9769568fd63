//! Embedding vector helpers.

use crate::{Error, Result};

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for mismatched lengths, empty input or a zero-norm vector.
/// NaN components propagate to a NaN result.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
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

/// Encodes a vector as a JSON array.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if a component is not finite.
pub fn encode_vector(vector: &[f32]) -> Result<String> {
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(
            "embedding vector must contain only finite values".to_string(),
        ));
    }
    serde_json::to_string(vector).map_err(|e| Error::storage("encode_vector", e))
}

/// Decodes a JSON array vector.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the stored value is not a number
/// array.
pub fn decode_vector(json: &str) -> Result<Vec<f32>> {
    serde_json::from_str(json).map_err(|e| Error::storage("decode_vector", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_basics() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert!((cosine_similarity(&[0.3, 0.4], &[0.3, 0.4]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, f32::NAN], &[1.0, 0.0]).is_nan());
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_vector_json() {
        let json = encode_vector(&[0.5, -1.0]).unwrap();
        assert_eq!(json, "[0.5,-1.0]");
        assert_eq!(decode_vector(&json).unwrap(), vec![0.5, -1.0]);
        assert!(encode_vector(&[f32::INFINITY]).is_err());
    }
}
