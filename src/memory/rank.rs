//! Cosine similarity and the chunk → item ranking pipeline.
//!
//! Search scores every embedded chunk of a namespace against the query,
//! drops chunks under the threshold, keeps the best chunk per item and
//! orders items by that score.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::EmbeddingError;

// ── Public types ──────────────────────────────────────────────────────────────

/// An embedded chunk eligible for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item_key: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// The best-scoring chunk of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub item_key: String,
    pub text: String,
    pub score: f64,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Cosine similarity in `[-1, 1]`. Zero when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    // Rounding can push parallel vectors just past 1.0.
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Rank candidates against `query`.
///
/// Keeps chunks scoring `>= threshold`, reduces them to the best chunk per
/// item (the first one seen wins a tie), sorts by score descending then key
/// ascending, and truncates to `limit`.
pub fn rank(
    query: &[f32],
    candidates: Vec<Candidate>,
    threshold: f64,
    limit: usize,
) -> Result<Vec<RankedChunk>, EmbeddingError> {
    let mut best: HashMap<String, RankedChunk> = HashMap::new();

    for candidate in candidates {
        let score = cosine_similarity(query, &candidate.embedding)?;
        if score < threshold {
            continue;
        }
        match best.get_mut(&candidate.item_key) {
            Some(current) if score > current.score => {
                current.text = candidate.text;
                current.score = score;
            }
            Some(_) => {}
            None => {
                best.insert(
                    candidate.item_key.clone(),
                    RankedChunk {
                        item_key: candidate.item_key,
                        text: candidate.text,
                        score,
                    },
                );
            }
        }
    }

    let mut ranked: Vec<RankedChunk> = best.into_values().collect();
    ranked.sort_by(by_score_then_key);
    ranked.truncate(limit);
    Ok(ranked)
}

fn by_score_then_key(a: &RankedChunk, b: &RankedChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.item_key.cmp(&b.item_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str, text: &str, embedding: &[f32]) -> Candidate {
        Candidate {
            item_key: key.into(),
            text: text.into(),
            embedding: embedding.to_vec(),
        }
    }

    #[test]
    fn cosine_of_known_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_dimensions_error() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { left: 2, right: 3 }));
    }

    #[test]
    fn best_chunk_per_item_wins() {
        let ranked = rank(
            &[1.0, 0.0],
            vec![
                candidate("doc", "weak", &[1.0, 1.0]),
                candidate("doc", "strong", &[1.0, 0.1]),
                candidate("other", "mid", &[1.0, 0.5]),
            ],
            0.5,
            10,
        )
        .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item_key, "doc");
        assert_eq!(ranked[0].text, "strong");
        assert_eq!(ranked[1].item_key, "other");
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn threshold_is_inclusive_and_filters() {
        let ranked = rank(
            &[1.0, 0.0],
            vec![
                candidate("exact", "x", &[1.0, 0.0]),
                candidate("orthogonal", "y", &[0.0, 1.0]),
            ],
            1.0,
            10,
        )
        .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item_key, "exact");
    }

    #[test]
    fn ties_break_on_key_and_limit_truncates() {
        let ranked = rank(
            &[1.0, 0.0],
            vec![
                candidate("c", "x", &[1.0, 0.0]),
                candidate("a", "x", &[1.0, 0.0]),
                candidate("b", "x", &[1.0, 0.0]),
            ],
            0.0,
            2,
        )
        .unwrap();
        let keys: Vec<&str> = ranked.iter().map(|r| r.item_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn mismatched_candidate_surfaces() {
        let result = rank(&[1.0, 0.0], vec![candidate("k", "x", &[1.0])], 0.0, 10);
        assert!(result.is_err());
    }
}
