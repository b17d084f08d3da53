//! Cosine-similarity ranking over an in-memory collection.
//!
//! The ranker is a full linear scan: every stored embedding is scored against
//! the query and the scores are sorted. There is no index, which keeps the
//! result exact but limits it to collections that fit in memory.

use thiserror::Error;

use crate::models::RankedMatch;

/// Errors that can occur while ranking.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RankError {
    /// No stored documents to rank against
    #[error("Cannot rank an empty collection")]
    EmptyCollection,

    /// A vector has zero (or non-finite) magnitude; `None` means the query
    #[error("Degenerate vector (zero magnitude) at {}", describe(.index))]
    DegenerateVector { index: Option<usize> },

    /// A stored vector does not match the query dimensionality
    #[error("Dimension mismatch at document {index}: expected {expected}, found {found}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
}

fn describe(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("document {}", i),
        None => "query".to_string(),
    }
}

/// Result type for ranking operations.
pub type RankResult<T> = Result<T, RankError>;

/// Outcome of a ranking call.
///
/// `scores` is index-aligned with the ranked collection and owned by this
/// value; nothing is written back into the caller's data.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub best: RankedMatch,
    pub scores: Vec<f32>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns `None` when the lengths differ or either vector has zero magnitude,
/// since the similarity is undefined there.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let norm_a = l2_norm(a)?;
    let norm_b = l2_norm(b)?;
    Some((dot(a, b) / (norm_a * norm_b)) as f32)
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
}

/// Euclidean length of `v`, or `None` when it is zero or not finite.
pub(crate) fn l2_norm(v: &[f32]) -> Option<f64> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    (norm.is_finite() && norm > 0.0).then_some(norm)
}

/// Brute-force cosine ranker for one query.
///
/// A ranker borrows its inputs and holds no state between calls, so building
/// a fresh one for every request is the intended use.
#[derive(Debug, Clone, Copy)]
pub struct Ranker<'a> {
    query: &'a [f32],
    embeddings: &'a [Vec<f32>],
}

impl<'a> Ranker<'a> {
    pub fn new(query: &'a [f32], embeddings: &'a [Vec<f32>]) -> Self {
        Self { query, embeddings }
    }

    /// Score every stored embedding against the query.
    ///
    /// # Errors
    /// `EmptyCollection` when there is nothing to score, `DegenerateVector`
    /// for a zero-magnitude query or document, `DimensionMismatch` when a
    /// document length differs from the query length.
    pub fn scores(&self) -> RankResult<Vec<f32>> {
        if self.embeddings.is_empty() {
            return Err(RankError::EmptyCollection);
        }
        if l2_norm(self.query).is_none() {
            return Err(RankError::DegenerateVector { index: None });
        }

        self.embeddings
            .iter()
            .enumerate()
            .map(|(index, embedding)| {
                if embedding.len() != self.query.len() {
                    return Err(RankError::DimensionMismatch {
                        index,
                        expected: self.query.len(),
                        found: embedding.len(),
                    });
                }
                cosine_similarity(self.query, embedding)
                    .ok_or(RankError::DegenerateVector { index: Some(index) })
            })
            .collect()
    }

    /// All documents ordered by descending score.
    ///
    /// The sort is stable, so equal scores keep ascending index order.
    pub fn ordered(&self) -> RankResult<Vec<RankedMatch>> {
        let mut ordered: Vec<RankedMatch> = self
            .scores()?
            .into_iter()
            .enumerate()
            .map(|(index, score)| RankedMatch { index, score })
            .collect();
        ordered.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ordered)
    }

    /// Rank the collection and return the single best match with all scores.
    pub fn rank(&self) -> RankResult<Ranking> {
        let scores = self.scores()?;
        let mut best = RankedMatch {
            index: 0,
            score: scores[0],
        };
        for (index, &score) in scores.iter().enumerate().skip(1) {
            // strict comparison: the first maximum wins
            if score > best.score {
                best = RankedMatch { index, score };
            }
        }
        Ok(Ranking { best, scores })
    }

    /// The `k` best matches, best first.
    pub fn rank_top_k(&self, k: usize) -> RankResult<Vec<RankedMatch>> {
        let mut ordered = self.ordered()?;
        ordered.truncate(k);
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    fn toy_collection() -> Vec<Vec<f32>> {
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]).unwrap() - 1.0).abs() < EPS);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < EPS);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]).unwrap() + 1.0).abs() < EPS);
        assert!((cosine_similarity(&[2.0, 2.0], &[1.0, 1.0]).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_similarity_undefined_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
    }

    #[test]
    fn test_scores_match_pairwise_similarity() {
        let collection = toy_collection();
        let query = [0.3, 0.7];
        let scores = Ranker::new(&query, &collection).scores().unwrap();

        for (embedding, score) in collection.iter().zip(&scores) {
            assert_eq!(Some(*score), cosine_similarity(&query, embedding));
        }
    }

    #[test]
    fn test_toy_scenario_selects_exact_match() {
        let collection = toy_collection();
        let ranking = Ranker::new(&[1.0, 0.0], &collection).rank().unwrap();

        assert_eq!(ranking.best.index, 0);
        assert!((ranking.best.score - 1.0).abs() < EPS);
        assert_eq!(ranking.scores.len(), 3);
        assert!(ranking.scores[2] > ranking.scores[1]);
    }

    #[test]
    fn test_best_is_exact_maximum() {
        let collection = vec![
            vec![0.2, 0.9, 0.1],
            vec![0.7, 0.7, 0.0],
            vec![-0.5, 0.1, 0.9],
            vec![0.6, 0.8, 0.05],
        ];
        let query = [0.5, 0.8, 0.1];
        let ranking = Ranker::new(&query, &collection).rank().unwrap();

        for (index, score) in ranking.scores.iter().enumerate() {
            assert!(ranking.best.score >= *score, "index {} beats best", index);
        }
        assert_eq!(ranking.scores[ranking.best.index], ranking.best.score);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let collection = vec![vec![0.0, 1.0], vec![2.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]];
        let query = [1.0, 0.0];
        let ranker = Ranker::new(&query, &collection);

        assert_eq!(ranker.rank().unwrap().best.index, 1);

        let ordered = ranker.ordered().unwrap();
        let indices: Vec<usize> = ordered.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_empty_collection_fails() {
        let collection: Vec<Vec<f32>> = Vec::new();
        assert_eq!(
            Ranker::new(&[1.0, 0.0], &collection).rank(),
            Err(RankError::EmptyCollection)
        );
        assert_eq!(
            Ranker::new(&[1.0, 0.0], &collection).rank_top_k(3),
            Err(RankError::EmptyCollection)
        );
    }

    #[test]
    fn test_zero_query_is_degenerate() {
        let collection = toy_collection();
        assert_eq!(
            Ranker::new(&[0.0, 0.0], &collection).rank(),
            Err(RankError::DegenerateVector { index: None })
        );
    }

    #[test]
    fn test_zero_document_is_degenerate() {
        let collection = vec![vec![1.0, 0.0], vec![0.0, 0.0]];
        assert_eq!(
            Ranker::new(&[1.0, 0.0], &collection).rank(),
            Err(RankError::DegenerateVector { index: Some(1) })
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let collection = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert_eq!(
            Ranker::new(&[1.0, 0.0], &collection).rank(),
            Err(RankError::DimensionMismatch {
                index: 1,
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_fresh_rankers_agree() {
        let collection = toy_collection();
        let query = vec![0.3, 0.7];

        let first = Ranker::new(&query, &collection).rank().unwrap();
        let second = Ranker::new(&query, &collection).rank().unwrap();

        assert_eq!(first.best, second.best);
        assert_eq!(first.scores, second.scores);
        assert_eq!(collection, toy_collection());
    }

    #[test]
    fn test_rank_top_k_truncates_in_order() {
        let collection = toy_collection();
        let top = Ranker::new(&[1.0, 0.0], &collection).rank_top_k(2).unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].index, 0);
        assert_eq!(top[1].index, 2);

        let all = Ranker::new(&[1.0, 0.0], &collection).rank_top_k(10).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RankError::DegenerateVector { index: None }.to_string(),
            "Degenerate vector (zero magnitude) at query"
        );
        assert_eq!(
            RankError::DegenerateVector { index: Some(4) }.to_string(),
            "Degenerate vector (zero magnitude) at document 4"
        );
    }
}
