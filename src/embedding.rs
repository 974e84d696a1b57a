//! Track scoring against a context vector.
//!
//! The embedding strategy scores every catalog track by the dot product of
//! its vector with a (user, previous track) context vector and keeps the
//! best `k`. This module owns the read-only matrix, the top-k selection and
//! the [`ContextModel`] capability that produces context vectors.

use log::trace;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

use crate::track::{TrackEmbedding, TrackId, UserId};

/// Default neighbourhood size cached per session.
pub const DEFAULT_TOP_K: usize = 40;

/// Errors from the embedding index or the context model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Context vector has {actual} dimensions, track embeddings have {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No context embedding for user {0}")]
    UnknownUser(UserId),

    #[error("No context embedding for track {0}")]
    UnknownTrack(TrackId),

    #[error("Embedding for track {track} has {actual} dimensions, expected {expected}")]
    RaggedRow {
        track: TrackId,
        expected: usize,
        actual: usize,
    },

    #[error("Track {0} has more than one embedding row")]
    DuplicateTrack(TrackId),

    #[error("Track embedding matrix is empty")]
    EmptyMatrix,
}

/// Dense track vectors, one row per embedded track.
///
/// Rows are kept in ascending track id order and `ids[i]` names row `i`.
/// Only tracks that have an embedding get a row. Loaded once at start-up
/// and shared read-only (behind an `Arc`) by every request; nothing mutates
/// it after construction.
#[derive(Debug, Clone)]
pub struct TrackEmbeddingMatrix {
    vectors: Array2<f32>,
    ids: Vec<TrackId>,
}

impl TrackEmbeddingMatrix {
    /// Matrix whose row `i` belongs to track id `i`.
    #[must_use]
    pub fn new(vectors: Array2<f32>) -> Self {
        let ids = (0..vectors.nrows())
            .filter_map(|row| TrackId::try_from(row).ok())
            .collect();
        Self { vectors, ids }
    }

    /// Assemble the matrix from per-track rows.
    ///
    /// Ids need not be contiguous or small: the matrix holds exactly one
    /// row per input record, whatever the ids are.
    pub fn from_rows(rows: &[TrackEmbedding]) -> Result<Self, ModelError> {
        let first = rows.first().ok_or(ModelError::EmptyMatrix)?;
        let dim = first.embedding.len();

        if let Some(row) = rows.iter().find(|row| row.embedding.len() != dim) {
            return Err(ModelError::RaggedRow {
                track: row.track,
                expected: dim,
                actual: row.embedding.len(),
            });
        }

        let mut sorted: Vec<&TrackEmbedding> = rows.iter().collect();
        sorted.sort_unstable_by_key(|row| row.track);
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0].track == pair[1].track) {
            return Err(ModelError::DuplicateTrack(pair[0].track));
        }

        let mut vectors = Array2::<f32>::zeros((sorted.len(), dim));
        for (mut target, row) in vectors.rows_mut().into_iter().zip(&sorted) {
            target.assign(&ArrayView1::from(row.embedding.as_slice()));
        }
        let ids = sorted.iter().map(|row| row.track).collect();

        Ok(Self { vectors, ids })
    }

    /// Number of embedded tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.nrows() == 0
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Track id of every row, ascending.
    #[must_use]
    pub fn ids(&self) -> &[TrackId] {
        &self.ids
    }

    /// Dot product of every row with `context`, in [`ids`](Self::ids) order.
    pub fn scores(&self, context: &Array1<f32>) -> Result<Vec<f32>, ModelError> {
        if self.is_empty() {
            return Err(ModelError::EmptyMatrix);
        }
        if context.len() != self.dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim(),
                actual: context.len(),
            });
        }

        Ok(self.vectors.dot(context).into_raw_vec())
    }

    /// The `k` track ids scoring highest against `context`.
    ///
    /// # Examples
    ///
    /// ```
    /// use encore::embedding::TrackEmbeddingMatrix;
    /// use ndarray::array;
    ///
    /// let matrix = TrackEmbeddingMatrix::new(array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]]);
    /// let nearest = matrix.nearest(&array![1.0, 0.0], 2).unwrap();
    /// assert_eq!(nearest, vec![1, 2]);
    /// ```
    pub fn nearest(&self, context: &Array1<f32>, k: usize) -> Result<Vec<TrackId>, ModelError> {
        let scores = self.scores(context)?;
        let top: Vec<TrackId> = top_rows(&scores, k)
            .into_iter()
            .map(|row| self.ids[row])
            .collect();
        trace!("Selected {} of {} tracks", top.len(), scores.len());
        Ok(top)
    }
}

/// Highest score first, lowest row among equal scores.
fn rank(scores: &[f32], a: usize, b: usize) -> Ordering {
    scores[b].total_cmp(&scores[a]).then(a.cmp(&b))
}

/// Rows of the best `k` scores, best first.
fn top_rows(scores: &[f32], k: usize) -> Vec<usize> {
    if k == 0 || scores.is_empty() {
        return Vec::new();
    }

    let mut indices: Vec<usize> = (0..scores.len()).collect();
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, |&a, &b| rank(scores, a, b));
        indices.truncate(k);
    }
    indices.sort_unstable_by(|&a, &b| rank(scores, a, b));
    indices
}

/// Partial top-k selection over `scores`, indexed by track id.
///
/// Runs `select_nth_unstable_by` (O(n) on average) to split off the best
/// `k` and only sorts those, so the cost stays linear in the catalog size.
/// The ordering is total: equal scores resolve to the lower track id, which
/// makes the result reproducible for a fixed matrix and context.
#[must_use]
pub fn select_top_k(scores: &[f32], k: usize) -> Vec<TrackId> {
    top_rows(scores, k)
        .into_iter()
        .filter_map(|index| TrackId::try_from(index).ok())
        .collect()
}

/// Produces the context vector for a (user, previous track) pair.
///
/// This is the user/context tower of the scoring model; whatever owns the
/// weights implements it. Implementations must be safe to share across
/// request threads.
pub trait ContextModel: Send + Sync {
    fn context_vector(&self, user: UserId, prev_track: TrackId) -> Result<Array1<f32>, ModelError>;
}

/// Exported context tower in its simplest form: one vector per user and one
/// per context track, summed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingTableModel {
    pub users: HashMap<UserId, Vec<f32>>,
    pub tracks: HashMap<TrackId, Vec<f32>>,
}

impl ContextModel for EmbeddingTableModel {
    fn context_vector(&self, user: UserId, prev_track: TrackId) -> Result<Array1<f32>, ModelError> {
        let user_vector = self.users.get(&user).ok_or(ModelError::UnknownUser(user))?;
        let track_vector = self
            .tracks
            .get(&prev_track)
            .ok_or(ModelError::UnknownTrack(prev_track))?;

        if user_vector.len() != track_vector.len() {
            return Err(ModelError::DimensionMismatch {
                expected: user_vector.len(),
                actual: track_vector.len(),
            });
        }

        Ok(user_vector
            .iter()
            .zip(track_vector)
            .map(|(u, t)| u + t)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_top_k_picks_highest_scores() {
        let scores = [0.1, 0.9, 0.3, 0.7, 0.5];
        assert_eq!(select_top_k(&scores, 3), vec![1, 3, 4]);
    }

    #[test]
    fn test_top_k_ties_prefer_lowest_track_id() {
        let scores = [1.0, 2.0, 2.0, 2.0, 1.0, 2.0];
        assert_eq!(select_top_k(&scores, 2), vec![1, 2]);
        assert_eq!(select_top_k(&scores, 5), vec![1, 2, 3, 5, 0]);
    }

    #[test]
    fn test_top_k_edge_cases() {
        assert!(select_top_k(&[], 3).is_empty());
        assert!(select_top_k(&[1.0, 2.0], 0).is_empty());
        assert_eq!(select_top_k(&[1.0, 2.0], 10), vec![1, 0]);
    }

    #[test]
    fn test_top_k_matches_full_sort() {
        let scores: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 613) as f32).collect();

        let mut expected: Vec<usize> = (0..scores.len()).collect();
        expected.sort_by(|&a, &b| rank(&scores, a, b));
        let expected: Vec<TrackId> = expected[..40].iter().map(|&i| i as TrackId).collect();

        assert_eq!(select_top_k(&scores, 40), expected);
    }

    #[test]
    fn test_nan_scores_do_not_panic() {
        let scores = [f32::NAN, 1.0, 0.5];
        assert_eq!(select_top_k(&scores, 3).len(), 3);
    }

    #[test]
    fn test_matrix_from_sparse_rows() {
        let rows = vec![
            TrackEmbedding { track: 3, embedding: vec![1.0, 0.0] },
            TrackEmbedding { track: 1, embedding: vec![0.0, 1.0] },
        ];
        let matrix = TrackEmbeddingMatrix::from_rows(&rows).unwrap();

        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.dim(), 2);
        assert_eq!(matrix.ids(), &[1, 3]);
        assert_eq!(matrix.scores(&array![2.0, 1.0]).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_nearest_only_returns_embedded_tracks() {
        let rows = vec![
            TrackEmbedding { track: 5, embedding: vec![-1.0] },
            TrackEmbedding { track: 6, embedding: vec![-2.0] },
            TrackEmbedding { track: 40, embedding: vec![-3.0] },
        ];
        let matrix = TrackEmbeddingMatrix::from_rows(&rows).unwrap();

        assert_eq!(matrix.nearest(&array![1.0], 2).unwrap(), vec![5, 6]);
        assert_eq!(matrix.nearest(&array![1.0], 10).unwrap(), vec![5, 6, 40]);
    }

    #[test]
    fn test_sparse_ties_prefer_lowest_track_id() {
        let rows = vec![
            TrackEmbedding { track: 90, embedding: vec![1.0] },
            TrackEmbedding { track: 12, embedding: vec![1.0] },
            TrackEmbedding { track: 50, embedding: vec![1.0] },
        ];
        let matrix = TrackEmbeddingMatrix::from_rows(&rows).unwrap();

        assert_eq!(matrix.nearest(&array![1.0], 2).unwrap(), vec![12, 50]);
    }

    #[test]
    fn test_huge_track_ids_take_one_row_each() {
        let rows = vec![
            TrackEmbedding { track: i64::MAX, embedding: vec![1.0] },
            TrackEmbedding { track: 1 << 40, embedding: vec![2.0] },
            TrackEmbedding { track: -3, embedding: vec![0.5] },
        ];
        let matrix = TrackEmbeddingMatrix::from_rows(&rows).unwrap();

        assert_eq!(matrix.len(), 3);
        assert_eq!(
            matrix.nearest(&array![1.0], 3).unwrap(),
            vec![1 << 40, i64::MAX, -3]
        );
    }

    #[test]
    fn test_duplicate_rows_are_rejected() {
        let rows = vec![
            TrackEmbedding { track: 4, embedding: vec![1.0] },
            TrackEmbedding { track: 4, embedding: vec![2.0] },
        ];
        assert!(matches!(
            TrackEmbeddingMatrix::from_rows(&rows),
            Err(ModelError::DuplicateTrack(4))
        ));
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let rows = vec![
            TrackEmbedding { track: 0, embedding: vec![1.0, 0.0] },
            TrackEmbedding { track: 1, embedding: vec![1.0] },
        ];
        assert!(matches!(
            TrackEmbeddingMatrix::from_rows(&rows),
            Err(ModelError::RaggedRow { track: 1, .. })
        ));
        assert!(matches!(
            TrackEmbeddingMatrix::from_rows(&[]),
            Err(ModelError::EmptyMatrix)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let matrix = TrackEmbeddingMatrix::new(array![[1.0, 0.0, 0.0]]);
        assert!(matches!(
            matrix.nearest(&array![1.0, 0.0], 1),
            Err(ModelError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_table_model_sums_user_and_track() {
        let model = EmbeddingTableModel {
            users: HashMap::from([(7, vec![1.0, 2.0])]),
            tracks: HashMap::from([(3, vec![0.5, -1.0])]),
        };

        assert_eq!(model.context_vector(7, 3).unwrap(), array![1.5, 1.0]);
        assert!(matches!(model.context_vector(8, 3), Err(ModelError::UnknownUser(8))));
        assert!(matches!(model.context_vector(7, 4), Err(ModelError::UnknownTrack(4))));
    }
}
