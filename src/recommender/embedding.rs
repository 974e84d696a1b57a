use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::RngCore;
use std::sync::Arc;

use super::{RandomRecommender, RecommendError, Recommender, Strategy};
use crate::embedding::{ContextModel, ModelError, TrackEmbeddingMatrix, DEFAULT_TOP_K};
use crate::session::{SessionCache, SessionState};
use crate::store::SharedStore;
use crate::track::{TrackId, UserId};

/// Recommend tracks close to the user and the previous track in embedding
/// space.
///
/// The first request of a session asks the [`ContextModel`] for a context
/// vector, keeps the `k` best-scoring tracks and caches them in the
/// [`SessionCache`]. Every later request of that session draws from the
/// cached neighbourhood without touching the model. The cache is dropped
/// when the session ends.
///
/// If the model or the matrix cannot produce a neighbourhood the request
/// falls back (to a random track by default) and the session stays Cold.
pub struct EmbeddingContextual {
    matrix: Arc<TrackEmbeddingMatrix>,
    model: Arc<dyn ContextModel>,
    sessions: SessionCache,
    top_k: usize,
    fallback: Box<Strategy>,
}

impl EmbeddingContextual {
    #[must_use]
    pub fn new(
        matrix: Arc<TrackEmbeddingMatrix>,
        model: Arc<dyn ContextModel>,
        sessions: SessionCache,
        tracks: SharedStore,
    ) -> Self {
        Self {
            matrix,
            model,
            sessions,
            top_k: DEFAULT_TOP_K,
            fallback: Box::new(RandomRecommender::new(tracks).into()),
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<Strategy>) -> Self {
        self.fallback = Box::new(fallback.into());
        self
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Nearest `top_k` tracks for this (user, previous track) context.
    pub fn neighbourhood(
        &self,
        user: UserId,
        prev_track: TrackId,
    ) -> Result<Vec<TrackId>, ModelError> {
        let context = self.model.context_vector(user, prev_track)?;
        self.matrix.nearest(&context, self.top_k)
    }

    fn fall_back(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        self.fallback
            .recommend_next(user, prev_track, prev_track_time, rng)
    }
}

impl Recommender for EmbeddingContextual {
    fn recommend_next(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        let neighbourhood = match self.sessions.state(user)? {
            SessionState::Warm(tracks) => tracks,
            SessionState::Cold => match self.neighbourhood(user, prev_track) {
                Ok(tracks) if !tracks.is_empty() => {
                    self.sessions.warm(user, &tracks)?;
                    tracks
                }
                Ok(_) => {
                    debug!(
                        "Empty neighbourhood for user {user}, falling back to {}",
                        self.fallback.name()
                    );
                    return self.fall_back(user, prev_track, prev_track_time, rng);
                }
                Err(err) => {
                    warn!(
                        "No neighbourhood for user {user} ({err}), falling back to {}",
                        self.fallback.name()
                    );
                    return self.fall_back(user, prev_track, prev_track_time, rng);
                }
            },
        };

        match neighbourhood.choose(rng) {
            Some(&track) => Ok(track),
            None => self.fall_back(user, prev_track, prev_track_time, rng),
        }
    }
}
