use log::debug;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::sync::Arc;

use super::{RandomRecommender, RecommendError, Recommender, Strategy};
use crate::store::SharedStore;
use crate::track::{TrackId, UserId};

/// A random track from the global top list loaded at start-up.
pub struct TopPop {
    top_tracks: Arc<[TrackId]>,
    fallback: Box<Strategy>,
}

impl TopPop {
    /// An empty `top_tracks` makes this behave like [`RandomRecommender`]
    /// over `tracks`.
    #[must_use]
    pub fn new(tracks: SharedStore, top_tracks: impl Into<Arc<[TrackId]>>) -> Self {
        Self {
            top_tracks: top_tracks.into(),
            fallback: Box::new(RandomRecommender::new(tracks).into()),
        }
    }
}

impl Recommender for TopPop {
    fn recommend_next(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        match self.top_tracks.choose(rng) {
            Some(&track) => Ok(track),
            None => {
                debug!("Top list is empty, falling back to {}", self.fallback.name());
                self.fallback
                    .recommend_next(user, prev_track, prev_track_time, rng)
            }
        }
    }
}
