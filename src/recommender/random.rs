use log::trace;
use rand::RngCore;

use super::{RecommendError, Recommender};
use crate::store::SharedStore;
use crate::track::{TrackId, UserId};

/// Any track in the catalog, uniformly. The last link of every fallback
/// chain.
#[derive(Clone)]
pub struct RandomRecommender {
    tracks: SharedStore,
}

impl RandomRecommender {
    #[must_use]
    pub fn new(tracks: SharedStore) -> Self {
        Self { tracks }
    }
}

impl Recommender for RandomRecommender {
    fn recommend_next(
        &self,
        user: UserId,
        _prev_track: TrackId,
        _prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        let track = self
            .tracks
            .random_key(rng)?
            .ok_or(RecommendError::EmptyCatalog)?;
        trace!("Random pick for user {user}: {track}");
        Ok(track)
    }
}
