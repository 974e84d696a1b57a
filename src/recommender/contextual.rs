use log::debug;
use rand::seq::SliceRandom;
use rand::RngCore;

use super::{RandomRecommender, RecommendError, Recommender, Strategy};
use crate::store::{SharedStore, StoreExt};
use crate::track::{Track, TrackId, UserId};

/// Recommend one of the candidates stored with the previous track.
///
/// Picks uniformly rather than the top candidate, so listeners keep
/// exploring. Falls back when the track is unknown or has no candidates.
pub struct Contextual {
    name: &'static str,
    tracks: SharedStore,
    fallback: Box<Strategy>,
}

impl Contextual {
    /// Bound to a track namespace, falling back to a random track from it.
    #[must_use]
    pub fn new(tracks: SharedStore) -> Self {
        let fallback = RandomRecommender::new(tracks.clone());
        Self {
            name: "contextual",
            tracks,
            fallback: Box::new(fallback.into()),
        }
    }

    /// Log name, so arms bound to different namespaces can be told apart.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<Strategy>) -> Self {
        self.fallback = Box::new(fallback.into());
        self
    }
}

impl Recommender for Contextual {
    fn recommend_next(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        let candidate = self
            .tracks
            .get_value::<Track>(prev_track)?
            .and_then(|track| track.recommendations.choose(rng).copied());

        match candidate {
            Some(track) => Ok(track),
            None => {
                debug!(
                    "No candidates for track {prev_track}, falling back to {}",
                    self.fallback.name()
                );
                self.fallback
                    .recommend_next(user, prev_track, prev_track_time, rng)
            }
        }
    }
}
