use log::debug;
use rand::seq::SliceRandom;
use rand::RngCore;

use super::{RandomRecommender, RecommendError, Recommender, Strategy};
use crate::store::{SharedStore, StoreExt};
use crate::track::{TrackId, UserId};

/// Recommend from the list precomputed offline for the user.
///
/// The same strategy serves the plain collaborative-filtering lists and the
/// SVD-derived ones; only the namespace it is bound to differs.
pub struct Collaborative {
    name: &'static str,
    recommendations: SharedStore,
    fallback: Box<Strategy>,
}

impl Collaborative {
    /// `recommendations` maps user id to track ids. Misses fall back to a
    /// random track from `tracks`.
    #[must_use]
    pub fn new(recommendations: SharedStore, tracks: SharedStore) -> Self {
        Self {
            name: "collaborative",
            recommendations,
            fallback: Box::new(RandomRecommender::new(tracks).into()),
        }
    }

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

impl Recommender for Collaborative {
    fn recommend_next(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        let pick = self
            .recommendations
            .get_value::<Vec<TrackId>>(user)?
            .and_then(|tracks| tracks.choose(rng).copied());

        match pick {
            Some(track) => Ok(track),
            None => {
                debug!(
                    "No precomputed list for user {user}, falling back to {}",
                    self.fallback.name()
                );
                self.fallback
                    .recommend_next(user, prev_track, prev_track_time, rng)
            }
        }
    }
}
