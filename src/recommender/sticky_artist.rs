use rand::seq::SliceRandom;
use rand::RngCore;

use super::{RecommendError, Recommender};
use crate::store::{SharedStore, StoreExt};
use crate::track::{Track, TrackId, UserId};

/// Keep playing the artist of the previous track.
///
/// Unlike the other strategies there is no fallback: the previous track and
/// its artist are expected to exist, so a miss means the catalog is
/// inconsistent and is reported as an error.
#[derive(Clone)]
pub struct StickyArtist {
    tracks: SharedStore,
    artists: SharedStore,
}

impl StickyArtist {
    #[must_use]
    pub fn new(tracks: SharedStore, artists: SharedStore) -> Self {
        Self { tracks, artists }
    }
}

impl Recommender for StickyArtist {
    fn recommend_next(
        &self,
        _user: UserId,
        prev_track: TrackId,
        _prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        let track = self
            .tracks
            .get_value::<Track>(prev_track)?
            .ok_or(RecommendError::TrackNotFound(prev_track))?;

        let artist_not_found = RecommendError::ArtistNotFound {
            artist: track.artist,
            track: prev_track,
        };
        let artist_tracks = self
            .artists
            .get_value::<Vec<TrackId>>(track.artist)?
            .ok_or(artist_not_found)?;

        // An artist entry without tracks is as inconsistent as no entry.
        artist_tracks
            .choose(rng)
            .copied()
            .ok_or(RecommendError::ArtistNotFound {
                artist: track.artist,
                track: prev_track,
            })
    }
}
