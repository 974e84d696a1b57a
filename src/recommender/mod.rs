//! # Next-Track Recommenders
//!
//! Every strategy answers the same question: given a user, the track they
//! just played and how long they listened, which track comes next?
//!
//! ## Strategies
//!
//! - [`RandomRecommender`] - any track in the catalog; the end of every chain
//! - [`Contextual`] - a random candidate of the previous track
//! - [`Collaborative`] - a random track from the user's precomputed list
//! - [`StickyArtist`] - another track by the same artist
//! - [`TopPop`] - a random globally popular track
//! - [`EmbeddingContextual`] - nearest neighbours of a context vector,
//!   cached per listening session
//!
//! ## Fallbacks
//!
//! A strategy that has nothing personal to offer hands the request to the
//! fallback it owns (a [`Strategy`] in a `Box`), by default a
//! [`RandomRecommender`] over the track namespace. A miss is never an error.
//!
//! The only errors are:
//!
//! - [`RecommendError::TrackNotFound`] / [`RecommendError::ArtistNotFound`]
//!   from [`StickyArtist`], when the catalog references something it does
//!   not contain
//! - [`RecommendError::EmptyCatalog`], when there is no track to pick at all
//! - [`RecommendError::Store`], when the store itself fails
//!
//! ## Randomness
//!
//! Callers pass the generator in. Services use a thread-local one; tests
//! seed a `StdRng`.

use rand::RngCore;
use thiserror::Error;

use crate::store::StoreError;
use crate::track::{ArtistId, TrackId, UserId};

mod collaborative;
mod contextual;
mod embedding;
mod random;
mod sticky_artist;
mod top_pop;

pub use collaborative::Collaborative;
pub use contextual::Contextual;
pub use embedding::EmbeddingContextual;
pub use random::RandomRecommender;
pub use sticky_artist::StickyArtist;
pub use top_pop::TopPop;

/// Faults a recommender reports to its caller.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Artist {artist} of track {track} not found")]
    ArtistNotFound { artist: ArtistId, track: TrackId },

    #[error("The track catalog is empty, nothing can be recommended")]
    EmptyCatalog,

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl RecommendError {
    /// Whether the catalog contradicts itself, as opposed to being
    /// unavailable.
    #[must_use]
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            RecommendError::TrackNotFound(_) | RecommendError::ArtistNotFound { .. }
        )
    }
}

/// The next-track contract.
pub trait Recommender {
    /// Pick the next track for `user`.
    ///
    /// `prev_track_time` is the listen time of `prev_track` in seconds.
    ///
    /// # Errors
    ///
    /// See [`RecommendError`]. A missing personalised recommendation is not
    /// an error; implementations delegate to their fallback instead.
    fn recommend_next(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError>;
}

/// The closed set of strategies, dispatched by treatment.
pub enum Strategy {
    Random(RandomRecommender),
    Contextual(Contextual),
    Collaborative(Collaborative),
    StickyArtist(StickyArtist),
    TopPop(TopPop),
    Embedding(EmbeddingContextual),
}

impl Strategy {
    /// Short name for logs and decision events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Random(_) => "random",
            Strategy::Contextual(s) => s.name(),
            Strategy::Collaborative(s) => s.name(),
            Strategy::StickyArtist(_) => "sticky_artist",
            Strategy::TopPop(_) => "top_pop",
            Strategy::Embedding(_) => "embedding",
        }
    }
}

impl Recommender for Strategy {
    fn recommend_next(
        &self,
        user: UserId,
        prev_track: TrackId,
        prev_track_time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<TrackId, RecommendError> {
        match self {
            Strategy::Random(s) => s.recommend_next(user, prev_track, prev_track_time, rng),
            Strategy::Contextual(s) => s.recommend_next(user, prev_track, prev_track_time, rng),
            Strategy::Collaborative(s) => s.recommend_next(user, prev_track, prev_track_time, rng),
            Strategy::StickyArtist(s) => s.recommend_next(user, prev_track, prev_track_time, rng),
            Strategy::TopPop(s) => s.recommend_next(user, prev_track, prev_track_time, rng),
            Strategy::Embedding(s) => s.recommend_next(user, prev_track, prev_track_time, rng),
        }
    }
}

impl From<RandomRecommender> for Strategy {
    fn from(strategy: RandomRecommender) -> Self {
        Strategy::Random(strategy)
    }
}

impl From<Contextual> for Strategy {
    fn from(strategy: Contextual) -> Self {
        Strategy::Contextual(strategy)
    }
}

impl From<Collaborative> for Strategy {
    fn from(strategy: Collaborative) -> Self {
        Strategy::Collaborative(strategy)
    }
}

impl From<StickyArtist> for Strategy {
    fn from(strategy: StickyArtist) -> Self {
        Strategy::StickyArtist(strategy)
    }
}

impl From<TopPop> for Strategy {
    fn from(strategy: TopPop) -> Self {
        Strategy::TopPop(strategy)
    }
}

impl From<EmbeddingContextual> for Strategy {
    fn from(strategy: EmbeddingContextual) -> Self {
        Strategy::Embedding(strategy)
    }
}
