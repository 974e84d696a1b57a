//! Catalog records as they are stored in, and read back from, the store.

use serde::{Deserialize, Serialize};

/// Catalog track id. Also the row index into the embedding matrix.
pub type TrackId = i64;
/// Artist id, the key of the artist namespace.
pub type ArtistId = i64;
/// Bot user id.
pub type UserId = i64;

/// A catalog track as stored. It carries its own candidate next tracks.
///
/// Immutable once loaded. The `recommendations` order is meaningful
/// (it comes ranked from the offline pipeline) and survives a
/// round-trip through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Track id.
    pub track: TrackId,
    pub artist: ArtistId,
    pub title: String,
    /// Candidate next-track ids.
    #[serde(default)]
    pub recommendations: Vec<TrackId>,
}

impl Track {
    #[must_use]
    pub fn new(track: TrackId, artist: ArtistId, title: impl Into<String>) -> Self {
        Self {
            track,
            artist,
            title: title.into(),
            recommendations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_recommendations(mut self, recommendations: Vec<TrackId>) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Whether the offline pipeline produced any candidates for this track.
    #[must_use]
    pub fn has_recommendations(&self) -> bool {
        !self.recommendations.is_empty()
    }
}

/// One line of a precomputed per-user recommendation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecommendations {
    pub user: UserId,
    pub tracks: Vec<TrackId>,
}

/// One line of an embedding file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEmbedding {
    pub track: TrackId,
    pub embedding: Vec<f32>,
}
