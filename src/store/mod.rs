//! # Key-Value Store
//!
//! Everything the engine reads on the hot path lives behind
//! [`KeyValueStore`]: track records, artist track lists, the precomputed
//! per-user lists and the per-user session cache. Keys are plain integers
//! (track, artist or user ids depending on the [`Namespace`]); values are
//! opaque bytes produced by [`crate::codec`].
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`] - a map behind a lock, used by tests and one-off runs
//! - [`SqliteStore`] - one table per namespace in a single SQLite file
//!
//! Single-key `get`/`set` are atomic in both. Nothing in the engine needs
//! more than that.

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::codec;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteDatabase, SqliteStore};

/// Store key: a track, artist or user id.
pub type Key = i64;

/// Shared handle to one namespace.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Logically separate key spaces. Backends may keep them in one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// track id -> [`crate::track::Track`]
    Tracks,
    /// track id -> [`crate::track::Track`] with diversity-reranked candidates
    TracksWithDiverseRecs,
    /// artist id -> track ids by that artist
    Artists,
    /// user id -> collaborative-filtering track list
    Recommendations,
    /// user id -> SVD-derived track list
    RecommendationsSvd,
    /// user id -> cached embedding neighbourhood
    Sessions,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Tracks,
        Namespace::TracksWithDiverseRecs,
        Namespace::Artists,
        Namespace::Recommendations,
        Namespace::RecommendationsSvd,
        Namespace::Sessions,
    ];

    /// Table name in the SQLite backend.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Namespace::Tracks => "tracks",
            Namespace::TracksWithDiverseRecs => "tracks_with_diverse_recs",
            Namespace::Artists => "artists",
            Namespace::Recommendations => "recommendations",
            Namespace::RecommendationsSvd => "recommendations_svd",
            Namespace::Sessions => "sessions",
        }
    }
}

/// The store contract the engine is written against.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: Key) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: Key, value: &[u8]) -> Result<(), StoreError>;

    fn exists(&self, key: Key) -> Result<bool, StoreError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: Key) -> Result<(), StoreError>;

    /// A uniformly random key, or `None` when the namespace is empty.
    ///
    /// The generator is passed in so that callers (and tests) control the
    /// draw.
    fn random_key(&self, rng: &mut dyn RngCore) -> Result<Option<Key>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Remove every key in the namespace.
    fn clear(&self) -> Result<(), StoreError>;

    /// Bulk write. Backends override this when they can batch.
    fn set_many(&self, entries: &[(Key, Vec<u8>)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(*key, value)?;
        }
        Ok(())
    }
}

/// Typed access on top of the byte-level contract.
pub trait StoreExt: KeyValueStore {
    fn get_value<T: DeserializeOwned>(&self, key: Key) -> Result<Option<T>, StoreError> {
        self.get(key)?
            .map(|bytes| codec::from_bytes(&bytes))
            .transpose()
    }

    fn set_value<T: Serialize + ?Sized>(&self, key: Key, value: &T) -> Result<(), StoreError> {
        self.set(key, &codec::to_bytes(value)?)
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}

/// One handle per namespace, all from the same backend.
#[derive(Clone)]
pub struct Stores {
    pub tracks: SharedStore,
    pub tracks_with_diverse_recs: SharedStore,
    pub artists: SharedStore,
    pub recommendations: SharedStore,
    pub recommendations_svd: SharedStore,
    pub sessions: SharedStore,
}

impl Stores {
    /// Fresh, empty in-memory namespaces.
    #[must_use]
    pub fn in_memory() -> Self {
        let fresh = || -> SharedStore { Arc::new(MemoryStore::new()) };
        Self {
            tracks: fresh(),
            tracks_with_diverse_recs: fresh(),
            artists: fresh(),
            recommendations: fresh(),
            recommendations_svd: fresh(),
            sessions: fresh(),
        }
    }

    /// Tables of `database`, created if missing.
    pub fn sqlite(database: &SqliteDatabase) -> Result<Self, StoreError> {
        let table =
            |ns| -> Result<SharedStore, StoreError> { Ok(Arc::new(database.namespace(ns)?)) };
        Ok(Self {
            tracks: table(Namespace::Tracks)?,
            tracks_with_diverse_recs: table(Namespace::TracksWithDiverseRecs)?,
            artists: table(Namespace::Artists)?,
            recommendations: table(Namespace::Recommendations)?,
            recommendations_svd: table(Namespace::RecommendationsSvd)?,
            sessions: table(Namespace::Sessions)?,
        })
    }

    #[must_use]
    pub fn namespace(&self, namespace: Namespace) -> &SharedStore {
        match namespace {
            Namespace::Tracks => &self.tracks,
            Namespace::TracksWithDiverseRecs => &self.tracks_with_diverse_recs,
            Namespace::Artists => &self.artists,
            Namespace::Recommendations => &self.recommendations,
            Namespace::RecommendationsSvd => &self.recommendations_svd,
            Namespace::Sessions => &self.sessions,
        }
    }
}
