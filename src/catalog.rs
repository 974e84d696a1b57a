//! # Catalog Loader
//!
//! Reads the offline catalog files and uploads them into the store
//! namespaces the recommenders read from.
//!
//! ## File formats
//!
//! - tracks, tracks with diverse recommendations: JSON lines of
//!   `{"track": 1, "artist": 100, "title": "...", "recommendations": [2, 3]}`
//! - top tracks: a JSON array of track ids
//! - per-user recommendations: JSON lines of `{"user": 7, "tracks": [1, 2]}`
//! - embeddings: JSON lines of `{"track": 1, "embedding": [0.1, ...]}`
//! - context model: `{"users": {"7": [...]}, "tracks": {"1": [...]}}`
//!
//! JSON-lines files are parsed in parallel; a malformed line fails the whole
//! file with its line number.

use anyhow::{Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::codec;
use crate::config::CatalogPaths;
use crate::embedding::{EmbeddingTableModel, TrackEmbeddingMatrix};
use crate::store::{Key, KeyValueStore, StoreError, Stores};
use crate::track::{ArtistId, Track, TrackEmbedding, TrackId, UserRecommendations};

/// Parse one JSON value per non-blank line of `path`.
pub fn read_json_lines<T: DeserializeOwned + Send>(path: &Path) -> Result<Vec<T>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let lines: Vec<(usize, &str)> = raw
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    lines
        .par_iter()
        .map(|&(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Malformed record at {}:{}", path.display(), number + 1))
        })
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Malformed JSON in {}", path.display()))
}

pub fn load_tracks(path: &Path) -> Result<Vec<Track>> {
    info!("Loading tracks from {}", path.display());
    let tracks: Vec<Track> = read_json_lines(path)?;
    info!("Loaded {} tracks", tracks.len());
    Ok(tracks)
}

pub fn load_top_tracks(path: &Path) -> Result<Vec<TrackId>> {
    info!("Loading top tracks from {}", path.display());
    let top: Vec<TrackId> = read_json(path)?;
    info!("Loaded {} top tracks", top.len());
    Ok(top)
}

pub fn load_user_recommendations(path: &Path) -> Result<Vec<UserRecommendations>> {
    info!("Loading recommendations from {}", path.display());
    let lists: Vec<UserRecommendations> = read_json_lines(path)?;
    info!("Loaded recommendations for {} users", lists.len());
    Ok(lists)
}

/// Dense matrix from a JSON-lines embedding export.
pub fn load_embeddings(path: &Path) -> Result<TrackEmbeddingMatrix> {
    info!("Loading track embeddings from {}", path.display());
    let rows: Vec<TrackEmbedding> = read_json_lines(path)?;
    let matrix = TrackEmbeddingMatrix::from_rows(&rows)
        .with_context(|| format!("Invalid embeddings in {}", path.display()))?;
    info!(
        "Loaded {} track embeddings of dimension {}",
        matrix.len(),
        matrix.dim()
    );
    Ok(matrix)
}

pub fn load_context_model(path: &Path) -> Result<EmbeddingTableModel> {
    info!("Loading context model from {}", path.display());
    read_json(path)
}

/// Track ids per artist, artists in ascending id order, tracks in catalog
/// order within an artist.
#[must_use]
pub fn group_by_artist(tracks: &[Track]) -> BTreeMap<ArtistId, Vec<TrackId>> {
    let mut artists: BTreeMap<ArtistId, Vec<TrackId>> = BTreeMap::new();
    for track in tracks {
        artists.entry(track.artist).or_default().push(track.track);
    }
    artists
}

fn encode_all<'a, V, I>(entries: I) -> Result<Vec<(Key, Vec<u8>)>, StoreError>
where
    V: Serialize + Sync + ?Sized + 'a,
    I: IntoParallelIterator<Item = (Key, &'a V)>,
{
    entries
        .into_par_iter()
        .map(|(key, value)| codec::to_bytes(value).map(|bytes| (key, bytes)))
        .collect()
}

/// Write every track under its id. Returns the number written.
pub fn upload_tracks(store: &dyn KeyValueStore, tracks: &[Track]) -> Result<usize> {
    let entries = encode_all(tracks.par_iter().map(|t| (t.track, t)))?;
    store
        .set_many(&entries)
        .context("Failed to upload tracks")?;
    info!("Uploaded {} tracks", entries.len());
    Ok(entries.len())
}

/// Write the track list of every artist. Returns the number of artists.
pub fn upload_artists(store: &dyn KeyValueStore, tracks: &[Track]) -> Result<usize> {
    let artists = group_by_artist(tracks);
    let entries = encode_all(artists.par_iter().map(|(&artist, ids)| (artist, ids.as_slice())))?;
    store
        .set_many(&entries)
        .context("Failed to upload artists")?;
    info!("Uploaded {} artists", entries.len());
    Ok(entries.len())
}

/// Write each user's precomputed list. Returns the number of users.
pub fn upload_recommendations(
    store: &dyn KeyValueStore,
    lists: &[UserRecommendations],
) -> Result<usize> {
    let entries = encode_all(lists.par_iter().map(|l| (l.user, l.tracks.as_slice())))?;
    store
        .set_many(&entries)
        .context("Failed to upload recommendations")?;
    info!("Uploaded recommendations for {} users", entries.len());
    Ok(entries.len())
}

/// What `load` found and wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub tracks: usize,
    pub tracks_with_diverse_recs: usize,
    pub artists: usize,
    pub recommendations: usize,
    pub recommendations_svd: usize,
}

/// Upload every configured catalog file into `stores`.
///
/// Missing paths are skipped. Artists are derived from the main track file.
pub fn upload(paths: &CatalogPaths, stores: &Stores) -> Result<UploadSummary> {
    let mut summary = UploadSummary::default();

    if let Some(path) = &paths.tracks {
        let tracks = load_tracks(path)?;
        summary.tracks = upload_tracks(stores.tracks.as_ref(), &tracks)?;
        summary.artists = upload_artists(stores.artists.as_ref(), &tracks)?;
    }

    if let Some(path) = &paths.tracks_with_diverse_recs {
        let tracks = load_tracks(path)?;
        summary.tracks_with_diverse_recs =
            upload_tracks(stores.tracks_with_diverse_recs.as_ref(), &tracks)?;
        debug!("Diverse catalog holds {} tracks", summary.tracks_with_diverse_recs);
    }

    if let Some(path) = &paths.recommendations {
        let lists = load_user_recommendations(path)?;
        summary.recommendations = upload_recommendations(stores.recommendations.as_ref(), &lists)?;
    }

    if let Some(path) = &paths.recommendations_svd {
        let lists = load_user_recommendations(path)?;
        summary.recommendations_svd =
            upload_recommendations(stores.recommendations_svd.as_ref(), &lists)?;
    }

    Ok(summary)
}
