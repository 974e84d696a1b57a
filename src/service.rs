//! # Recommendation Service
//!
//! The request-level entry points a transport (HTTP, CLI, a bot loop) calls:
//!
//! - [`RecommendationService::next_track`] - route the user through the
//!   active experiment, ask the treatment's strategy for a track, time it and
//!   record a `next` decision
//! - [`RecommendationService::last_track`] - the end of a listening session;
//!   drops the user's cached neighbourhood and records a `last` decision
//! - [`RecommendationService::track`] - catalog lookup by id
//!
//! Every arm is built once, up front, from shared read-only resources (store
//! handles, top list, embedding matrix, context model). Serving a request
//! touches no mutable state besides the session namespace of the store.
//!
//! ## Decision events
//!
//! Each `next`/`last` call produces a [`Datum`] handed to a
//! [`DecisionSink`]. The default sink writes one JSON object per line through
//! `log` on the `encore::decisions` target, so
//! `RUST_LOG=encore::decisions=info` is enough to capture them.

use anyhow::Context;
use chrono::Utc;
use log::{debug, info, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::catalog;
use crate::config::{EngineConfig, StrategyKind};
use crate::embedding::{ContextModel, TrackEmbeddingMatrix, DEFAULT_TOP_K};
use crate::experiment::{Experiment, Treatment};
use crate::recommender::{
    Collaborative, Contextual, EmbeddingContextual, RandomRecommender, RecommendError,
    Recommender, StickyArtist, Strategy, TopPop,
};
use crate::session::SessionCache;
use crate::store::{StoreError, StoreExt, Stores};
use crate::track::{Track, TrackId, UserId};

/// Log target of decision events.
pub const DECISION_TARGET: &str = "encore::decisions";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Recommendation failed: {0}")]
    Recommend(#[from] RecommendError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Experiment '{experiment}' has no arm for treatment {treatment}")]
    NoArm {
        experiment: String,
        treatment: Treatment,
    },

    #[error("Strategy '{strategy}' needs {resource}, which was not loaded")]
    MissingResource {
        strategy: &'static str,
        resource: &'static str,
    },
}

/// One logged decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub user: UserId,
    /// The track the user just played.
    pub track: TrackId,
    /// Seconds the user listened to `track`.
    pub time: f64,
    /// Seconds spent producing the response.
    pub latency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<TrackId>,
}

impl Datum {
    fn now(user: UserId, track: TrackId, time: f64, started: Instant) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            user,
            track,
            time,
            latency: started.elapsed().as_secs_f64(),
            recommendation: None,
        }
    }
}

/// Kind of decision event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Next,
    Last,
}

/// Where decision events go.
pub trait DecisionSink: Send + Sync {
    fn record(&self, event: Event, datum: &Datum);
}

/// Writes decisions as JSON lines on [`DECISION_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[derive(Serialize)]
struct LogLine<'a> {
    message: Event,
    #[serde(flatten)]
    datum: &'a Datum,
}

impl DecisionSink for LogSink {
    fn record(&self, event: Event, datum: &Datum) {
        match serde_json::to_string(&LogLine {
            message: event,
            datum,
        }) {
            Ok(line) => info!(target: DECISION_TARGET, "{line}"),
            Err(err) => warn!("Could not serialize decision for user {}: {err}", datum.user),
        }
    }
}

/// Response to a `next` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTrack {
    pub user: UserId,
    pub track: TrackId,
}

/// Loaded embedding index and the model that queries it.
#[derive(Clone)]
pub struct EmbeddingResources {
    pub matrix: Arc<TrackEmbeddingMatrix>,
    pub model: Arc<dyn ContextModel>,
}

/// Everything strategies are built from.
#[derive(Clone)]
pub struct Resources {
    pub stores: Stores,
    pub top_tracks: Arc<[TrackId]>,
    pub embedding: Option<EmbeddingResources>,
    pub top_k: usize,
}

impl Resources {
    #[must_use]
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            top_tracks: Arc::from(Vec::<TrackId>::new()),
            embedding: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    #[must_use]
    pub fn with_top_tracks(mut self, top_tracks: impl Into<Arc<[TrackId]>>) -> Self {
        self.top_tracks = top_tracks.into();
        self
    }

    #[must_use]
    pub fn with_embedding(
        mut self,
        matrix: Arc<TrackEmbeddingMatrix>,
        model: Arc<dyn ContextModel>,
    ) -> Self {
        self.embedding = Some(EmbeddingResources { matrix, model });
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Instantiate the strategy behind `kind`.
    pub fn build(&self, kind: StrategyKind) -> Result<Strategy, ServiceError> {
        let stores = &self.stores;
        let strategy: Strategy = match kind {
            StrategyKind::Random => RandomRecommender::new(stores.tracks.clone()).into(),
            StrategyKind::Contextual => Contextual::new(stores.tracks.clone()).into(),
            StrategyKind::DiverseContextual => {
                Contextual::new(stores.tracks_with_diverse_recs.clone())
                    .named("diverse_contextual")
                    .with_fallback(RandomRecommender::new(stores.tracks.clone()))
                    .into()
            }
            StrategyKind::Collaborative => {
                Collaborative::new(stores.recommendations.clone(), stores.tracks.clone()).into()
            }
            StrategyKind::CollaborativeSvd => {
                Collaborative::new(stores.recommendations_svd.clone(), stores.tracks.clone())
                    .named("collaborative_svd")
                    .into()
            }
            StrategyKind::StickyArtist => {
                StickyArtist::new(stores.tracks.clone(), stores.artists.clone()).into()
            }
            StrategyKind::TopPop => {
                TopPop::new(stores.tracks.clone(), Arc::clone(&self.top_tracks)).into()
            }
            StrategyKind::Embedding => {
                let embedding = self
                    .embedding
                    .as_ref()
                    .ok_or(ServiceError::MissingResource {
                        strategy: "embedding",
                        resource: "track embeddings and a context model",
                    })?;
                EmbeddingContextual::new(
                    Arc::clone(&embedding.matrix),
                    Arc::clone(&embedding.model),
                    SessionCache::new(stores.sessions.clone()),
                    stores.tracks.clone(),
                )
                .with_top_k(self.top_k)
                .into()
            }
        };
        Ok(strategy)
    }
}

/// Serves `next`, `last` and `track` requests.
pub struct RecommendationService {
    experiment: Experiment,
    arms: BTreeMap<Treatment, Strategy>,
    stores: Stores,
    sessions: SessionCache,
    sink: Arc<dyn DecisionSink>,
}

impl RecommendationService {
    /// Build one strategy per treatment of `experiment`.
    pub fn new(
        experiment: Experiment,
        arms: &BTreeMap<Treatment, StrategyKind>,
        resources: &Resources,
    ) -> Result<Self, ServiceError> {
        let mut built = BTreeMap::new();
        for treatment in experiment.split().treatments() {
            let kind = arms.get(&treatment).ok_or_else(|| ServiceError::NoArm {
                experiment: experiment.name().to_string(),
                treatment,
            })?;
            let strategy = resources.build(*kind)?;
            debug!(
                "Experiment {}: {treatment} -> {}",
                experiment.name(),
                strategy.name()
            );
            built.insert(treatment, strategy);
        }

        Ok(Self {
            experiment,
            arms: built,
            stores: resources.stores.clone(),
            sessions: SessionCache::new(resources.stores.sessions.clone()),
            sink: Arc::new(LogSink),
        })
    }

    /// Build the active experiment of `config`, loading the top list and,
    /// when an arm needs it, the embedding index and context model.
    pub fn from_config(config: &EngineConfig, stores: Stores) -> anyhow::Result<Self> {
        let active = config.active()?;
        let mut resources = Resources::new(stores).with_top_k(config.top_k);

        if let Some(path) = &config.catalog.top_tracks {
            resources = resources.with_top_tracks(catalog::load_top_tracks(path)?);
        }

        if active.arms.values().any(|&kind| kind == StrategyKind::Embedding) {
            let (Some(embeddings), Some(model)) =
                (&config.catalog.embeddings, &config.catalog.context_model)
            else {
                anyhow::bail!("The embedding strategy needs 'embeddings' and 'context_model'");
            };
            let matrix = catalog::load_embeddings(embeddings)?;
            let model = catalog::load_context_model(model)?;
            resources = resources.with_embedding(Arc::new(matrix), Arc::new(model));
        }

        let service = Self::new(active.experiment()?, &active.arms, &resources)
            .with_context(|| format!("Failed to build experiment '{}'", active.name))?;
        info!(
            "Serving experiment {} with {} arms",
            service.experiment.name(),
            service.arms.len()
        );
        Ok(service)
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Treatment `user` is served under.
    #[must_use]
    pub fn assign(&self, user: UserId) -> Treatment {
        self.experiment.assign(user)
    }

    /// Next track for `user`, drawn with the thread-local generator.
    pub fn next_track(
        &self,
        user: UserId,
        track: TrackId,
        time: f64,
    ) -> Result<NextTrack, ServiceError> {
        self.next_track_with(user, track, time, &mut rand::thread_rng())
    }

    /// Next track for `user`, drawn with `rng`.
    ///
    /// # Errors
    ///
    /// Data-integrity faults of the strategy ([`RecommendError::TrackNotFound`],
    /// [`RecommendError::ArtistNotFound`]) and an empty catalog come back as
    /// [`ServiceError::Recommend`]; no decision is recorded for them.
    pub fn next_track_with(
        &self,
        user: UserId,
        track: TrackId,
        time: f64,
        rng: &mut dyn RngCore,
    ) -> Result<NextTrack, ServiceError> {
        let started = Instant::now();

        let treatment = self.experiment.assign(user);
        let strategy = self.arms.get(&treatment).ok_or_else(|| ServiceError::NoArm {
            experiment: self.experiment.name().to_string(),
            treatment,
        })?;

        let recommendation = strategy
            .recommend_next(user, track, time, rng)
            .map_err(|err| {
                if err.is_integrity_fault() {
                    warn!("Catalog inconsistency while serving user {user}: {err}");
                }
                err
            })?;
        debug!(
            "User {user} ({treatment}, {}): {track} -> {recommendation}",
            strategy.name()
        );

        let mut datum = Datum::now(user, track, time, started);
        datum.recommendation = Some(recommendation);
        self.sink.record(Event::Next, &datum);

        Ok(NextTrack {
            user,
            track: recommendation,
        })
    }

    /// End of `user`'s listening session. Returns whether a cached
    /// neighbourhood was dropped.
    pub fn last_track(
        &self,
        user: UserId,
        track: TrackId,
        time: f64,
    ) -> Result<bool, ServiceError> {
        let started = Instant::now();
        let was_warm = self.sessions.end(user)?;
        self.sink
            .record(Event::Last, &Datum::now(user, track, time, started));
        Ok(was_warm)
    }

    /// Catalog record of `track`.
    pub fn track(&self, track: TrackId) -> Result<Track, ServiceError> {
        self.stores
            .tracks
            .get_value::<Track>(track)?
            .ok_or(ServiceError::TrackNotFound(track))
    }
}
