//! Next-track decisions for a music-streaming bot.
//!
//! Given a user, the track they just played and how long they listened,
//! Encore picks the track to play next. Which strategy picks it depends on
//! the user's treatment in the running A/B experiment.
//!
//! Core modules:
//! - [`recommender`] - The strategies and their fallback chains
//! - [`experiment`] - Deterministic treatment assignment
//! - [`embedding`] - Dot-product scoring and partial top-k selection
//! - [`session`] - Per-user neighbourhood cache (Cold / Warm)
//! - [`service`] - `next`, `last` and `track` requests plus decision logging
//!
//! ### Supporting Modules
//!
//! - [`store`] - Key-value namespaces (in-memory and SQLite backends)
//! - [`codec`] - Byte encoding of stored values
//! - [`track`] - Catalog records
//! - [`catalog`] - Catalog file loading and bulk upload
//! - [`config`] - Engine configuration and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```
//! use encore::recommender::{Contextual, Recommender};
//! use encore::store::{MemoryStore, SharedStore, StoreExt};
//! use encore::track::Track;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::sync::Arc;
//!
//! let tracks: SharedStore = Arc::new(MemoryStore::new());
//! tracks.set_value(1, &Track::new(1, 100, "Intro").with_recommendations(vec![2, 3]))?;
//! tracks.set_value(2, &Track::new(2, 100, "Verse"))?;
//! tracks.set_value(3, &Track::new(3, 100, "Chorus"))?;
//!
//! let contextual = Contextual::new(tracks);
//! let mut rng = StdRng::seed_from_u64(7);
//! let next = contextual.recommend_next(42, 1, 95.0, &mut rng)?;
//! assert!(next == 2 || next == 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Serving
//!
//! ```no_run
//! use encore::config::EngineConfig;
//! use encore::service::RecommendationService;
//! use encore::store::{SqliteDatabase, Stores};
//!
//! let config = EngineConfig::load(None)?;
//! let database = SqliteDatabase::open(&config.db_path)?;
//! let service = RecommendationService::from_config(&config, Stores::sqlite(&database)?)?;
//!
//! let next = service.next_track(7, 1, 183.5)?;
//! println!("{} -> {}", next.user, next.track);
//! service.last_track(7, next.track, 12.0)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Library layers return typed errors ([`store::StoreError`],
//! [`recommender::RecommendError`], [`embedding::ModelError`],
//! [`service::ServiceError`]). Loading and configuration return
//! `anyhow::Result` with context.
//!
//! A missing personalised recommendation is never an error: strategies fall
//! back along their chain, ending in a random catalog track. Errors mean the
//! catalog contradicts itself (sticky-artist lookups), the catalog is empty,
//! or the store failed.

pub mod catalog;
pub mod cli;
pub mod codec;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod experiment;
pub mod recommender;
pub mod service;
pub mod session;
pub mod store;
pub mod track;
