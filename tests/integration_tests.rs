//! # Integration Tests for Encore
//!
//! End-to-end tests from catalog files on disk, through a SQLite store, to
//! served decisions; plus the `encore` binary itself.

use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

use encore::catalog;
use encore::config::{CatalogPaths, EngineConfig, ExperimentConfig, StrategyKind};
use encore::experiment::{Experiment, Split, Treatment};
use encore::recommender::{Contextual, RandomRecommender, RecommendError, Recommender, StickyArtist};
use encore::service::RecommendationService;
use encore::store::{SqliteDatabase, StoreExt, Stores};
use encore::track::TrackId;
use rand::rngs::StdRng;
use rand::SeedableRng;

const TRACKS: &str = r#"{"track": 1, "artist": 100, "title": "Opening", "recommendations": [2, 3]}
{"track": 2, "artist": 100, "title": "Second", "recommendations": [1]}
{"track": 3, "artist": 100, "title": "Third", "recommendations": []}
{"track": 4, "artist": 100, "title": "Fourth", "recommendations": [9]}
{"track": 9, "artist": 200, "title": "Loner", "recommendations": []}
"#;

const DIVERSE_TRACKS: &str = r#"{"track": 1, "artist": 100, "title": "Opening", "recommendations": [9]}
"#;

const RECOMMENDATIONS: &str = r#"{"user": 7, "tracks": [4, 9]}
"#;

const RECOMMENDATIONS_SVD: &str = r#"{"user": 7, "tracks": [3]}
"#;

const EMBEDDINGS: &str = r#"{"track": 1, "embedding": [0.1, 0.0]}
{"track": 2, "embedding": [0.2, 0.0]}
{"track": 3, "embedding": [0.3, 0.0]}
{"track": 4, "embedding": [0.4, 0.0]}
{"track": 9, "embedding": [0.9, 0.0]}
"#;

const CONTEXT_MODEL: &str = r#"{"users": {"7": [1.0, 0.0]}, "tracks": {"1": [0.0, 1.0]}}"#;

/// Test helper writing every catalog file into a temporary directory
fn create_catalog() -> Result<(TempDir, CatalogPaths)> {
    let temp_dir = TempDir::new()?;
    let write = |name: &str, contents: &str| -> Result<PathBuf> {
        let path = temp_dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    };

    let paths = CatalogPaths {
        tracks: Some(write("tracks.json", TRACKS)?),
        tracks_with_diverse_recs: Some(write("tracks_with_diverse_recs.json", DIVERSE_TRACKS)?),
        top_tracks: Some(write("top_tracks.json", "[9, 4]")?),
        recommendations: Some(write("recommendations.json", RECOMMENDATIONS)?),
        recommendations_svd: Some(write("recommendations_svd.json", RECOMMENDATIONS_SVD)?),
        embeddings: Some(write("embeddings.json", EMBEDDINGS)?),
        context_model: Some(write("context_model.json", CONTEXT_MODEL)?),
    };

    Ok((temp_dir, paths))
}

/// Catalog uploaded into a SQLite file inside the same temporary directory
fn create_loaded_store() -> Result<(TempDir, PathBuf, CatalogPaths, Stores)> {
    let (temp_dir, paths) = create_catalog()?;
    let db_path = temp_dir.path().join("encore.db");
    let database = SqliteDatabase::open(&db_path)?;
    let stores = Stores::sqlite(&database)?;
    catalog::upload(&paths, &stores)?;
    Ok((temp_dir, db_path, paths, stores))
}

fn single_arm_config(db_path: &Path, catalog: CatalogPaths, kind: StrategyKind) -> EngineConfig {
    EngineConfig {
        db_path: db_path.to_path_buf(),
        catalog,
        top_k: 3,
        experiments: vec![ExperimentConfig {
            name: "ONLY".to_string(),
            split: Split::weighted(&[(Treatment::T1, 1)]),
            arms: [(Treatment::T1, kind)].into_iter().collect(),
        }],
        active_experiment: "ONLY".to_string(),
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;

    #[test]
    fn test_upload_into_sqlite() -> Result<()> {
        let (_temp_dir, _db_path, _paths, stores) = create_loaded_store()?;

        assert_eq!(stores.tracks.len()?, 5);
        assert_eq!(stores.tracks_with_diverse_recs.len()?, 1);
        assert_eq!(stores.artists.len()?, 2);
        assert_eq!(stores.artists.get_value::<Vec<TrackId>>(100)?, Some(vec![1, 2, 3, 4]));
        assert_eq!(stores.recommendations.get_value::<Vec<TrackId>>(7)?, Some(vec![4, 9]));
        assert_eq!(stores.recommendations_svd.get_value::<Vec<TrackId>>(7)?, Some(vec![3]));
        assert!(stores.sessions.is_empty()?);
        Ok(())
    }

    #[test]
    fn test_upload_survives_reopen() -> Result<()> {
        let (_temp_dir, db_path, _paths, _stores) = create_loaded_store()?;

        let reopened = Stores::sqlite(&SqliteDatabase::open(&db_path)?)?;
        let track: encore::track::Track = reopened.tracks.get_value(1)?.expect("track 1 stored");

        assert_eq!(track.recommendations, vec![2, 3]);
        Ok(())
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_contextual_hit_and_miss() -> Result<()> {
        let (_temp_dir, _db_path, _paths, stores) = create_loaded_store()?;
        let contextual = Contextual::new(stores.tracks.clone());
        let mut rng = StdRng::seed_from_u64(100);

        let hits: HashSet<_> = (0..500)
            .map(|_| contextual.recommend_next(1, 1, 60.0, &mut rng))
            .collect::<Result<_, _>>()?;
        assert_eq!(hits, HashSet::from([2, 3]));

        let catalog: HashSet<TrackId> = HashSet::from([1, 2, 3, 4, 9]);
        for _ in 0..100 {
            let miss = contextual.recommend_next(1, 9, 60.0, &mut rng)?;
            assert!(catalog.contains(&miss));
        }
        Ok(())
    }

    #[test]
    fn test_contextual_miss_matches_random_draw() -> Result<()> {
        let (_temp_dir, _db_path, _paths, stores) = create_loaded_store()?;
        let contextual = Contextual::new(stores.tracks.clone());
        let random = RandomRecommender::new(stores.tracks.clone());

        let mut contextual_rng = StdRng::seed_from_u64(4);
        let mut random_rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            assert_eq!(
                contextual.recommend_next(1, 9, 1.0, &mut contextual_rng)?,
                random.recommend_next(1, 9, 1.0, &mut random_rng)?
            );
        }
        Ok(())
    }

    #[test]
    fn test_sticky_artist_scenario() -> Result<()> {
        let (_temp_dir, _db_path, _paths, stores) = create_loaded_store()?;
        stores.artists.set_value(100, &vec![2_i64, 3, 4])?;
        let sticky = StickyArtist::new(stores.tracks.clone(), stores.artists.clone());
        let mut rng = StdRng::seed_from_u64(100);

        for _ in 0..1000 {
            let track = sticky.recommend_next(1, 1, 60.0, &mut rng)?;
            assert!([2, 3, 4].contains(&track));
        }

        assert!(matches!(
            sticky.recommend_next(1, 12345, 60.0, &mut rng),
            Err(RecommendError::TrackNotFound(12345))
        ));
        Ok(())
    }

    #[test]
    fn test_random_on_empty_store_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let database = SqliteDatabase::open(&temp_dir.path().join("empty.db"))?;
        let stores = Stores::sqlite(&database)?;
        let random = RandomRecommender::new(stores.tracks.clone());
        let mut rng = StdRng::seed_from_u64(1);

        assert!(matches!(
            random.recommend_next(1, 1, 0.0, &mut rng),
            Err(RecommendError::EmptyCatalog)
        ));
        Ok(())
    }
}

#[cfg(test)]
mod service_tests {
    use super::*;

    fn served(
        kind: StrategyKind,
        user: i64,
        prev_track: TrackId,
        calls: usize,
    ) -> Result<HashSet<TrackId>> {
        let (_temp_dir, db_path, paths, stores) = create_loaded_store()?;
        let config = single_arm_config(&db_path, paths, kind);
        let service = RecommendationService::from_config(&config, stores)?;
        let mut rng = StdRng::seed_from_u64(77);

        let mut seen = HashSet::new();
        for _ in 0..calls {
            seen.insert(service.next_track_with(user, prev_track, 30.0, &mut rng)?.track);
        }
        Ok(seen)
    }

    #[test]
    fn test_every_strategy_kind_serves() -> Result<()> {
        assert_eq!(served(StrategyKind::Contextual, 7, 1, 200)?, HashSet::from([2, 3]));
        assert_eq!(served(StrategyKind::DiverseContextual, 7, 1, 50)?, HashSet::from([9]));
        assert_eq!(served(StrategyKind::Collaborative, 7, 1, 200)?, HashSet::from([4, 9]));
        assert_eq!(served(StrategyKind::CollaborativeSvd, 7, 1, 50)?, HashSet::from([3]));
        assert_eq!(served(StrategyKind::StickyArtist, 7, 9, 50)?, HashSet::from([9]));
        assert_eq!(served(StrategyKind::TopPop, 7, 1, 200)?, HashSet::from([4, 9]));
        assert_eq!(served(StrategyKind::Embedding, 7, 1, 200)?, HashSet::from([9, 4, 3]));
        let catalog_ids = HashSet::from([1, 2, 3, 4, 9]);
        assert!(served(StrategyKind::Random, 7, 1, 200)?.is_subset(&catalog_ids));
        Ok(())
    }

    #[test]
    fn test_embedding_session_lifecycle() -> Result<()> {
        let (_temp_dir, db_path, paths, stores) = create_loaded_store()?;
        let config = single_arm_config(&db_path, paths, StrategyKind::Embedding);
        let service = RecommendationService::from_config(&config, stores.clone())?;

        assert!(!stores.sessions.exists(7)?);
        service.next_track(7, 1, 30.0)?;
        assert_eq!(stores.sessions.get_value::<Vec<TrackId>>(7)?, Some(vec![9, 4, 3]));

        assert!(service.last_track(7, 1, 30.0)?);
        assert!(!stores.sessions.exists(7)?);

        // Unknown to the model: served by the fallback, nothing cached.
        service.next_track(8, 1, 30.0)?;
        assert!(!stores.sessions.exists(8)?);
        Ok(())
    }

    #[test]
    fn test_router_splits_traffic_between_arms() -> Result<()> {
        let (_temp_dir, db_path, paths, stores) = create_loaded_store()?;
        let mut config = single_arm_config(&db_path, paths, StrategyKind::TopPop);
        config.experiments = vec![ExperimentConfig {
            name: "TOP_VS_SVD".to_string(),
            split: Split::half_half(),
            arms: [
                (Treatment::C, StrategyKind::TopPop),
                (Treatment::T1, StrategyKind::CollaborativeSvd),
            ]
            .into_iter()
            .collect(),
        }];
        config.active_experiment = "TOP_VS_SVD".to_string();
        let service = RecommendationService::from_config(&config, stores)?;
        let experiment = Experiment::new("TOP_VS_SVD", Split::half_half())?;

        // Users without an SVD list fall back to random, so only check the
        // control arm and user 7.
        for user in 0..200 {
            let next = service.next_track(user, 1, 10.0)?;
            if experiment.assign(user) == Treatment::C {
                assert!(next.track == 9 || next.track == 4);
            }
            assert_eq!(service.assign(user), experiment.assign(user));
        }
        if experiment.assign(7) == Treatment::T1 {
            assert_eq!(service.next_track(7, 1, 10.0)?.track, 3);
        }
        Ok(())
    }

    #[test]
    fn test_track_lookup() -> Result<()> {
        let (_temp_dir, db_path, paths, stores) = create_loaded_store()?;
        let config = single_arm_config(&db_path, paths, StrategyKind::Random);
        let service = RecommendationService::from_config(&config, stores)?;

        assert_eq!(service.track(9)?.title, "Loner");
        assert!(service.track(10).is_err());
        Ok(())
    }

    #[test]
    fn test_service_serves_concurrently() -> Result<()> {
        let (_temp_dir, db_path, paths, stores) = create_loaded_store()?;
        let config = single_arm_config(&db_path, paths, StrategyKind::Embedding);
        let service = Arc::new(RecommendationService::from_config(&config, stores)?);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| service.next_track(7, 1, 30.0).map(|next| next.track))
                        .collect::<Result<Vec<TrackId>, _>>()
                })
            })
            .collect();

        for handle in handles {
            let tracks = handle.join().expect("worker panicked")?;
            assert!(tracks.iter().all(|t| [9, 4, 3].contains(t)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn encore(config: &Path, args: &[&str]) -> Result<std::process::Output> {
        Ok(Command::new(env!("CARGO_BIN_EXE_encore"))
            .arg("--config")
            .arg(config)
            .args(args)
            .env_remove("RUST_LOG")
            .output()?)
    }

    fn write_config(temp_dir: &TempDir, paths: CatalogPaths) -> Result<PathBuf> {
        let db_path = temp_dir.path().join("cli.db");
        let config = single_arm_config(&db_path, paths, StrategyKind::Contextual);
        let config_path = temp_dir.path().join("encore.json");
        fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(config_path)
    }

    #[test]
    fn test_load_then_next() -> Result<()> {
        let (temp_dir, paths) = create_catalog()?;
        let config_path = write_config(&temp_dir, paths)?;

        let load = encore(&config_path, &["load"])?;
        assert!(load.status.success(), "{}", String::from_utf8_lossy(&load.stderr));
        assert!(String::from_utf8_lossy(&load.stdout).contains("Uploaded 5 tracks"));

        let next = encore(&config_path, &["next", "--user", "7", "--track", "1", "--time", "30"])?;
        assert!(next.status.success(), "{}", String::from_utf8_lossy(&next.stderr));
        let response: serde_json::Value = serde_json::from_slice(&next.stdout)?;
        assert_eq!(response["user"], 7);
        assert!(response["track"] == 2 || response["track"] == 3);

        let last = encore(&config_path, &["last", "--user", "7", "--track", "2"])?;
        assert!(last.status.success());
        Ok(())
    }

    #[test]
    fn test_unknown_track_fails() -> Result<()> {
        let (temp_dir, paths) = create_catalog()?;
        let config_path = write_config(&temp_dir, paths)?;
        encore(&config_path, &["load"])?;

        let found = encore(&config_path, &["track", "9"])?;
        assert!(found.status.success());
        assert!(String::from_utf8_lossy(&found.stdout).contains("Loner"));

        let missing = encore(&config_path, &["track", "404"])?;
        assert!(!missing.status.success());
        assert!(String::from_utf8_lossy(&missing.stderr).contains("Track not found"));
        Ok(())
    }

    #[test]
    fn test_assign_is_stable() -> Result<()> {
        let (temp_dir, paths) = create_catalog()?;
        let config_path = write_config(&temp_dir, paths)?;

        let first = encore(&config_path, &["assign", "--user", "42"])?;
        let second = encore(&config_path, &["assign", "--user", "42"])?;

        assert!(first.status.success());
        assert_eq!(String::from_utf8_lossy(&first.stdout).trim(), "T1");
        assert_eq!(first.stdout, second.stdout);
        Ok(())
    }

    #[test]
    fn test_completion_generation() -> Result<()> {
        let output = Command::new(env!("CARGO_BIN_EXE_encore"))
            .args(["completion", "bash"])
            .output()?;

        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("encore"));
        Ok(())
    }
}
