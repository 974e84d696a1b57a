use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use std::path::Path;

use encore::catalog;
use encore::cli::{self, Command, Listen};
use encore::completion;
use encore::config::EngineConfig;
use encore::service::RecommendationService;
use encore::store::{Namespace, SqliteDatabase, Stores};

/// Main entry point for the Encore application.
///
/// Initializes logging, parses command-line arguments, and routes commands.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug encore next ...` - Enable debug logging
/// - `RUST_LOG=encore::decisions=info encore next ...` - Decision events only
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    if let Command::Completion { shell } = args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let config = EngineConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Load { clear } => {
            let stores = open_stores(&config.db_path)?;
            if clear {
                for namespace in Namespace::ALL {
                    stores
                        .namespace(namespace)
                        .clear()
                        .with_context(|| format!("Failed to clear {}", namespace.table_name()))?;
                }
                info!("Cleared every namespace");
            }
            let summary = catalog::upload(&config.catalog, &stores)?;
            println!(
                "Uploaded {} tracks, {} diverse tracks, {} artists, {} + {} user lists",
                summary.tracks,
                summary.tracks_with_diverse_recs,
                summary.artists,
                summary.recommendations,
                summary.recommendations_svd
            );
        }
        Command::Next(Listen { user, track, time }) => {
            let stores = open_stores(&config.db_path)?;
            let service = RecommendationService::from_config(&config, stores)?;
            let next = service.next_track(user, track, time)?;
            println!("{}", serde_json::to_string(&next)?);
        }
        Command::Last(Listen { user, track, time }) => {
            let stores = open_stores(&config.db_path)?;
            let service = RecommendationService::from_config(&config, stores)?;
            let was_warm = service.last_track(user, track, time)?;
            debug!("Session of user {user} was warm: {was_warm}");
            println!("{}", serde_json::json!({ "user": user }));
        }
        Command::Track { id } => {
            let stores = open_stores(&config.db_path)?;
            let service = RecommendationService::from_config(&config, stores)?;
            let track = service.track(id)?;
            println!("{}", serde_json::to_string_pretty(&track)?);
        }
        Command::Assign { experiment, user } => {
            let name = experiment.as_deref().unwrap_or(&config.active_experiment);
            let experiment = config.experiment(name)?.experiment()?;
            println!("{}", experiment.assign(user));
        }
        Command::Split { experiment, users } => {
            let name = experiment.as_deref().unwrap_or(&config.active_experiment);
            let experiment_config = config.experiment(name)?;
            let experiment = experiment_config.experiment()?;

            println!("Experiment {} over {users} users", experiment.name());
            for (treatment, ratio) in experiment.realized_split(users) {
                let target = experiment.split().target_ratio(treatment);
                let arm = experiment_config
                    .arms
                    .get(&treatment)
                    .map_or_else(|| "-".to_string(), |kind| format!("{kind:?}"));
                println!(
                    "  {treatment:<3} {arm:<18} {:>6.2}%  (target {:.2}%)",
                    ratio * 100.0,
                    target * 100.0
                );
            }
        }
        Command::Completion { .. } => {}
    }

    Ok(())
}

fn open_stores(db_path: &Path) -> Result<Stores> {
    debug!("Opening store at {}", db_path.display());
    let database = SqliteDatabase::open(db_path)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;
    Ok(Stores::sqlite(&database)?)
}
