//! # Configuration Module
//!
//! Engine configuration: where the store lives, where the catalog files are,
//! and which experiments route `next` requests to which strategies.
//!
//! Configuration is a JSON file passed with `--config` (or `ENCORE_CONFIG`).
//! Every field has a default, so an empty object `{}` is a valid file and no
//! file at all means "all defaults".
//!
//! ## Data Storage
//!
//! Without an explicit `db_path` the SQLite store is kept in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/encore/encore.db`
//! - macOS: `~/Library/Application Support/encore/encore.db`
//! - Windows: `%APPDATA%\encore\encore.db`
//!
//! ## Example
//!
//! ```json
//! {
//!   "tracks": "data/tracks.json",
//!   "top_tracks": "data/top_tracks.json",
//!   "experiments": [
//!     {
//!       "name": "STICKY",
//!       "split": [{"treatment": "C", "weight": 1}, {"treatment": "T1", "weight": 1}],
//!       "arms": {"C": "random", "T1": "sticky_artist"}
//!     }
//!   ],
//!   "active_experiment": "STICKY"
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::embedding::DEFAULT_TOP_K;
use crate::experiment::{Experiment, Split, Treatment};

/// Name of the experiment shipped in the default configuration.
pub const DEFAULT_EXPERIMENT: &str = "CONTEXTUAL";

/// Returns the platform-appropriate database file path.
///
/// Creates the `encore` subdirectory of the system data directory if it
/// doesn't exist yet.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The encore subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use encore::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please set db_path in the configuration."
        )
    })?;

    let encore_dir = data_dir.join("encore");
    fs::create_dir_all(&encore_dir).with_context(|| {
        format!(
            "Failed to create data directory at {}. Please check file permissions.",
            encore_dir.display()
        )
    })?;

    Ok(encore_dir.join("encore.db"))
}

/// A recommender an experiment arm can be wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Any track in the catalog.
    Random,
    /// Candidates of the previous track.
    Contextual,
    /// Candidates of the previous track, diversity-reranked catalog.
    DiverseContextual,
    /// Collaborative-filtering list of the user.
    Collaborative,
    /// SVD-derived list of the user.
    CollaborativeSvd,
    /// Same artist as the previous track.
    StickyArtist,
    /// Globally popular tracks.
    TopPop,
    /// Nearest neighbours in embedding space, cached per session.
    Embedding,
}

/// Catalog files uploaded by `encore load` and read at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogPaths {
    /// JSON lines of tracks with candidate lists.
    pub tracks: Option<PathBuf>,
    /// Same format, diversity-reranked candidates.
    pub tracks_with_diverse_recs: Option<PathBuf>,
    /// JSON array of track ids.
    pub top_tracks: Option<PathBuf>,
    /// JSON lines of `{"user", "tracks"}`.
    pub recommendations: Option<PathBuf>,
    pub recommendations_svd: Option<PathBuf>,
    /// JSON lines of `{"track", "embedding"}`.
    pub embeddings: Option<PathBuf>,
    /// Exported context model tables.
    pub context_model: Option<PathBuf>,
}

/// One experiment: its split and the strategy behind every treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub split: Split,
    pub arms: BTreeMap<Treatment, StrategyKind>,
}

impl ExperimentConfig {
    /// Half control on [`StrategyKind::Random`], half treatment on `variant`.
    #[must_use]
    pub fn half_half(name: impl Into<String>, variant: StrategyKind) -> Self {
        Self {
            name: name.into(),
            split: Split::half_half(),
            arms: BTreeMap::from([
                (Treatment::C, StrategyKind::Random),
                (Treatment::T1, variant),
            ]),
        }
    }

    /// The router for this experiment.
    pub fn experiment(&self) -> Result<Experiment> {
        Experiment::new(self.name.clone(), self.split.clone())
            .with_context(|| format!("Invalid split for experiment '{}'", self.name))
    }

    fn validate(&self) -> Result<()> {
        self.experiment()?;
        for treatment in self.split.treatments() {
            if !self.arms.contains_key(&treatment) {
                bail!(
                    "Experiment '{}' splits users into {treatment} but has no arm for it",
                    self.name
                );
            }
        }
        Ok(())
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database holding every namespace.
    pub db_path: PathBuf,
    #[serde(flatten)]
    pub catalog: CatalogPaths,
    /// Neighbourhood size of the embedding strategy.
    pub top_k: usize,
    pub experiments: Vec<ExperimentConfig>,
    /// Experiment that routes `next` requests.
    pub active_experiment: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: get_db_path().unwrap_or_else(|_| PathBuf::from("encore.db")),
            catalog: CatalogPaths::default(),
            top_k: DEFAULT_TOP_K,
            experiments: vec![ExperimentConfig::half_half(
                DEFAULT_EXPERIMENT,
                StrategyKind::Contextual,
            )],
            active_experiment: DEFAULT_EXPERIMENT.to_string(),
        }
    }
}

impl EngineConfig {
    /// Read and validate `path`, or return the defaults when there is none.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Check the experiment table and the files the wired strategies need.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }

        for (i, experiment) in self.experiments.iter().enumerate() {
            experiment.validate()?;
            if self.experiments[..i].iter().any(|e| e.name == experiment.name) {
                bail!("Experiment '{}' is defined twice", experiment.name);
            }
        }

        let active = self.active()?;
        if active.arms.values().any(|&kind| kind == StrategyKind::Embedding)
            && (self.catalog.embeddings.is_none() || self.catalog.context_model.is_none())
        {
            bail!(
                "Experiment '{}' uses the embedding strategy, \
                 which needs both 'embeddings' and 'context_model'",
                active.name
            );
        }

        Ok(())
    }

    /// Configuration of the experiment that routes `next` requests.
    pub fn active(&self) -> Result<&ExperimentConfig> {
        self.experiment(&self.active_experiment)
    }

    /// Configuration of the experiment called `name`.
    pub fn experiment(&self, name: &str) -> Result<&ExperimentConfig> {
        self.experiments
            .iter()
            .find(|e| e.name == name)
            .with_context(|| format!("No experiment named '{name}' is configured"))
    }

    #[must_use]
    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = db_path;
        self
    }
}
