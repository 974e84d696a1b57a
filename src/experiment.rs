//! # Experiment Router
//!
//! Deterministic A/B assignment of users to treatment groups.
//!
//! A user's treatment is a pure function of the experiment name and the user
//! id: both are hashed with SHA-256, the first eight bytes of the digest pick
//! a bucket, and the bucket falls into one of the weighted slots of the
//! experiment's [`Split`]. Nothing is stored, so assignment is recomputed on
//! every request and stays stable for as long as the experiment keeps its
//! name and split.
//!
//! The experiment name salts the hash, so assignments in different
//! experiments are independent of each other.
//!
//! ```
//! use encore::experiment::{Experiment, Split, Treatment};
//!
//! let experiment = Experiment::new("CONTEXTUAL", Split::half_half()).unwrap();
//! let treatment = experiment.assign(42);
//! assert!(treatment == Treatment::C || treatment == Treatment::T1);
//! assert_eq!(treatment, experiment.assign(42));
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::track::UserId;

/// Experiment group label. `C` is the control group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Treatment {
    C,
    T1,
    T2,
    T3,
    T4,
}

impl Treatment {
    pub const ALL: [Treatment; 5] = [
        Treatment::C,
        Treatment::T1,
        Treatment::T2,
        Treatment::T3,
        Treatment::T4,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Treatment::C => "C",
            Treatment::T1 => "T1",
            Treatment::T2 => "T2",
            Treatment::T3 => "T3",
            Treatment::T4 => "T4",
        }
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Treatment {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Treatment::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExperimentError::UnknownTreatment(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExperimentError {
    #[error("Experiment '{0}' has no treatments")]
    EmptySplit(String),

    #[error("Treatment {treatment} of experiment '{experiment}' has zero weight")]
    ZeroWeight {
        experiment: String,
        treatment: Treatment,
    },

    #[error("Treatment {treatment} appears twice in experiment '{experiment}'")]
    DuplicateTreatment {
        experiment: String,
        treatment: Treatment,
    },

    #[error("Unknown treatment: {0}")]
    UnknownTreatment(String),
}

/// One slot of a split: a treatment and its relative weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub treatment: Treatment,
    pub weight: u32,
}

/// Weighted treatments of an experiment, in bucket order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Split {
    allocations: Vec<Allocation>,
}

impl Split {
    #[must_use]
    pub fn new(allocations: Vec<Allocation>) -> Self {
        Self { allocations }
    }

    /// Control and one variant, 50/50.
    #[must_use]
    pub fn half_half() -> Self {
        Self::weighted(&[(Treatment::C, 1), (Treatment::T1, 1)])
    }

    #[must_use]
    pub fn weighted(weights: &[(Treatment, u32)]) -> Self {
        Self::new(
            weights
                .iter()
                .map(|&(treatment, weight)| Allocation { treatment, weight })
                .collect(),
        )
    }

    #[must_use]
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn treatments(&self) -> impl Iterator<Item = Treatment> + '_ {
        self.allocations.iter().map(|a| a.treatment)
    }

    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.allocations.iter().map(|a| u64::from(a.weight)).sum()
    }

    /// Configured share of `treatment`, in `[0, 1]`.
    #[must_use]
    pub fn target_ratio(&self, treatment: Treatment) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 0.0;
        }
        let weight: u64 = self
            .allocations
            .iter()
            .filter(|a| a.treatment == treatment)
            .map(|a| u64::from(a.weight))
            .sum();
        weight as f64 / total as f64
    }

    fn validate(&self, experiment: &str) -> Result<(), ExperimentError> {
        if self.allocations.is_empty() {
            return Err(ExperimentError::EmptySplit(experiment.to_string()));
        }
        for (i, allocation) in self.allocations.iter().enumerate() {
            if allocation.weight == 0 {
                return Err(ExperimentError::ZeroWeight {
                    experiment: experiment.to_string(),
                    treatment: allocation.treatment,
                });
            }
            if self.allocations[..i]
                .iter()
                .any(|a| a.treatment == allocation.treatment)
            {
                return Err(ExperimentError::DuplicateTreatment {
                    experiment: experiment.to_string(),
                    treatment: allocation.treatment,
                });
            }
        }
        Ok(())
    }

    /// Treatment whose cumulative slot contains `bucket`.
    fn slot(&self, bucket: u64) -> Treatment {
        let mut cumulative = 0;
        for allocation in &self.allocations {
            cumulative += u64::from(allocation.weight);
            if bucket < cumulative {
                return allocation.treatment;
            }
        }
        // Unreachable for a validated split; the last slot absorbs the rest.
        self.allocations
            .last()
            .map_or(Treatment::C, |a| a.treatment)
    }
}

/// A named experiment with a validated split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    name: String,
    split: Split,
}

impl Experiment {
    pub fn new(name: impl Into<String>, split: Split) -> Result<Self, ExperimentError> {
        let name = name.into();
        split.validate(&name)?;
        Ok(Self { name, split })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn split(&self) -> &Split {
        &self.split
    }

    /// Treatment of `user` in this experiment. Pure and stable.
    #[must_use]
    pub fn assign(&self, user: UserId) -> Treatment {
        let bucket = bucket_hash(&self.name, user) % self.split.total_weight();
        self.split.slot(bucket)
    }

    /// Share of each treatment over users `0..users`.
    #[must_use]
    pub fn realized_split(&self, users: u32) -> BTreeMap<Treatment, f64> {
        let mut counts: BTreeMap<Treatment, u32> =
            self.split.treatments().map(|t| (t, 0)).collect();
        for user in 0..users {
            *counts.entry(self.assign(UserId::from(user))).or_default() += 1;
        }

        counts
            .into_iter()
            .map(|(treatment, count)| {
                let ratio = if users == 0 {
                    0.0
                } else {
                    f64::from(count) / f64::from(users)
                };
                (treatment, ratio)
            })
            .collect()
    }
}

/// First eight bytes of SHA-256(`experiment` `:` `user`), big-endian.
fn bucket_hash(experiment: &str, user: UserId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment.as_bytes());
    hasher.update(b":");
    hasher.update(user.to_be_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
