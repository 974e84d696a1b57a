//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Encore using Clap derive
//! macros.
//!
//! ## Commands
//!
//! - `load`: Upload the configured catalog files into the store
//! - `next`: Recommend the next track for a user
//! - `last`: Signal the end of a user's listening session
//! - `track`: Show a catalog record
//! - `assign`: Show a user's treatment in an experiment
//! - `split`: Show the realized split of an experiment over many users
//!
//! ## Examples
//!
//! ```bash
//! encore --config encore.json load
//! encore next --user 7 --track 1 --time 183.5
//! encore split --experiment CONTEXTUAL --users 10000
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::track::{TrackId, UserId};

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "encore")]
#[command(about = "Encore: next-track decisions for a music-streaming bot")]
#[command(version)]
pub struct Args {
    /// Configuration file (JSON)
    ///
    /// Without one, the built-in defaults are used: the SQLite store in the
    /// platform data directory and a 50/50 random vs. contextual experiment.
    #[arg(
        short,
        long,
        global = true,
        env = "ENCORE_CONFIG",
        value_hint = clap::ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// The request fields shared by `next` and `last`.
#[derive(clap::Args, Debug, Clone, Copy, PartialEq)]
pub struct Listen {
    /// Bot user id
    #[arg(long)]
    pub user: UserId,

    /// Track the user just played
    #[arg(long)]
    pub track: TrackId,

    /// Seconds the user listened to it
    #[arg(long, default_value_t = 0.0)]
    pub time: f64,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload catalog files into the store
    ///
    /// Reads the track, diverse-track and per-user recommendation files named
    /// in the configuration and writes them into their namespaces. Artist
    /// track lists are derived from the track file.
    Load {
        /// Empty every namespace (sessions included) before uploading
        #[arg(long)]
        clear: bool,
    },

    /// Recommend the next track
    ///
    /// Routes the user through the active experiment and prints
    /// `{"user": .., "track": ..}`.
    Next(Listen),

    /// End a listening session
    ///
    /// Drops the user's cached embedding neighbourhood so the next request
    /// computes a fresh one.
    Last(Listen),

    /// Show the catalog record of a track
    Track {
        /// Track id
        id: TrackId,
    },

    /// Show the treatment a user is assigned to
    Assign {
        /// Experiment name (defaults to the active experiment)
        #[arg(long)]
        experiment: Option<String>,

        /// Bot user id
        #[arg(long)]
        user: UserId,
    },

    /// Show the realized split of an experiment
    ///
    /// Assigns users `0..N` and prints each treatment's share next to its
    /// configured target.
    Split {
        /// Experiment name (defaults to the active experiment)
        #[arg(long)]
        experiment: Option<String>,

        /// Number of users to assign
        #[arg(long, default_value_t = 10_000)]
        users: u32,
    },

    /// Generate shell completions
    ///
    /// Usage: encore completion bash > ~/.local/share/bash-completion/completions/encore
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
