//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Adjudicate: annotation adjudication for multi-annotator projects
#[derive(Parser)]
#[command(name = "adjudicate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show where annotators agree, disagree or are incomplete
    Diff {
        /// Storage root directory
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Path to the schema file (JSON)
        #[arg(long, value_name = "FILE")]
        schema: PathBuf,

        /// Project name
        project: String,

        /// Document identifier
        document: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-merge annotator documents into the curated document
    Merge {
        /// Storage root directory
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Path to the schema file (JSON)
        #[arg(long, value_name = "FILE")]
        schema: PathBuf,

        /// Project name
        project: String,

        /// Document identifier
        document: String,

        /// Merge positions not all annotators have marked, as long as
        /// the present ones agree
        #[arg(long)]
        merge_incomplete: bool,

        /// Print the merge result without persisting it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show per-user file metadata for one document
    Status {
        /// Storage root directory
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Project name
        project: String,

        /// Document identifier
        document: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List history snapshots of one user's document
    History {
        /// Storage root directory
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Project name
        project: String,

        /// Document identifier
        document: String,

        /// User name
        user: String,
    },
}
