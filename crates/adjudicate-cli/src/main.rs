//! Adjudicate CLI - annotation adjudication for multi-annotator projects.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Diff {
            root,
            schema,
            project,
            document,
            json,
        } => commands::diff::run(root, schema, &project, &document, json),

        Commands::Merge {
            root,
            schema,
            project,
            document,
            merge_incomplete,
            dry_run,
        } => commands::merge::run(root, schema, &project, &document, merge_incomplete, dry_run),

        Commands::Status {
            root,
            project,
            document,
            json,
        } => commands::status::run(root, &project, &document, json),

        Commands::History {
            root,
            project,
            document,
            user,
        } => commands::history::run(root, &project, &document, &user),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
