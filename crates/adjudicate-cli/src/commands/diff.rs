//! Diff command - show the agreement partition of one document.

use std::path::PathBuf;

use colored::Colorize;

use adjudicate::{compute_diff, ComparisonMode, DocumentStorage};

use super::{annotator_documents, load_documents, load_schema, CommandResult};

pub fn run(
    root: PathBuf,
    schema: PathBuf,
    project: &str,
    document: &str,
    json_output: bool,
) -> CommandResult {
    let registry = load_schema(&schema)?;
    let storage = DocumentStorage::new(root);
    let documents = annotator_documents(&load_documents(&storage, project, document)?);

    let diff = compute_diff(&registry, ComparisonMode::RoleAsLabel, &documents, None)?;

    if json_output {
        let report = serde_json::json!({
            "project": project,
            "document": document,
            "annotators": diff.annotators,
            "positions": diff.len(),
            "agreeing": diff.agreeing_positions().map(|p| p.to_string()).collect::<Vec<_>>(),
            "differing": diff.differing_positions().map(|p| p.to_string()).collect::<Vec<_>>(),
            "incomplete": diff.incomplete_positions().map(|p| p.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {}/{} ({} annotators, {} positions)",
        "Diff for".cyan().bold(),
        project,
        document,
        diff.annotators.len(),
        diff.len()
    );
    println!();

    print_partition("Agreeing", diff.agreeing_positions().count(), "green");
    for position in diff.agreeing_positions() {
        println!("  {}", position.to_string().green());
    }
    print_partition("Differing", diff.differing_positions().count(), "red");
    for position in diff.differing_positions() {
        println!("  {}", position.to_string().red());
    }
    print_partition("Incomplete", diff.incomplete_positions().count(), "yellow");
    for position in diff.incomplete_positions() {
        println!("  {}", position.to_string().yellow());
    }

    Ok(())
}

fn print_partition(name: &str, count: usize, color: &str) {
    println!(
        "{} ({})",
        format!("{}:", name).color(color).bold(),
        count
    );
}
