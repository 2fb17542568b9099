//! History command - list snapshots of one user's document.

use std::path::PathBuf;

use colored::Colorize;

use adjudicate::DocumentStorage;

use super::CommandResult;

pub fn run(root: PathBuf, project: &str, document: &str, user: &str) -> CommandResult {
    let storage = DocumentStorage::new(root);
    let snapshots = storage.list_snapshots(project, document, user)?;

    println!(
        "{} {}/{} user {}",
        "History for".cyan().bold(),
        project,
        document,
        user.white().bold()
    );
    if snapshots.is_empty() {
        println!("  no snapshots");
        return Ok(());
    }
    for (taken, path) in &snapshots {
        println!("  {}  {}", taken.to_rfc3339().green(), path.display());
    }
    Ok(())
}
