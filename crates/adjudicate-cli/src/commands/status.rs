//! Status command - per-user file metadata for one document.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use colored::Colorize;

use adjudicate::{DocumentStorage, CURATION_USER};

use super::CommandResult;

pub fn run(root: PathBuf, project: &str, document: &str, json_output: bool) -> CommandResult {
    let storage = DocumentStorage::new(root);
    let users = storage.list_users(project, document)?;
    if users.is_empty() {
        return Err(format!("no stored documents for {}/{}", project, document).into());
    }

    if json_output {
        let mut entries = Vec::new();
        for user in &users {
            let meta = storage.metadata(project, document, user)?;
            entries.push(serde_json::json!({
                "user": user,
                "size": meta.size,
                "modified": format_token(meta.modified_ms),
                "sha256": meta.sha256,
            }));
        }
        let report = serde_json::json!({
            "project": project,
            "document": document,
            "files": entries,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {}/{}",
        "Status for".cyan().bold(),
        project,
        document
    );
    println!();
    for user in &users {
        let meta = storage.metadata(project, document, user)?;
        let label = if user == CURATION_USER {
            user.magenta().bold()
        } else {
            user.white().bold()
        };
        println!(
            "  {}  {} bytes  modified {}  sha256 {}",
            label,
            meta.size,
            format_token(meta.modified_ms),
            &meta.sha256[..12]
        );
    }
    Ok(())
}

/// Render a millisecond version token as an RFC 3339 timestamp.
fn format_token(modified_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(modified_ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| modified_ms.to_string())
}
