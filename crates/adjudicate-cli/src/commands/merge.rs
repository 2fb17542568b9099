//! Merge command - re-merge annotator documents into the curated document.

use std::path::PathBuf;

use colored::Colorize;

use adjudicate::{
    compute_diff, AnnotatorDocument, ComparisonMode, DocumentStorage, MergeConfig, MergeEngine,
    CURATION_USER,
};

use super::{annotator_documents, load_documents, load_schema, CommandResult};

pub fn run(
    root: PathBuf,
    schema: PathBuf,
    project: &str,
    document: &str,
    merge_incomplete: bool,
    dry_run: bool,
) -> CommandResult {
    let registry = load_schema(&schema)?;
    let storage = DocumentStorage::new(root);
    let all = load_documents(&storage, project, document)?;
    let documents = annotator_documents(&all);
    if documents.is_empty() {
        return Err(format!("no annotator documents for {}/{}", project, document).into());
    }

    // Reading the curator's document (when it exists) also arms the
    // concurrent-modification check for the write below.
    let mut curated = match all.get(CURATION_USER) {
        Some(existing) => existing.clone(),
        None => {
            let template = documents.values().next().expect("non-empty");
            let mut fresh = AnnotatorDocument::new(
                project,
                document,
                CURATION_USER,
                template.text.clone(),
            );
            if let Some(ref language) = template.language {
                fresh = fresh.with_language(language.clone());
            }
            fresh
        }
    };

    let diff = compute_diff(&registry, ComparisonMode::RoleAsLabel, &documents, None)?;
    let engine = MergeEngine::with_config(
        &registry,
        MergeConfig::new().with_merge_incomplete(merge_incomplete),
    );
    let messages = engine.remerge(&diff, &documents, &mut curated);

    println!(
        "{} {} annotations from {} positions",
        "Merged".green().bold(),
        curated.len(),
        diff.len()
    );
    if !messages.is_empty() {
        println!();
        println!("{} ({})", "Skipped:".yellow().bold(), messages.len());
        for message in &messages {
            println!("  {}", message.to_string().yellow());
        }
    }

    if dry_run {
        println!();
        println!("{}", "Dry run, nothing persisted.".cyan());
        return Ok(());
    }

    storage.write(&curated, &registry)?;
    println!(
        "{} {}",
        "Curated document written to".cyan(),
        storage
            .document_path(project, document, CURATION_USER)
            .display()
    );
    Ok(())
}
