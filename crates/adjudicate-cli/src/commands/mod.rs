//! CLI command implementations.

pub mod diff;
pub mod history;
pub mod merge;
pub mod status;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use adjudicate::{AnnotatorDocument, DocumentStorage, SchemaRegistry, CURATION_USER};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Load the schema registry from a JSON file.
pub fn load_schema(path: &Path) -> Result<SchemaRegistry, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)
        .map_err(|e| format!("cannot read schema file {}: {}", path.display(), e))?;
    let schema = serde_json::from_slice(&bytes)
        .map_err(|e| format!("invalid schema file {}: {}", path.display(), e))?;
    Ok(schema)
}

/// Load every stored document of one (project, document), keyed by user.
/// The curator's document is included under [`CURATION_USER`].
pub fn load_documents(
    storage: &DocumentStorage,
    project: &str,
    document: &str,
) -> Result<BTreeMap<String, AnnotatorDocument>, Box<dyn std::error::Error>> {
    let users = storage.list_users(project, document)?;
    if users.is_empty() {
        return Err(format!("no stored documents for {}/{}", project, document).into());
    }
    let mut documents = BTreeMap::new();
    for user in users {
        let stored = storage.read(project, document, &user)?;
        documents.insert(user, stored.document);
    }
    Ok(documents)
}

/// The annotator documents only, curator excluded.
pub fn annotator_documents(
    documents: &BTreeMap<String, AnnotatorDocument>,
) -> BTreeMap<String, AnnotatorDocument> {
    documents
        .iter()
        .filter(|(user, _)| user.as_str() != CURATION_USER)
        .map(|(user, doc)| (user.clone(), doc.clone()))
        .collect()
}
