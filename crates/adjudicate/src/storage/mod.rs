//! Durable storage for annotation documents.

mod driver;
mod history;
mod observer;

pub use driver::{
    CasMetadata, DocumentStorage, StorageOptions, StoredDocument, FORMAT_VERSION,
};
pub use history::snapshot_name;
pub use observer::{AccessLog, AccessRecord, StorageObserver};
