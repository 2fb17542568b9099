//! Injectable diagnostics for storage accesses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Hook invoked on every successful storage read and write.
///
/// A debugging aid, not a correctness mechanism: the driver works the same
/// with no observer installed, which is the default.
pub trait StorageObserver: Send + Sync {
    fn on_read(&self, project: &str, document_id: &str, user: &str, path: &Path);
    fn on_write(&self, project: &str, document_id: &str, user: &str, path: &Path);
}

/// What happened last for one (project, document, user) file.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub path: PathBuf,
    pub last_read: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
}

/// An in-memory [`StorageObserver`] keeping the last read/write per file.
#[derive(Debug, Default)]
pub struct AccessLog {
    records: Mutex<HashMap<(String, String, String), AccessRecord>>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last recorded accesses for one file, if any.
    pub fn record(&self, project: &str, document_id: &str, user: &str) -> Option<AccessRecord> {
        self.records
            .lock()
            .ok()?
            .get(&(project.to_string(), document_id.to_string(), user.to_string()))
            .cloned()
    }

    fn entry(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
        path: &Path,
        update: impl FnOnce(&mut AccessRecord),
    ) {
        if let Ok(mut records) = self.records.lock() {
            let record = records
                .entry((
                    project.to_string(),
                    document_id.to_string(),
                    user.to_string(),
                ))
                .or_insert_with(|| AccessRecord {
                    path: path.to_path_buf(),
                    last_read: None,
                    last_write: None,
                });
            update(record);
        }
    }
}

// Callers keep a handle to the observer after handing it to the driver.
impl<T: StorageObserver> StorageObserver for std::sync::Arc<T> {
    fn on_read(&self, project: &str, document_id: &str, user: &str, path: &Path) {
        (**self).on_read(project, document_id, user, path);
    }

    fn on_write(&self, project: &str, document_id: &str, user: &str, path: &Path) {
        (**self).on_write(project, document_id, user, path);
    }
}

impl StorageObserver for AccessLog {
    fn on_read(&self, project: &str, document_id: &str, user: &str, path: &Path) {
        self.entry(project, document_id, user, path, |r| {
            r.last_read = Some(Utc::now())
        });
    }

    fn on_write(&self, project: &str, document_id: &str, user: &str, path: &Path) {
        self.entry(project, document_id, user, path, |r| {
            r.last_write = Some(Utc::now())
        });
    }
}
