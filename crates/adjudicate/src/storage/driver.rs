//! Durable, concurrency-checked document storage.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::document::AnnotatorDocument;
use crate::error::{AdjudicateError, Result};
use crate::schema::SchemaRegistry;

use super::history;
use super::observer::StorageObserver;

/// Version tag of the stored file envelope.
pub const FORMAT_VERSION: u32 = 1;

/// Gzip magic bytes; compressed files are recognized on read regardless of
/// the current compression setting.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Everything needed to reconstruct a stored document without external
/// schema lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub schema: SchemaRegistry,
    pub document: AnnotatorDocument,
}

/// Size, version token and content digest of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasMetadata {
    pub size: u64,
    pub modified_ms: u64,
    pub sha256: String,
}

/// Configuration knobs of the storage driver.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Gzip-compress written files.
    pub compress: bool,
    /// Deserialize freshly written bytes into a throwaway document before
    /// trusting them.
    pub paranoid_checks: bool,
    /// Minimum time between history snapshots; zero disables history.
    pub backup_interval: Duration,
    /// Maximum number of snapshots retained per user.
    pub backup_keep_count: usize,
    /// Snapshots older than this are pruned; zero means unlimited age.
    pub backup_max_age: Duration,
    /// Version tokens within this distance count as unmodified.
    pub timestamp_tolerance: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            compress: false,
            paranoid_checks: false,
            backup_interval: Duration::ZERO,
            backup_keep_count: 2,
            backup_max_age: Duration::ZERO,
            timestamp_tolerance: Duration::ZERO,
        }
    }
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, yes: bool) -> Self {
        self.compress = yes;
        self
    }

    pub fn with_paranoid_checks(mut self, yes: bool) -> Self {
        self.paranoid_checks = yes;
        self
    }

    pub fn with_backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    pub fn with_backup_keep_count(mut self, count: usize) -> Self {
        self.backup_keep_count = count;
        self
    }

    pub fn with_backup_max_age(mut self, age: Duration) -> Self {
        self.backup_max_age = age;
        self
    }

    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance = tolerance;
        self
    }
}

/// Per-(project, document, user) in-memory state of one driver instance.
#[derive(Debug, Clone, Default)]
struct Session {
    /// Version token observed at the last read or write through this driver.
    last_seen_ms: Option<u64>,
    /// When this driver last wrote the file successfully.
    last_write: Option<DateTime<Utc>>,
}

type StorageKey = (String, String, String);

/// File-backed storage for annotation documents.
///
/// One file exists per (project, document, user). Writes never overwrite in
/// place: the current file is renamed to an `.old` sibling first and
/// restored on any failure, so a failed write leaves the previous content
/// intact. Concurrent writers are not serialized; lost updates are detected
/// after the fact by comparing file version tokens.
///
/// Version tokens are tracked per driver instance: one `DocumentStorage` is
/// one logical holder, and its own reads and writes refresh its tokens.
/// Writers that must be mutually suspicious each open their own instance
/// over the shared root; funnelling them through a single instance makes
/// them count as one holder and disables the detection between them.
pub struct DocumentStorage {
    root: PathBuf,
    options: StorageOptions,
    sessions: Mutex<HashMap<StorageKey, Session>>,
    observer: Option<Box<dyn StorageObserver>>,
}

impl DocumentStorage {
    /// Open a storage root with default options.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StorageOptions::default())
    }

    /// Open a storage root with explicit options.
    pub fn with_options(root: impl Into<PathBuf>, options: StorageOptions) -> Self {
        Self {
            root: root.into(),
            options,
            sessions: Mutex::new(HashMap::new()),
            observer: None,
        }
    }

    /// Install a diagnostics observer.
    pub fn with_observer(mut self, observer: impl StorageObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Path of the current file for one (project, document, user).
    pub fn document_path(&self, project: &str, document_id: &str, user: &str) -> PathBuf {
        self.root
            .join(project)
            .join(document_id)
            .join(format!("{}.ann", user))
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Persist a document together with its schema snapshot.
    ///
    /// Fails with [`AdjudicateError::ConcurrentModification`] if the on-disk
    /// file changed since this driver last read or wrote it.
    pub fn write(&self, document: &AnnotatorDocument, schema: &SchemaRegistry) -> Result<()> {
        let stored = StoredDocument {
            format_version: FORMAT_VERSION,
            saved_at: Utc::now(),
            schema: schema.clone(),
            document: document.clone(),
        };
        let bytes = self.encode(&stored)?;
        self.write_raw(
            &document.project,
            &document.document_id,
            &document.user,
            &bytes,
        )
    }

    /// Raw byte passthrough for backup/migration.
    pub fn import(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
        bytes: &[u8],
    ) -> Result<()> {
        self.write_raw(project, document_id, user, bytes)
    }

    /// The stored bytes of one document, unchanged.
    pub fn export(&self, project: &str, document_id: &str, user: &str) -> Result<Vec<u8>> {
        let path = self.document_path(project, document_id, user);
        if !path.exists() {
            return Err(AdjudicateError::NotFound { path });
        }
        fs::read(&path).map_err(|e| AdjudicateError::io(&path, e))
    }

    fn write_raw(&self, project: &str, document_id: &str, user: &str, bytes: &[u8]) -> Result<()> {
        let path = self.document_path(project, document_id, user);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AdjudicateError::io(parent, e))?;
        }
        let backup = path.with_extension("ann.old");

        let had_current = path.exists();
        if had_current {
            self.ensure_unmodified(project, document_id, user, &path)?;
            fs::rename(&path, &backup).map_err(|e| AdjudicateError::io(&backup, e))?;
        }

        let written = self.checked_write(&path, bytes);
        match written {
            Ok(()) => {
                if had_current {
                    if let Err(e) = fs::remove_file(&backup) {
                        warn!(backup = %backup.display(), error = %e, "stale backup not removed");
                    }
                }
            }
            Err(e) => {
                // Roll back so a failed write never leaves the document
                // missing or half-written.
                if had_current {
                    let _ = fs::remove_file(&path);
                    if let Err(restore) = fs::rename(&backup, &path) {
                        warn!(
                            path = %path.display(),
                            error = %restore,
                            "backup could not be restored after failed write"
                        );
                    }
                }
                return Err(e);
            }
        }

        let token = mtime_ms(&path)?;
        self.with_session(project, document_id, user, |session| {
            session.last_seen_ms = Some(token);
            session.last_write = Some(Utc::now());
        });
        if let Some(ref observer) = self.observer {
            observer.on_write(project, document_id, user, &path);
        }
        debug!(path = %path.display(), size = bytes.len(), "document written");

        self.maybe_snapshot(user, &path);
        Ok(())
    }

    /// Self-check (when configured) and write the final bytes.
    fn checked_write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if self.options.paranoid_checks {
            if let Err(e) = self.decode(bytes, path) {
                // Keep the rejected bytes around for offline diagnosis.
                let dump = path.with_extension("ann.dump");
                if let Err(dump_err) = fs::write(&dump, bytes) {
                    warn!(dump = %dump.display(), error = %dump_err, "failed to preserve rejected bytes");
                }
                return Err(AdjudicateError::Corrupt {
                    path: path.to_path_buf(),
                    message: format!("serialization self-check failed: {}", e),
                });
            }
        }
        fs::write(path, bytes).map_err(|e| AdjudicateError::io(path, e))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Load a stored document, restoring the version token used by later
    /// concurrency verification.
    pub fn read(&self, project: &str, document_id: &str, user: &str) -> Result<StoredDocument> {
        let path = self.document_path(project, document_id, user);
        if !path.exists() {
            return Err(AdjudicateError::NotFound { path });
        }
        let bytes = fs::read(&path).map_err(|e| AdjudicateError::io(&path, e))?;
        let stored = self.decode(&bytes, &path)?;

        let token = mtime_ms(&path)?;
        self.with_session(project, document_id, user, |session| {
            session.last_seen_ms = Some(token);
        });
        if let Some(ref observer) = self.observer {
            observer.on_read(project, document_id, user, &path);
        }
        Ok(stored)
    }

    /// Size, version token and digest of the stored file.
    pub fn metadata(&self, project: &str, document_id: &str, user: &str) -> Result<CasMetadata> {
        let path = self.document_path(project, document_id, user);
        if !path.exists() {
            return Err(AdjudicateError::NotFound { path });
        }
        let bytes = fs::read(&path).map_err(|e| AdjudicateError::io(&path, e))?;
        let digest = Sha256::digest(&bytes);
        Ok(CasMetadata {
            size: bytes.len() as u64,
            modified_ms: mtime_ms(&path)?,
            sha256: format!("{:x}", digest),
        })
    }

    /// Users holding a stored document for (project, document).
    pub fn list_users(&self, project: &str, document_id: &str) -> Result<Vec<String>> {
        let dir = self.root.join(project).join(document_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| AdjudicateError::io(&dir, e))?;
        let mut users: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                name.strip_suffix(".ann").map(str::to_string)
            })
            .collect();
        users.sort();
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Concurrency verification
    // ------------------------------------------------------------------

    /// Compare a previously observed version token against the file's
    /// current one; mismatch beyond the tolerance fails.
    pub fn verify_timestamp(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
        expected_ms: u64,
    ) -> Result<u64> {
        let path = self.document_path(project, document_id, user);
        if !path.exists() {
            return Err(AdjudicateError::NotFound { path });
        }
        let actual = mtime_ms(&path)?;
        if actual.abs_diff(expected_ms) > self.options.timestamp_tolerance.as_millis() as u64 {
            return Err(self.concurrent_modification(project, document_id, user, expected_ms, actual));
        }
        Ok(actual)
    }

    /// The file's current version token.
    pub fn current_token(&self, project: &str, document_id: &str, user: &str) -> Result<u64> {
        let path = self.document_path(project, document_id, user);
        if !path.exists() {
            return Err(AdjudicateError::NotFound { path });
        }
        mtime_ms(&path)
    }

    /// Verify the file did not change since this driver last saw it.
    fn ensure_unmodified(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
        path: &Path,
    ) -> Result<()> {
        let expected = self
            .sessions
            .lock()
            .ok()
            .and_then(|s| {
                s.get(&key(project, document_id, user))
                    .and_then(|session| session.last_seen_ms)
            });
        // First contact with an existing file: nothing to compare against.
        let Some(expected) = expected else {
            return Ok(());
        };
        let actual = mtime_ms(path)?;
        if actual.abs_diff(expected) > self.options.timestamp_tolerance.as_millis() as u64 {
            return Err(self.concurrent_modification(project, document_id, user, expected, actual));
        }
        Ok(())
    }

    fn concurrent_modification(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
        expected: u64,
        actual: u64,
    ) -> AdjudicateError {
        let last_write = self.sessions.lock().ok().and_then(|s| {
            s.get(&key(project, document_id, user))
                .and_then(|session| session.last_write)
        });
        let detail = match last_write {
            Some(at) => format!(
                "; last successful write through this driver at {}",
                at.to_rfc3339()
            ),
            None => String::new(),
        };
        AdjudicateError::ConcurrentModification {
            document: format!("{}/{}", project, document_id),
            user: user.to_string(),
            expected,
            actual,
            detail,
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// All history snapshots for one user's document, oldest first.
    pub fn list_snapshots(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
    ) -> Result<Vec<(DateTime<Utc>, PathBuf)>> {
        let dir = self.root.join(project).join(document_id);
        history::list_snapshots(&dir, user)
    }

    /// Take a dated snapshot if the backup interval has elapsed, then prune.
    /// Best-effort: failures are logged, never propagated to the write.
    fn maybe_snapshot(&self, user: &str, path: &Path) {
        if self.options.backup_interval.is_zero() {
            return;
        }
        let dir = path.parent().unwrap_or(Path::new("."));
        let now = Utc::now();

        let due = match history::list_snapshots(dir, user) {
            Ok(snapshots) => match snapshots.last() {
                Some((latest, _)) => {
                    let elapsed = (now - *latest).to_std().unwrap_or(Duration::ZERO);
                    elapsed >= self.options.backup_interval
                }
                None => true,
            },
            Err(e) => {
                warn!(error = %e, "history listing failed, skipping snapshot");
                false
            }
        };
        if !due {
            return;
        }

        if let Err(e) = history::take_snapshot(path, user, now) {
            warn!(error = %e, "history snapshot failed");
            return;
        }
        if let Err(e) = history::prune_snapshots(
            dir,
            user,
            self.options.backup_keep_count,
            self.options.backup_max_age,
            now,
        ) {
            warn!(error = %e, "history pruning failed");
        }
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    fn encode(&self, stored: &StoredDocument) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(stored)?;
        if !self.options.compress {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .and_then(|_| encoder.finish())
            .map_err(|e| AdjudicateError::io(&self.root, e))
    }

    fn decode(&self, bytes: &[u8], path: &Path) -> Result<StoredDocument> {
        let corrupt = |message: String| AdjudicateError::Corrupt {
            path: path.to_path_buf(),
            message,
        };

        let json: Vec<u8> = if bytes.starts_with(&GZIP_MAGIC) {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| corrupt(format!("gzip decoding failed: {}", e)))?;
            out
        } else {
            bytes.to_vec()
        };

        let stored: StoredDocument = serde_json::from_slice(&json)
            .map_err(|e| corrupt(format!("deserialization failed: {}", e)))?;
        if stored.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                stored.format_version
            )));
        }
        Ok(stored)
    }

    fn with_session(
        &self,
        project: &str,
        document_id: &str,
        user: &str,
        update: impl FnOnce(&mut Session),
    ) {
        if let Ok(mut sessions) = self.sessions.lock() {
            update(sessions.entry(key(project, document_id, user)).or_default());
        }
    }
}

fn key(project: &str, document_id: &str, user: &str) -> StorageKey {
    (
        project.to_string(),
        document_id.to_string(),
        user.to_string(),
    )
}

/// File modification time in integer milliseconds, the version token.
fn mtime_ms(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| AdjudicateError::io(path, e))?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    Ok(since_epoch.as_millis() as u64)
}
