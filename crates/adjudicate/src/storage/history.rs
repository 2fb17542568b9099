//! Rolling history snapshots for stored documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{AdjudicateError, Result};

/// Timestamp format embedded in snapshot file names.
const SNAPSHOT_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// File name of a snapshot of one user's document taken at `time`.
pub fn snapshot_name(user: &str, time: DateTime<Utc>) -> String {
    format!("{}.{}.bak", user, time.format(SNAPSHOT_TIME_FORMAT))
}

/// Matcher for snapshot siblings of one user's document.
fn snapshot_pattern(user: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"^{}\.(\d{{8}}-\d{{6}})\.bak$",
        regex::escape(user)
    ))
    .map_err(|e| AdjudicateError::Schema(format!("invalid snapshot pattern: {}", e)))
}

/// All snapshots of one user's document, oldest first.
pub fn list_snapshots(dir: &Path, user: &str) -> Result<Vec<(DateTime<Utc>, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = snapshot_pattern(user)?;
    let mut snapshots = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| AdjudicateError::io(dir, e))?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(captures) = pattern.captures(name) else {
            continue;
        };
        match NaiveDateTime::parse_from_str(&captures[1], SNAPSHOT_TIME_FORMAT) {
            Ok(naive) => snapshots.push((Utc.from_utc_datetime(&naive), entry.path())),
            Err(_) => warn!(file = name, "snapshot with unparseable timestamp ignored"),
        }
    }
    snapshots.sort();
    Ok(snapshots)
}

/// Copy the current file to a dated snapshot sibling.
pub fn take_snapshot(current: &Path, user: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let dir = current.parent().unwrap_or(Path::new("."));
    let snapshot = dir.join(snapshot_name(user, now));
    fs::copy(current, &snapshot).map_err(|e| AdjudicateError::io(&snapshot, e))?;
    debug!(snapshot = %snapshot.display(), "history snapshot taken");
    Ok(snapshot)
}

/// Remove snapshots beyond the retention count (oldest first) and, when a
/// maximum age is configured, snapshots older than that age.
pub fn prune_snapshots(
    dir: &Path,
    user: &str,
    keep_count: usize,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<usize> {
    let snapshots = list_snapshots(dir, user)?;
    let mut remove = Vec::new();

    if snapshots.len() > keep_count {
        remove.extend_from_slice(&snapshots[..snapshots.len() - keep_count]);
    }
    if !max_age.is_zero() {
        let cutoff = now
            - chrono::Duration::from_std(max_age)
                .map_err(|e| AdjudicateError::Schema(format!("invalid retention age: {}", e)))?;
        for snapshot in &snapshots {
            if snapshot.0 < cutoff && !remove.contains(snapshot) {
                remove.push(snapshot.clone());
            }
        }
    }

    for (_, path) in &remove {
        fs::remove_file(path).map_err(|e| AdjudicateError::io(path, e))?;
        debug!(snapshot = %path.display(), "history snapshot pruned");
    }
    Ok(remove.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_snapshot_name_pattern() {
        let name = snapshot_name("anna", at(2025, 3, 14, 9));
        assert_eq!(name, "anna.20250314-090000.bak");
    }

    #[test]
    fn test_list_snapshots_only_matches_own_user() {
        let dir = TempDir::new().unwrap();
        for name in [
            "anna.20250101-000000.bak",
            "anna.20250102-000000.bak",
            "ben.20250103-000000.bak",
            "anna.ann",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let snapshots = list_snapshots(dir.path(), "anna").unwrap();
        assert_eq!(snapshots.len(), 2);
        // Oldest first.
        assert!(snapshots[0].0 < snapshots[1].0);
    }

    #[test]
    fn test_prune_by_count() {
        let dir = TempDir::new().unwrap();
        for day in 1..=5 {
            let name = snapshot_name("anna", at(2025, 1, day, 0));
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed =
            prune_snapshots(dir.path(), "anna", 2, Duration::ZERO, at(2025, 1, 6, 0)).unwrap();
        assert_eq!(removed, 3);

        let left = list_snapshots(dir.path(), "anna").unwrap();
        assert_eq!(left.len(), 2);
        // The newest snapshots survive.
        assert_eq!(left[0].0, at(2025, 1, 4, 0));
    }

    #[test]
    fn test_prune_by_age() {
        let dir = TempDir::new().unwrap();
        for day in [1, 2, 20] {
            let name = snapshot_name("anna", at(2025, 1, day, 0));
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let week = Duration::from_secs(7 * 24 * 3600);
        let removed = prune_snapshots(dir.path(), "anna", 10, week, at(2025, 1, 21, 0)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(list_snapshots(dir.path(), "anna").unwrap().len(), 1);
    }
}
