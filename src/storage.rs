//! Month-partitioned file storage.
//!
//! The store is a plain directory tree: `<root>/<YYYY-MM>/<filename>`. The
//! root is injected per instance so callers (and tests) can isolate trees.
//! [`ScratchArea`] provides the per-request staging partition with guaranteed
//! removal on every exit path.

use crate::error::{AnalysisError, Result};
use crate::month::{is_valid_month, validate_month};
use crate::schema::file_type_tag;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFileInfo {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
}

#[derive(Debug, Clone)]
pub struct MonthStore {
    root: PathBuf,
}

impl MonthStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn month_dir(&self, month: &str) -> PathBuf {
        self.root.join(month)
    }

    pub fn has_month(&self, month: &str) -> bool {
        self.month_dir(month).is_dir()
    }

    pub fn put(&self, month: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        validate_month(month)?;
        let dir = self.month_dir(month);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(filename), bytes)?;
        Ok(())
    }

    /// Filenames stored under a month, sorted lexicographically so every
    /// downstream iteration is deterministic. Missing month yields an empty
    /// list.
    pub fn list(&self, month: &str) -> Result<Vec<String>> {
        validate_month(month)?;
        let dir = self.month_dir(month);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn get(&self, month: &str, filename: &str) -> Result<Vec<u8>> {
        validate_month(month)?;
        Ok(fs::read(self.month_dir(month).join(filename))?)
    }

    pub fn file_path(&self, month: &str, filename: &str) -> Result<PathBuf> {
        validate_month(month)?;
        Ok(self.month_dir(month).join(filename))
    }

    pub fn delete(&self, month: &str, filename: &str) -> Result<()> {
        validate_month(month)?;
        let path = self.month_dir(month).join(filename);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn delete_all(&self, month: &str) -> Result<()> {
        validate_month(month)?;
        let dir = self.month_dir(month);
        if dir.is_dir() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// All month partitions present under the root, sorted. Entries that do
    /// not look like month keys (e.g. scratch partitions) are ignored.
    pub fn months(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut months = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() && is_valid_month(&name) {
                months.push(name);
            }
        }
        months.sort();
        Ok(months)
    }

    /// Month → stored file metadata, for the upload inventory view.
    pub fn inventory(&self) -> Result<BTreeMap<String, Vec<StoredFileInfo>>> {
        let mut result = BTreeMap::new();
        for month in self.months()? {
            let mut files = Vec::new();
            for name in self.list(&month)? {
                let path = self.month_dir(&month).join(&name);
                let size = fs::metadata(&path)?.len();
                files.push(StoredFileInfo {
                    file_type: file_type_tag(&name),
                    name,
                    size,
                });
            }
            result.insert(month, files);
        }
        Ok(result)
    }

    /// Removes every month partition under the root.
    pub fn clear(&self) -> Result<()> {
        for month in self.months()? {
            fs::remove_dir_all(self.month_dir(&month))?;
        }
        Ok(())
    }
}

/// A per-request staging directory keyed by requester identity.
///
/// Creation destroys any leftover partition for the same identity, so no
/// stale state carries between requests. Removal happens in `Drop`, which
/// makes cleanup unconditional across success, validation failure, upstream
/// failure and parse failure. Callers must not run overlapping requests for
/// one identity; the partitions would race (documented limitation).
#[derive(Debug)]
pub struct ScratchArea {
    path: PathBuf,
}

impl ScratchArea {
    pub fn create(upload_root: &Path, identity: &str) -> Result<Self> {
        let path = upload_root.join(format!("tmp_{}", identity));
        if path.exists() {
            debug!("removing stale scratch partition {}", path.display());
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A month store rooted at this scratch partition.
    pub fn store(&self) -> MonthStore {
        MonthStore::new(&self.path)
    }

    /// Stages one uploaded file under its month partition.
    pub fn stage(&self, month: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        if month.is_empty() {
            return Err(AnalysisError::InvalidMonthFormat(month.to_string()));
        }
        self.store().put(month, filename, bytes)
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if self.path.exists() {
                warn!("failed to remove scratch partition {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_list_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MonthStore::new(dir.path());

        store.put("2024-10", "b.csv", b"x,y").unwrap();
        store.put("2024-10", "a.csv", b"1,2").unwrap();

        assert_eq!(store.list("2024-10").unwrap(), vec!["a.csv", "b.csv"]);
        assert_eq!(store.get("2024-10", "a.csv").unwrap(), b"1,2");
        assert_eq!(store.months().unwrap(), vec!["2024-10"]);
    }

    #[test]
    fn test_invalid_month_rejected_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let store = MonthStore::new(dir.path());

        let err = store.put("2024/10", "a.csv", b"").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidMonthFormat(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_list_missing_month_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MonthStore::new(dir.path());
        assert!(store.list("2024-01").unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = MonthStore::new(dir.path());
        store.put("2024-10", "a.csv", b"1").unwrap();
        store.put("2024-11", "b.csv", b"2").unwrap();

        store.delete("2024-10", "a.csv").unwrap();
        assert!(store.list("2024-10").unwrap().is_empty());

        store.clear().unwrap();
        assert!(store.months().unwrap().is_empty());
    }

    #[test]
    fn test_inventory_reports_metadata() {
        let dir = TempDir::new().unwrap();
        let store = MonthStore::new(dir.path());
        store.put("2024-10", "report.xlsx", b"12345").unwrap();

        let inventory = store.inventory().unwrap();
        let files = &inventory["2024-10"];
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report.xlsx");
        assert_eq!(files[0].size, 5);
        assert_eq!(files[0].file_type, "xlsx");
    }

    #[test]
    fn test_scratch_area_replaces_stale_partition_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("tmp_7");
        fs::create_dir_all(stale.join("2024-01")).unwrap();
        fs::write(stale.join("2024-01/old.csv"), b"stale").unwrap();

        let scratch_path;
        {
            let scratch = ScratchArea::create(dir.path(), "7").unwrap();
            scratch_path = scratch.path().to_path_buf();
            assert!(!scratch_path.join("2024-01").exists());

            scratch.stage("2024-10", "new.csv", b"fresh").unwrap();
            assert_eq!(scratch.store().list("2024-10").unwrap(), vec!["new.csv"]);
        }
        assert!(!scratch_path.exists());
    }

    #[test]
    fn test_scratch_area_removed_even_when_empty() {
        let dir = TempDir::new().unwrap();
        let path = {
            let scratch = ScratchArea::create(dir.path(), "anonymous").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
