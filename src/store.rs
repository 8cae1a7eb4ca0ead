use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;

use crate::processing::{ProcessedFile, Record, RecordId, SpectraStore, Status};

// ---------------------------------------------------------------------------
// DirectoryStore – a spectra database laid out on disk
// ---------------------------------------------------------------------------

/// Filesystem stand-in for the remote spectra database.
///
/// ```text
/// <root>/records/<id>.json           Record
/// <root>/references.json             { "<sample id>": <reference record id> }
/// <root>/<file_url>                  raw instrument files
/// <root>/processed/<id>/<name>.csv   uploaded canonical file
/// <root>/processed/<id>/metadata.json
/// <root>/processed/<id>/status
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join("records").is_dir() {
            bail!("{} has no records/ directory", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn processed_dir(&self, id: RecordId) -> PathBuf {
        self.root.join("processed").join(id.to_string())
    }

    /// Last status written for a record.
    pub fn status(&self, id: RecordId) -> Result<Option<Status>> {
        let path = self.processed_dir(id).join("status");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let status = serde_json::from_value(JsonValue::String(text.trim().to_string()))
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(status))
    }

    fn write(&self, id: RecordId, name: &str, contents: &[u8]) -> Result<()> {
        let dir = self.processed_dir(id);
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(name);
        std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))
    }
}

impl SpectraStore for DirectoryStore {
    fn record(&self, id: RecordId) -> Result<Record> {
        let path = self.root.join("records").join(format!("{id}.json"));
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let record: Record =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        if record.id != id {
            bail!("{} holds record {}", path.display(), record.id);
        }
        Ok(record)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let relative = Path::new(url.trim_start_matches('/'));
        if relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            bail!("refusing to read outside the store: {url}");
        }
        let path = self.root.join(relative);
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }

    fn find_reference(&self, parent_id: RecordId) -> Result<Option<RecordId>> {
        let path = self.root.join("references.json");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let references: BTreeMap<String, RecordId> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(references.get(&parent_id.to_string()).copied())
    }

    fn upload_processed(&self, id: RecordId, file: &ProcessedFile) -> Result<()> {
        let name = Path::new(&file.name)
            .file_name()
            .and_then(|n| n.to_str())
            .context("processed file has no usable name")?;
        self.write(id, name, &file.bytes)
    }

    fn update_metadata(&self, id: RecordId, metadata: &JsonValue) -> Result<()> {
        let text = serde_json::to_string_pretty(metadata)?;
        self.write(id, "metadata.json", text.as_bytes())
    }

    fn update_status(&self, id: RecordId, status: Status) -> Result<()> {
        self.write(id, "status", status.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_record() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("records")).unwrap();
        std::fs::create_dir_all(dir.path().join("files")).unwrap();
        std::fs::write(
            dir.path().join("records/3.json"),
            r#"{"id": 3, "file_url": "/files/a.dpt", "filename": "a.dpt", "parent_id": 9}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("files/a.dpt"), "1.0,2.0\n").unwrap();
        std::fs::write(dir.path().join("references.json"), r#"{"9": 4}"#).unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn reads_records_and_files() {
        let (_dir, store) = store_with_record();
        let record = store.record(3).unwrap();
        assert_eq!(record.parent_id, Some(9));
        assert_eq!(store.fetch(&record.file_url).unwrap(), b"1.0,2.0\n");
        assert_eq!(store.find_reference(9).unwrap(), Some(4));
        assert_eq!(store.find_reference(8).unwrap(), None);
    }

    #[test]
    fn writes_outputs_under_processed() {
        let (_dir, store) = store_with_record();
        let file = ProcessedFile {
            name: "a.csv".into(),
            bytes: b"1.0,2.0\n".to_vec(),
        };
        store.upload_processed(3, &file).unwrap();
        store.update_status(3, Status::Successful).unwrap();
        assert_eq!(std::fs::read(store.processed_dir(3).join("a.csv")).unwrap(), b"1.0,2.0\n");
        assert_eq!(store.status(3).unwrap(), Some(Status::Successful));
    }

    #[test]
    fn parent_dir_urls_are_refused() {
        let (_dir, store) = store_with_record();
        assert!(store.fetch("../etc/passwd").is_err());
    }

    #[test]
    fn missing_records_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryStore::open(dir.path()).is_err());
    }
}
