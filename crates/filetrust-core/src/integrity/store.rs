//! Durable baseline records.
//!
//! One JSON file per monitored root. The file name and the record's outer key
//! are derived from the root path: a filesystem-safe token plus a truncated
//! SHA-256 of the full path, so two roots that sanitize to the same token
//! still land in different files.
//!
//! The record file holds file entries only. Baseline-level facts (algorithm,
//! creation time) go to a `<token>.meta.json` sidecar so an empty baseline
//! reloads with the algorithm it was created with.

use crate::error::{Result, TrustError};
use crate::hash::DigestAlgorithm;
use crate::integrity::models::{Baseline, FileDigestRecord};
use crate::util::write_json_atomic;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_TOKEN_PREFIX: usize = 80;

type RecordFile = BTreeMap<String, BTreeMap<PathBuf, FileDigestRecord>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BaselineMeta {
    algorithm: DigestAlgorithm,
    created_at: DateTime<Utc>,
}

/// Persistence seam for [`Baseline`]s, keyed by normalized root path.
pub trait BaselineStore: Send + Sync {
    /// Overwrite whatever is stored for `root`.
    fn save(&self, root: &Path, baseline: &Baseline) -> Result<()>;

    /// Fails with `NotFound` when nothing is stored and `CorruptRecord` when
    /// the stored data cannot be decoded.
    fn load(&self, root: &Path) -> Result<Baseline>;

    /// Returns whether a record existed.
    fn remove(&self, root: &Path) -> Result<bool>;
}

/// Filesystem-safe, collision-resistant token for a root path.
pub fn record_token(root: &Path) -> String {
    let raw = root.to_string_lossy();
    let mut prefix: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = prefix.trim_matches(|c| c == '_' || c == '.').to_string();
    prefix = trimmed.chars().take(MAX_TOKEN_PREFIX).collect();
    if prefix.is_empty() {
        prefix.push_str("root");
    }
    let digest = Sha256::digest(raw.as_bytes());
    format!("{}-{}", prefix, hex::encode(&digest[..8]))
}

/// JSON files under a single directory.
#[derive(Debug, Clone)]
pub struct FsBaselineStore {
    dir: PathBuf,
}

impl FsBaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the default data directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::paths::baselines_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, root: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", record_token(root)))
    }

    pub fn meta_path(&self, root: &Path) -> PathBuf {
        self.dir.join(format!("{}.meta.json", record_token(root)))
    }

    fn load_meta(&self, root: &Path) -> Result<Option<BaselineMeta>> {
        let path = self.meta_path(root);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| TrustError::corrupt(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TrustError::io(&path, e)),
        }
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TrustError::io(path, e)),
    }
}

impl BaselineStore for FsBaselineStore {
    fn save(&self, root: &Path, baseline: &Baseline) -> Result<()> {
        let path = self.record_path(root);
        let mut file = RecordFile::new();
        file.insert(record_token(root), baseline.records.clone());
        write_json_atomic(&path, &file)?;
        let meta = BaselineMeta {
            algorithm: baseline.algorithm,
            created_at: baseline.created_at,
        };
        write_json_atomic(&self.meta_path(root), &meta)?;
        debug!(root = %root.display(), record = %path.display(), files = baseline.len(), "baseline saved");
        Ok(())
    }

    fn load(&self, root: &Path) -> Result<Baseline> {
        let path = self.record_path(root);
        let bytes = fs::read(&path).map_err(|e| TrustError::io(&path, e))?;
        let mut file: RecordFile =
            serde_json::from_slice(&bytes).map_err(|e| TrustError::corrupt(&path, e))?;

        let token = record_token(root);
        if file.len() != 1 {
            return Err(TrustError::corrupt(
                &path,
                format!("expected one root entry, found {}", file.len()),
            ));
        }
        let records = file
            .remove(&token)
            .ok_or_else(|| TrustError::corrupt(&path, "record belongs to a different root"))?;

        let meta = self.load_meta(root)?;
        let baseline = baseline_from_records(root, records, meta, &path)?;
        debug!(root = %root.display(), files = baseline.len(), "baseline loaded");
        Ok(baseline)
    }

    fn remove(&self, root: &Path) -> Result<bool> {
        let existed = remove_if_present(&self.record_path(root))?;
        remove_if_present(&self.meta_path(root))?;
        Ok(existed)
    }
}

fn baseline_from_records(
    root: &Path,
    records: BTreeMap<PathBuf, FileDigestRecord>,
    meta: Option<BaselineMeta>,
    record_path: &Path,
) -> Result<Baseline> {
    for (key, record) in &records {
        if key != &record.path {
            return Err(TrustError::corrupt(
                record_path,
                format!("entry key {} does not match its Path field", key.display()),
            ));
        }
        if !key.starts_with(root) {
            return Err(TrustError::corrupt(
                record_path,
                format!("{} is outside root {}", key.display(), root.display()),
            ));
        }
    }
    // Record files written without a sidecar fall back to their entries.
    let (algorithm, created_at) = match meta {
        Some(meta) => (meta.algorithm, meta.created_at),
        None => (
            records.values().next().map(|r| r.algorithm).unwrap_or_default(),
            records
                .values()
                .map(|r| r.baseline_date)
                .min()
                .unwrap_or_else(Utc::now),
        ),
    };
    Ok(Baseline {
        root: root.to_path_buf(),
        algorithm,
        created_at,
        records,
    })
}

/// Process-local store for hosts that do not want baselines on disk.
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    inner: RwLock<HashMap<PathBuf, Baseline>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn save(&self, root: &Path, baseline: &Baseline) -> Result<()> {
        self.inner.write().insert(root.to_path_buf(), baseline.clone());
        Ok(())
    }

    fn load(&self, root: &Path) -> Result<Baseline> {
        self.inner
            .read()
            .get(root)
            .cloned()
            .ok_or_else(|| TrustError::NotFound(root.to_path_buf()))
    }

    fn remove(&self, root: &Path) -> Result<bool> {
        Ok(self.inner.write().remove(root).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample(root: &Path) -> Baseline {
        let mut baseline = Baseline::new(root.to_path_buf(), DigestAlgorithm::Sha256);
        let path = root.join("a.txt");
        baseline.records.insert(
            path.clone(),
            FileDigestRecord {
                path,
                hash: "00ff".into(),
                algorithm: DigestAlgorithm::Sha256,
                baseline_date: Utc::now(),
                size: 2,
                last_modified: Utc::now(),
            },
        );
        baseline
    }

    #[test]
    fn token_is_safe_and_deterministic() {
        let token = record_token(Path::new("/home/user/My Docs"));
        assert_eq!(token, record_token(Path::new("/home/user/My Docs")));
        assert!(!token.contains('/'));
        assert!(!token.contains(' '));
        assert!(token.starts_with("home_user_My_Docs-"));
    }

    #[test]
    fn colliding_prefixes_get_distinct_tokens() {
        let a = record_token(Path::new("/data/a b"));
        let b = record_token(Path::new("/data/a_b"));
        assert_ne!(a, b);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path().join("baselines"));
        let root = Path::new("/srv/site");
        let baseline = sample(root);
        store.save(root, &baseline).unwrap();
        let loaded = store.load(root).unwrap();
        assert_eq!(loaded.records, baseline.records);
        assert_eq!(loaded.root, root);
    }

    #[test]
    fn persisted_layout_is_keyed_by_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let root = Path::new("/srv/site");
        store.save(root, &sample(root)).unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.record_path(root)).unwrap()).unwrap();
        let entry = &raw[record_token(root)]["/srv/site/a.txt"];
        assert_eq!(entry["Hash"], "00ff");
        assert_eq!(entry["Algorithm"], "SHA256");
        assert_eq!(entry["Size"], 2);
    }

    #[test]
    fn empty_baseline_keeps_its_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let root = Path::new("/srv/empty");
        let baseline = Baseline::new(root.to_path_buf(), DigestAlgorithm::Sha512);
        store.save(root, &baseline).unwrap();

        let loaded = store.load(root).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.algorithm, DigestAlgorithm::Sha512);
        assert_eq!(loaded.created_at, baseline.created_at);

        // the record file itself stays a plain token -> entries map
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.record_path(root)).unwrap()).unwrap();
        assert_eq!(raw[record_token(root)], serde_json::json!({}));
    }

    #[test]
    fn record_without_sidecar_uses_entry_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let root = Path::new("/srv/site");
        store.save(root, &sample(root)).unwrap();
        fs::remove_file(store.meta_path(root)).unwrap();
        assert_eq!(store.load(root).unwrap().algorithm, DigestAlgorithm::Sha256);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let err = store.load(Path::new("/nothing/here")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn malformed_record_is_corrupt_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let root = Path::new("/srv/site");
        fs::write(store.record_path(root), b"[1, 2,").unwrap();
        assert_eq!(store.load(root).unwrap_err().kind(), ErrorKind::CorruptRecord);
    }

    #[test]
    fn record_for_other_root_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let root = Path::new("/srv/site");
        let other = Path::new("/srv/other");
        store.save(other, &sample(other)).unwrap();
        fs::rename(store.record_path(other), store.record_path(root)).unwrap();
        assert_eq!(store.load(root).unwrap_err().kind(), ErrorKind::CorruptRecord);
    }

    #[test]
    fn remove_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBaselineStore::new(dir.path());
        let root = Path::new("/srv/site");
        store.save(root, &sample(root)).unwrap();
        assert!(store.remove(root).unwrap());
        assert!(!store.meta_path(root).exists());
        assert!(!store.remove(root).unwrap());
    }

    #[test]
    fn memory_store_behaves_like_fs_store() {
        let store = MemoryBaselineStore::new();
        let root = Path::new("/srv/site");
        assert_eq!(store.load(root).unwrap_err().kind(), ErrorKind::NotFound);
        store.save(root, &sample(root)).unwrap();
        assert_eq!(store.load(root).unwrap().len(), 1);
    }
}
