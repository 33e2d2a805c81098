//! Baseline creation and verification over single files or directory trees.
//!
//! `enable` walks the target, hashes every regular file on a bounded rayon
//! pool and persists the result through the injected [`BaselineStore`]. The
//! monitor keeps its own cache of active baselines, so independent monitors
//! never share state. `verify` is read-only: it never writes the store.

use crate::error::{ErrorKind, IoResultExt, Result, TrustError};
use crate::hash::{digest_file, digest_reader, digests_match, DigestAlgorithm};
use crate::integrity::models::{
    Baseline, EnableReport, FileDigestRecord, FileWarning, IntegrityReport, ModificationRecord,
    MonitorState,
};
use crate::integrity::progress::{NoProgress, ProgressSink, ProgressTracker};
use crate::integrity::store::{BaselineStore, FsBaselineStore};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

const UNRECORDABLE_NAME: &str = "file name is not valid UTF-8 and cannot be recorded";

pub struct IntegrityMonitor {
    store: Arc<dyn BaselineStore>,
    baselines: RwLock<HashMap<PathBuf, Baseline>>,
    verifying: Mutex<HashSet<PathBuf>>,
    pool: rayon::ThreadPool,
}

impl IntegrityMonitor {
    /// Monitor with one hashing worker per available core.
    pub fn new(store: Arc<dyn BaselineStore>) -> Result<Self> {
        Self::with_workers(store, 0)
    }

    /// `workers == 0` lets rayon pick the core count.
    pub fn with_workers(store: Arc<dyn BaselineStore>, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("filetrust-hash-{i}"))
            .build()
            .map_err(|e| TrustError::InvalidArgument(format!("hash worker pool: {e}")))?;
        Ok(Self {
            store,
            baselines: RwLock::new(HashMap::new()),
            verifying: Mutex::new(HashSet::new()),
            pool,
        })
    }

    /// Monitor backed by the on-disk store in the default data directory.
    pub fn open_default() -> Result<Self> {
        Self::new(Arc::new(FsBaselineStore::open_default()?))
    }

    pub fn enable(
        &self,
        path: &Path,
        algorithm: DigestAlgorithm,
        recurse: bool,
    ) -> Result<EnableReport> {
        self.enable_with_progress(path, algorithm, recurse, &NoProgress)
    }

    /// Create (or wholesale replace) the baseline for `path`.
    ///
    /// Unreadable files are left out and listed in the report's warnings; only
    /// a missing target or a failure to persist aborts the call.
    pub fn enable_with_progress(
        &self,
        path: &Path,
        algorithm: DigestAlgorithm,
        recurse: bool,
        progress: &dyn ProgressSink,
    ) -> Result<EnableReport> {
        fs::metadata(path).at(path)?;
        let root = normalize_root(path)?;
        if algorithm.is_legacy() {
            warn!(root = %root.display(), %algorithm, "legacy digest algorithm selected for new baseline");
        }

        let (found, mut warnings) = collect_files(&root, recurse);
        let candidate_count = found.len();
        info!(root = %root.display(), candidates = candidate_count, %algorithm, "creating baseline");

        // Record keys must be valid UTF-8 in the persisted JSON.
        let (candidates, unnamed): (Vec<PathBuf>, Vec<PathBuf>) =
            found.into_iter().partition(|p| p.to_str().is_some());
        for file in unnamed {
            warn!(path = %file.display(), "excluded from baseline: name is not valid UTF-8");
            warnings.push(FileWarning {
                path: file,
                error: UNRECORDABLE_NAME.to_string(),
            });
        }

        let baseline_date = Utc::now();
        let tracker = ProgressTracker::new(progress, candidates.len());
        let hashed: Vec<(PathBuf, Result<FileDigestRecord>)> = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|file| {
                    let record = digest_record(file, algorithm, baseline_date);
                    tracker.advance(file);
                    (file.clone(), record)
                })
                .collect()
        });

        let mut records = BTreeMap::new();
        for (file, result) in hashed {
            match result {
                Ok(record) => {
                    records.insert(file, record);
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "excluded from baseline");
                    warnings.push(FileWarning {
                        path: file,
                        error: e.to_string(),
                    });
                }
            }
        }
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let baseline = Baseline {
            root: root.clone(),
            algorithm,
            created_at: baseline_date,
            records,
        };
        self.store.save(&root, &baseline)?;
        let file_count = baseline.len();
        self.baselines.write().insert(root.clone(), baseline);

        if file_count < candidate_count {
            warn!(
                root = %root.display(),
                processed = file_count,
                candidates = candidate_count,
                "partial baseline created"
            );
        } else {
            info!(root = %root.display(), files = file_count, "baseline created");
        }

        Ok(EnableReport {
            root_path: root,
            file_count,
            candidate_count,
            algorithm,
            baseline_date,
            warnings,
        })
    }

    pub fn verify(&self, path: &Path) -> Result<IntegrityReport> {
        self.verify_with_progress(path, &NoProgress)
    }

    /// Re-hash every baselined file and report what changed.
    pub fn verify_with_progress(
        &self,
        path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<IntegrityReport> {
        let root = normalize_root(path)?;
        let baseline = self.baseline(&root)?;
        let _verifying = VerifyingGuard::enter(&self.verifying, &root);

        let records: Vec<&FileDigestRecord> = baseline.records.values().collect();
        let total_files = records.len();
        let tracker = ProgressTracker::new(progress, total_files);
        let mut modifications: Vec<ModificationRecord> = self.pool.install(|| {
            records
                .par_iter()
                .filter_map(|record| {
                    let outcome = check_record(record);
                    tracker.advance(&record.path);
                    outcome
                })
                .collect()
        });
        modifications.sort_by(|a, b| a.path().cmp(b.path()));

        let verified_files = total_files - modifications.len();
        if modifications.is_empty() {
            info!(root = %root.display(), files = total_files, "integrity verified");
        } else {
            error!(
                root = %root.display(),
                changed = modifications.len(),
                files = total_files,
                "integrity violation detected"
            );
        }

        Ok(IntegrityReport {
            path: root,
            total_files,
            verified_files,
            modifications,
            verification_date: Utc::now(),
        })
    }

    /// The active baseline for `path`, loading it from the store on a cache
    /// miss. Fails with `NoBaseline` when none was ever created.
    pub fn baseline(&self, path: &Path) -> Result<Baseline> {
        let root = normalize_root(path)?;
        if let Some(baseline) = self.baselines.read().get(&root) {
            return Ok(baseline.clone());
        }
        let baseline = self.store.load(&root).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrustError::NoBaseline(root.clone()),
            _ => e,
        })?;
        debug!(root = %root.display(), "baseline restored from store");
        self.baselines.write().insert(root, baseline.clone());
        Ok(baseline)
    }

    /// Forget the baseline for `path`, in memory and on disk.
    pub fn disable(&self, path: &Path) -> Result<bool> {
        let root = normalize_root(path)?;
        let cached = self.baselines.write().remove(&root).is_some();
        let stored = self.store.remove(&root)?;
        if cached || stored {
            info!(root = %root.display(), "baseline removed");
        }
        Ok(cached || stored)
    }

    pub fn state(&self, path: &Path) -> MonitorState {
        let Ok(root) = normalize_root(path) else {
            return MonitorState::Uninitialized;
        };
        if self.verifying.lock().contains(&root) {
            return MonitorState::Verifying;
        }
        if self.baselines.read().contains_key(&root) || self.store.load(&root).is_ok() {
            MonitorState::BaselineActive
        } else {
            MonitorState::Uninitialized
        }
    }
}

struct VerifyingGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    root: PathBuf,
}

impl<'a> VerifyingGuard<'a> {
    fn enter(set: &'a Mutex<HashSet<PathBuf>>, root: &Path) -> Self {
        set.lock().insert(root.to_path_buf());
        Self {
            set,
            root: root.to_path_buf(),
        }
    }
}

impl Drop for VerifyingGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.root);
    }
}

/// Absolute, symlink-free form of `path`. Paths that no longer exist are made
/// absolute without resolution so a deleted root can still be verified.
pub fn normalize_root(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                let cwd = std::env::current_dir().at(path)?;
                Ok(cwd.join(path))
            }
        }
        Err(e) => Err(TrustError::io(path, e)),
    }
}

/// Regular files under `root` (or `root` itself). Walk errors become warnings.
fn collect_files(root: &Path, recurse: bool) -> (Vec<PathBuf>, Vec<FileWarning>) {
    let mut files = Vec::new();
    let mut warnings = Vec::new();

    let walker = if root.is_file() {
        WalkDir::new(root).max_depth(0)
    } else if recurse {
        WalkDir::new(root).follow_links(false).min_depth(1)
    } else {
        WalkDir::new(root).follow_links(false).min_depth(1).max_depth(1)
    };

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                warn!(path = %path.display(), error = %e, "cannot enumerate");
                warnings.push(FileWarning {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }
    files.sort();
    (files, warnings)
}

fn digest_record(
    path: &Path,
    algorithm: DigestAlgorithm,
    baseline_date: DateTime<Utc>,
) -> Result<FileDigestRecord> {
    let mut file = File::open(path).at(path)?;
    let metadata = file.metadata().at(path)?;
    let hash = digest_reader(&mut file, algorithm).at(path)?;
    let last_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(baseline_date);
    debug!(path = %path.display(), %algorithm, "hashed");
    Ok(FileDigestRecord {
        path: path.to_path_buf(),
        hash,
        algorithm,
        baseline_date,
        size: metadata.len(),
        last_modified,
    })
}

/// `None` when the file still matches. Digest is the only criterion; size and
/// mtime are informational.
fn check_record(record: &FileDigestRecord) -> Option<ModificationRecord> {
    match digest_file(&record.path, record.algorithm) {
        Ok(current) if digests_match(&current, &record.hash) => None,
        Ok(current) => Some(ModificationRecord::Modified {
            path: record.path.clone(),
            baseline_hash: record.hash.clone(),
            current_hash: current,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Some(ModificationRecord::Deleted {
            path: record.path.clone(),
            baseline_hash: record.hash.clone(),
        }),
        Err(e) => Some(ModificationRecord::Unreadable {
            path: record.path.clone(),
            baseline_hash: record.hash.clone(),
            error: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::models::ModificationStatus;
    use crate::integrity::store::MemoryBaselineStore;
    use std::fs;
    use tempfile::tempdir;

    fn monitor() -> IntegrityMonitor {
        IntegrityMonitor::with_workers(Arc::new(MemoryBaselineStore::new()), 2).unwrap()
    }

    #[test]
    fn non_recursive_skips_subdirectories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.txt"), b"deep").unwrap();

        let m = monitor();
        let flat = m.enable(dir.path(), DigestAlgorithm::Sha256, false).unwrap();
        assert_eq!(flat.file_count, 1);
        let deep = m.enable(dir.path(), DigestAlgorithm::Sha256, true).unwrap();
        assert_eq!(deep.file_count, 2);
    }

    #[test]
    fn single_file_baseline() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.bin");
        fs::write(&file, b"payload").unwrap();

        let m = monitor();
        let report = m.enable(&file, DigestAlgorithm::Blake3, true).unwrap();
        assert_eq!(report.file_count, 1);
        assert_eq!(report.root_path, fs::canonicalize(&file).unwrap());

        fs::write(&file, b"payload!").unwrap();
        let verify = m.verify(&file).unwrap();
        assert_eq!(verify.count(ModificationStatus::Modified), 1);
    }

    #[test]
    fn mtime_change_alone_is_not_reported() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("same.txt");
        fs::write(&file, b"unchanged").unwrap();
        let m = monitor();
        m.enable(dir.path(), DigestAlgorithm::Sha256, true).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&file, b"unchanged").unwrap();
        assert!(m.verify(dir.path()).unwrap().is_clean());
    }

    #[test]
    fn missing_target_is_not_found() {
        let dir = tempdir().unwrap();
        let err = monitor()
            .enable(&dir.path().join("absent"), DigestAlgorithm::Sha256, true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn verify_without_baseline_fails() {
        let dir = tempdir().unwrap();
        let err = monitor().verify(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoBaseline);
    }

    #[test]
    fn state_transitions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"a").unwrap();
        let m = monitor();
        assert_eq!(m.state(dir.path()), MonitorState::Uninitialized);
        m.enable(dir.path(), DigestAlgorithm::Sha256, true).unwrap();
        assert_eq!(m.state(dir.path()), MonitorState::BaselineActive);
        m.verify(dir.path()).unwrap();
        assert_eq!(m.state(dir.path()), MonitorState::BaselineActive);
        assert!(m.disable(dir.path()).unwrap());
        assert_eq!(m.state(dir.path()), MonitorState::Uninitialized);
    }

    #[test]
    fn progress_reaches_total() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("f{i}")), format!("{i}")).unwrap();
        }
        let last = Mutex::new((0usize, 0usize));
        let sink = |processed: usize, total: usize, _: &Path| {
            *last.lock() = (processed, total);
        };
        monitor()
            .enable_with_progress(dir.path(), DigestAlgorithm::Sha256, true, &sink)
            .unwrap();
        assert_eq!(*last.lock(), (10, 10));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_excluded_with_warning() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ok.txt"), b"ok").unwrap();
        let locked = dir.path().join("locked.txt");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&locked).is_ok() {
            // running as root; permissions do not restrict reads
            return;
        }

        let report = monitor()
            .enable(dir.path(), DigestAlgorithm::Sha256, true)
            .unwrap();
        assert_eq!(report.candidate_count, 2);
        assert_eq!(report.file_count, 1);
        assert!(report.is_partial());
        assert_eq!(report.warnings.len(), 1);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }
}
