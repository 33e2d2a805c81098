//! Data models for baselines and verification reports.
//!
//! Field names of [`FileDigestRecord`] serialize in PascalCase because the
//! persisted baseline record is a fixed external format.

use crate::hash::DigestAlgorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One monitored file. Immutable once written; a new baseline supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileDigestRecord {
    pub path: PathBuf,
    pub hash: String,
    pub algorithm: DigestAlgorithm,
    pub baseline_date: DateTime<Utc>,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Point-in-time digests for every file under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub root: PathBuf,
    /// Persisted alongside the records, so it survives a reload even when the
    /// baseline holds no files.
    pub algorithm: DigestAlgorithm,
    pub created_at: DateTime<Utc>,
    pub records: BTreeMap<PathBuf, FileDigestRecord>,
}

impl Baseline {
    pub fn new(root: PathBuf, algorithm: DigestAlgorithm) -> Self {
        Self {
            root,
            algorithm,
            created_at: Utc::now(),
            records: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when every record lies under (or is) the root.
    pub fn is_contained(&self) -> bool {
        self.records.keys().all(|p| p.starts_with(&self.root))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }
}

/// A file that could not be processed; never fatal for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWarning {
    #[serde(serialize_with = "crate::util::serialize_path_lossy")]
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of `IntegrityMonitor::enable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableReport {
    pub root_path: PathBuf,
    pub file_count: usize,
    /// Files found before hashing; differs from `file_count` when some failed.
    pub candidate_count: usize,
    pub algorithm: DigestAlgorithm,
    pub baseline_date: DateTime<Utc>,
    pub warnings: Vec<FileWarning>,
}

impl EnableReport {
    pub fn is_partial(&self) -> bool {
        self.file_count < self.candidate_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModificationStatus {
    Modified,
    Deleted,
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ModificationRecord {
    Modified {
        path: PathBuf,
        baseline_hash: String,
        current_hash: String,
    },
    Deleted {
        path: PathBuf,
        baseline_hash: String,
    },
    /// Present on disk but could not be re-hashed.
    Unreadable {
        path: PathBuf,
        baseline_hash: String,
        error: String,
    },
}

impl ModificationRecord {
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified { path, .. } | Self::Deleted { path, .. } | Self::Unreadable { path, .. } => {
                path
            }
        }
    }

    pub fn status(&self) -> ModificationStatus {
        match self {
            Self::Modified { .. } => ModificationStatus::Modified,
            Self::Deleted { .. } => ModificationStatus::Deleted,
            Self::Unreadable { .. } => ModificationStatus::Unreadable,
        }
    }
}

/// Result of a verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub path: PathBuf,
    pub total_files: usize,
    pub verified_files: usize,
    pub modifications: Vec<ModificationRecord>,
    pub verification_date: DateTime<Utc>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.modifications.is_empty()
    }

    pub fn count(&self, status: ModificationStatus) -> usize {
        self.modifications
            .iter()
            .filter(|m| m.status() == status)
            .count()
    }
}

/// Lifecycle of a monitored root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Uninitialized,
    BaselineActive,
    Verifying,
}
