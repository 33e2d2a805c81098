//! Persisted defaults for every FileTrust operation.

use crate::error::{Result, TrustError};
use crate::hash::DigestAlgorithm;
use crate::util::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegritySettings {
    pub algorithm: DigestAlgorithm,
    pub recurse: bool,
    /// Hashing threads; 0 means one per available core.
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EraserSettings {
    pub passes: u32,
    pub verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoSettings {
    pub encrypted_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SigningSettings {
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustSettings {
    pub integrity: IntegritySettings,
    pub eraser: EraserSettings,
    pub crypto: CryptoSettings,
    #[serde(default)]
    pub signing: SigningSettings,
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            integrity: IntegritySettings {
                algorithm: DigestAlgorithm::Sha256,
                recurse: true,
                workers: 0,
            },
            eraser: EraserSettings {
                passes: 3,
                verify: true,
            },
            crypto: CryptoSettings {
                encrypted_extension: "enc".into(),
            },
            signing: SigningSettings::default(),
        }
    }
}

/// Missing file means defaults; a malformed one is reported, not ignored.
pub fn load_settings(path: &Path) -> Result<TrustSettings> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| TrustError::corrupt(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TrustSettings::default()),
        Err(e) => Err(TrustError::io(path, e)),
    }
}

pub fn save_settings(path: &Path, settings: &TrustSettings) -> Result<()> {
    write_json_atomic(path, settings)
}
