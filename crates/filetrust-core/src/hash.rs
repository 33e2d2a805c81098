//! Content digests with a selectable algorithm.
//!
//! Files are always hashed as a stream (64 KiB reads fed into an incremental
//! context) so arbitrarily large files never have to fit in memory.

use crate::error::{require_file, IoResultExt, Result, TrustError};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Buffer size for streaming reads (64KB)
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DigestAlgorithm {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA1")]
    Sha1,
    #[default]
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "SHA512")]
    Sha512,
    #[serde(rename = "BLAKE3")]
    Blake3,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 5] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Blake3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
            Self::Blake3 => "BLAKE3",
        }
    }

    /// MD5 and SHA1 are kept for reading old baselines only.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Md5 | Self::Sha1)
    }

    /// Length of the hex digest this algorithm produces.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 | Self::Blake3 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| TrustError::InvalidArgument(format!("unknown digest algorithm: {s}")))
    }
}

/// Digest an in-memory byte slice.
pub fn digest_bytes(bytes: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Md5 => hex::encode(md5::Md5::digest(bytes)),
        DigestAlgorithm::Sha1 => hex::encode(sha1::Sha1::digest(bytes)),
        DigestAlgorithm::Sha256 => hex::encode(sha2::Sha256::digest(bytes)),
        DigestAlgorithm::Sha512 => hex::encode(sha2::Sha512::digest(bytes)),
        DigestAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
    }
}

/// Stream a reader through the selected algorithm.
pub fn digest_reader<R: Read>(reader: &mut R, algorithm: DigestAlgorithm) -> io::Result<String> {
    match algorithm {
        DigestAlgorithm::Md5 => stream::<md5::Md5, _>(reader),
        DigestAlgorithm::Sha1 => stream::<sha1::Sha1, _>(reader),
        DigestAlgorithm::Sha256 => stream::<sha2::Sha256, _>(reader),
        DigestAlgorithm::Sha512 => stream::<sha2::Sha512, _>(reader),
        DigestAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            let mut buffer = vec![0u8; BUFFER_SIZE];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        hasher.update(&buffer[..n]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(hasher.finalize().to_hex().to_string())
        }
    }
}

fn stream<D: Digest, R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a single file. Directories are rejected.
pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<String> {
    require_file(path)?;
    let mut file = File::open(path).at(path)?;
    digest_reader(&mut file, algorithm).at(path)
}

/// Compare two hex digests case-insensitively.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
}
