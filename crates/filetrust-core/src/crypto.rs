//! Password-based encryption of a single file at rest.
//!
//! Container layout: `salt (32) || iv (16) || ciphertext`. PBKDF2-HMAC-SHA256
//! over the password with 100,000 rounds yields 64 bytes: the first half keys
//! AES-256-CBC (PKCS#7 padding), the second half keys an HMAC-SHA256 tag. The
//! encrypted payload is the file content followed by that tag, so a wrong
//! password and a damaged container both surface as one generic
//! `DecryptionFailed`.

use crate::error::{require_file, IoResultExt, Result, TrustError};
use crate::util::{with_appended_extension, write_atomic};
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const HEADER_LEN: usize = SALT_LEN + IV_LEN;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 32;
pub const BLOCK_LEN: usize = 16;
pub const KDF_ITERATIONS: u32 = 100_000;
pub const DEFAULT_EXTENSION: &str = "enc";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Independent cipher and MAC keys for one container.
pub struct FileKeys {
    pub enc: Zeroizing<[u8; KEY_LEN]>,
    pub mac: Zeroizing<[u8; KEY_LEN]>,
}

/// Derive the file keys. Takes the password by value: the plaintext buffer is
/// wiped when this returns, whichever way it returns.
pub fn derive_keys(password: Zeroizing<String>, salt: &[u8]) -> FileKeys {
    let mut okm = Zeroizing::new([0u8; 2 * KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, &mut okm[..]);
    let mut keys = FileKeys {
        enc: Zeroizing::new([0u8; KEY_LEN]),
        mac: Zeroizing::new([0u8; KEY_LEN]),
    };
    keys.enc.copy_from_slice(&okm[..KEY_LEN]);
    keys.mac.copy_from_slice(&okm[KEY_LEN..]);
    keys
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn payload_tag(key: &[u8; KEY_LEN], content: &[u8]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| TrustError::InvalidArgument(format!("hmac key: {e}")))?;
    mac.update(content);
    Ok(mac)
}

/// Encrypt `content` into a complete container.
pub fn seal(content: &[u8], password: Zeroizing<String>) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(TrustError::InvalidArgument("password must not be empty".into()));
    }
    let salt = generate_salt();
    let iv = generate_iv();
    let keys = derive_keys(password, &salt);

    let tag = payload_tag(&keys.mac, content)?.finalize().into_bytes();
    let mut payload = Zeroizing::new(Vec::with_capacity(content.len() + TAG_LEN));
    payload.extend_from_slice(content);
    payload.extend_from_slice(&tag);

    let cipher = Aes256CbcEnc::new_from_slices(&keys.enc[..], &iv)
        .map_err(|e| TrustError::InvalidArgument(format!("cipher init: {e}")))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(&payload);

    let mut container = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    container.extend_from_slice(&salt);
    container.extend_from_slice(&iv);
    container.extend_from_slice(&ciphertext);
    Ok(container)
}

/// Decrypt a container read from `origin` (used only for error reporting).
pub fn open(
    container: &[u8],
    password: Zeroizing<String>,
    origin: &Path,
) -> Result<Zeroizing<Vec<u8>>> {
    if container.len() < HEADER_LEN {
        return Err(TrustError::FileTooSmall {
            path: origin.to_path_buf(),
            len: container.len() as u64,
        });
    }
    let (salt, rest) = container.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);
    let keys = derive_keys(password, salt);

    let failed = || TrustError::DecryptionFailed(origin.to_path_buf());
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(failed());
    }
    let cipher = Aes256CbcDec::new_from_slices(&keys.enc[..], iv).map_err(|_| failed())?;
    let payload = Zeroizing::new(
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| failed())?,
    );
    if payload.len() < TAG_LEN {
        return Err(failed());
    }
    let (content, tag) = payload.split_at(payload.len() - TAG_LEN);
    payload_tag(&keys.mac, content)?
        .verify_slice(tag)
        .map_err(|_| failed())?;
    Ok(Zeroizing::new(content.to_vec()))
}

#[derive(Debug, Clone)]
pub struct CryptoBox {
    extension: String,
}

impl Default for CryptoBox {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoBox {
    pub fn new() -> Self {
        Self::with_extension(DEFAULT_EXTENSION)
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// `report.pdf` -> `report.pdf.enc`
    pub fn encrypted_path(&self, path: &Path) -> PathBuf {
        with_appended_extension(path, &self.extension)
    }

    /// `report.pdf.enc` -> `report.pdf`; anything else gets `.dec` appended.
    pub fn decrypted_path(&self, path: &Path) -> PathBuf {
        match path.extension() {
            Some(ext) if ext == self.extension.as_str() => path.with_extension(""),
            _ => with_appended_extension(path, "dec"),
        }
    }

    pub fn protect(&self, path: &Path, password: Zeroizing<String>) -> Result<PathBuf> {
        self.protect_to(path, &self.encrypted_path(path), password)
    }

    /// Encrypt `path` into `output`. The output appears atomically or not at
    /// all; the source is left untouched.
    pub fn protect_to(
        &self,
        path: &Path,
        output: &Path,
        password: Zeroizing<String>,
    ) -> Result<PathBuf> {
        require_file(path)?;
        let content = Zeroizing::new(fs::read(path).at(path)?);
        let container = seal(&content, password)?;
        write_atomic(output, &container)?;
        info!(path = %path.display(), output = %output.display(), "file protected");
        Ok(output.to_path_buf())
    }

    pub fn unprotect(&self, path: &Path, password: Zeroizing<String>) -> Result<PathBuf> {
        self.unprotect_to(path, &self.decrypted_path(path), password)
    }

    pub fn unprotect_to(
        &self,
        path: &Path,
        output: &Path,
        password: Zeroizing<String>,
    ) -> Result<PathBuf> {
        let metadata = require_file(path)?;
        if metadata.len() < HEADER_LEN as u64 {
            return Err(TrustError::FileTooSmall {
                path: path.to_path_buf(),
                len: metadata.len(),
            });
        }
        let container = fs::read(path).at(path)?;
        let content = open(&container, password, path)?;
        write_atomic(output, &content)?;
        debug!(bytes = content.len(), "container decrypted");
        info!(path = %path.display(), output = %output.display(), "file unprotected");
        Ok(output.to_path_buf())
    }
}
