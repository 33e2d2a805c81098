//! Signer credentials and the providers that hand them out.

use crate::error::{IoResultExt, Result, TrustError};
use crate::util::write_json_atomic;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use keyring::Entry;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

pub const KEY_ALGORITHM: &str = "ed25519";
pub const KEYRING_SERVICE: &str = "FileTrust";

/// A signer identity bound to its Ed25519 key pair.
#[derive(Clone)]
pub struct Credential {
    identity: String,
    signing_key: SigningKey,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("public_key", &self.public_key_b64())
            .finish_non_exhaustive()
    }
}

impl Credential {
    pub fn generate(identity: impl Into<String>) -> Result<Self> {
        Self::from_signing_key(identity, SigningKey::generate(&mut OsRng))
    }

    pub fn from_signing_key(identity: impl Into<String>, signing_key: SigningKey) -> Result<Self> {
        let identity = identity.into();
        if identity.trim().is_empty() {
            return Err(TrustError::Credential("signer identity must not be empty".into()));
        }
        Ok(Self {
            identity,
            signing_key,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_b64(&self) -> String {
        general_purpose::STANDARD.encode(self.verifying_key().to_bytes())
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    fn secret_b64(&self) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode(self.signing_key.to_bytes()))
    }

    fn from_secret_b64(identity: String, encoded: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| TrustError::Credential(format!("decode secret key: {e}")))?,
        );
        let bytes: &[u8; SECRET_KEY_LENGTH] = raw.as_slice().try_into().map_err(|_| {
            TrustError::Credential(format!(
                "secret key must be {SECRET_KEY_LENGTH} bytes, got {}",
                raw.len()
            ))
        })?;
        Self::from_signing_key(identity, SigningKey::from_bytes(bytes))
    }
}

/// Supplies the credential a signing operation binds to.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Result<Credential>;
}

impl CredentialProvider for Credential {
    fn credential(&self) -> Result<Credential> {
        Ok(self.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    identity: String,
    algorithm: String,
    public_key: String,
    secret_key: String,
    created_at: DateTime<Utc>,
}

/// Credential stored as a JSON key file on disk.
#[derive(Debug, Clone)]
pub struct KeyFileCredentials {
    path: PathBuf,
}

impl KeyFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self, credential: &Credential) -> Result<()> {
        let secret = credential.secret_b64();
        let file = KeyFile {
            identity: credential.identity.clone(),
            algorithm: KEY_ALGORITHM.to_string(),
            public_key: credential.public_key_b64(),
            secret_key: secret.to_string(),
            created_at: Utc::now(),
        };
        write_json_atomic(&self.path, &file)?;
        restrict_permissions(&self.path)?;
        info!(path = %self.path.display(), identity = %credential.identity, "key file written");
        Ok(())
    }
}

impl CredentialProvider for KeyFileCredentials {
    fn credential(&self) -> Result<Credential> {
        let bytes = Zeroizing::new(fs::read(&self.path).at(&self.path)?);
        let file: KeyFile = serde_json::from_slice(&bytes).map_err(|e| {
            TrustError::Credential(format!("parse key file {}: {e}", self.path.display()))
        })?;
        let secret = Zeroizing::new(file.secret_key);
        if file.algorithm != KEY_ALGORITHM {
            return Err(TrustError::Credential(format!(
                "unsupported key algorithm {}",
                file.algorithm
            )));
        }
        let credential = Credential::from_secret_b64(file.identity, &secret)?;
        if credential.public_key_b64() != file.public_key {
            return Err(TrustError::Credential(
                "public key does not match secret key".into(),
            ));
        }
        Ok(credential)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).at(path)
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Credential held in the OS keyring, one entry per identity.
#[derive(Debug, Clone)]
pub struct KeyringCredentials {
    service: String,
    identity: String,
}

impl KeyringCredentials {
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_service(KEYRING_SERVICE, identity)
    }

    pub fn with_service(service: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            identity: identity.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, &self.identity)
            .map_err(|e| TrustError::Credential(format!("keyring init: {e}")))
    }

    pub fn store(&self, credential: &Credential) -> Result<()> {
        if credential.identity != self.identity {
            return Err(TrustError::Credential(format!(
                "credential for {} cannot be stored under {}",
                credential.identity, self.identity
            )));
        }
        self.entry()?
            .set_password(&credential.secret_b64())
            .map_err(|e| TrustError::Credential(format!("store signing key: {e}")))
    }

    pub fn delete(&self) -> Result<()> {
        self.entry()?
            .delete_password()
            .map_err(|e| TrustError::Credential(format!("delete signing key: {e}")))
    }
}

impl CredentialProvider for KeyringCredentials {
    fn credential(&self) -> Result<Credential> {
        let encoded = Zeroizing::new(
            self.entry()?
                .get_password()
                .map_err(|e| TrustError::Credential(format!("load signing key: {e}")))?,
        );
        Credential::from_secret_b64(self.identity.clone(), &encoded)
    }
}
