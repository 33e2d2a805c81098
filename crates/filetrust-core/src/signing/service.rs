use crate::error::{require_file, IoResultExt, Result, TrustError};
use crate::hash::{digest_bytes, digest_file, DigestAlgorithm};
use crate::signing::credential::{Credential, KEY_ALGORITHM};
use crate::signing::embedded::{self, Block};
use crate::util::{with_appended_extension, write_atomic, write_json_atomic};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SIGNATURE_EXTENSION: &str = "sig";
pub const ENVELOPE_VERSION: u32 = 1;

const DOMAIN_TAG: &[u8] = b"filetrust-signature-v1\0";

/// Serialized form of one signature, detached or embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    pub version: u32,
    pub algorithm: String,
    pub signer: String,
    pub public_key: String,
    pub signature: String,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    pub subject_file_path: PathBuf,
    pub artifact_path: PathBuf,
    pub signature_bytes: Vec<u8>,
    pub signer_identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureRecord {
    Embedded {
        path: PathBuf,
        signer_identity: String,
    },
    Detached(DetachedSignature),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub path: PathBuf,
    pub is_valid: bool,
    pub signer_identity: Option<String>,
    pub status: SignatureStatus,
    pub embedded: bool,
    pub reason: Option<String>,
}

impl VerificationOutcome {
    fn valid(path: &Path, signer: String, embedded: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            is_valid: true,
            signer_identity: Some(signer),
            status: SignatureStatus::Valid,
            embedded,
            reason: None,
        }
    }

    fn invalid(path: &Path, signer: Option<String>, embedded: bool, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            is_valid: false,
            signer_identity: signer,
            status: SignatureStatus::Invalid,
            embedded,
            reason: Some(reason.into()),
        }
    }
}

/// Signs files and checks their signatures.
///
/// Script formats listed in [`embedded::EMBEDDABLE_EXTENSIONS`] carry their
/// signature inline; everything else gets a `<file>.sig` sibling. Signatures
/// are checked against the public key inside the envelope. Whether that key
/// belongs to a trusted signer is the caller's question.
#[derive(Debug, Clone, Default)]
pub struct SignatureService;

impl SignatureService {
    pub fn new() -> Self {
        Self
    }

    pub fn signature_path(&self, path: &Path) -> PathBuf {
        with_appended_extension(path, SIGNATURE_EXTENSION)
    }

    pub fn sign(&self, path: &Path, credential: &Credential) -> Result<SignatureRecord> {
        require_file(path)?;
        if embedded::supports_embedded(path) {
            self.sign_embedded(path, credential)
        } else {
            self.sign_detached(path, credential)
        }
    }

    fn sign_embedded(&self, path: &Path, credential: &Credential) -> Result<SignatureRecord> {
        let content = fs::read(path).at(path)?;
        let body = embedded::normalize_body(embedded::extract(&content).body(&content));
        let content_hash = digest_bytes(&body, DigestAlgorithm::Sha256);
        let (envelope, _) = seal_envelope(credential, &content_hash);
        let encoded = serde_json::to_vec(&envelope)
            .map_err(|e| TrustError::InvalidArgument(format!("encode envelope: {e}")))?;
        let signed = embedded::attach(&body, &general_purpose::STANDARD.encode(encoded));
        write_atomic(path, &signed)?;
        info!(path = %path.display(), signer = %credential.identity(), "embedded signature written");
        Ok(SignatureRecord::Embedded {
            path: path.to_path_buf(),
            signer_identity: credential.identity().to_string(),
        })
    }

    fn sign_detached(&self, path: &Path, credential: &Credential) -> Result<SignatureRecord> {
        let content_hash = digest_file(path, DigestAlgorithm::Sha256)?;
        let (envelope, signature) = seal_envelope(credential, &content_hash);
        let artifact = self.signature_path(path);
        write_json_atomic(&artifact, &envelope)?;
        info!(
            path = %path.display(),
            artifact = %artifact.display(),
            signer = %credential.identity(),
            "detached signature written"
        );
        Ok(SignatureRecord::Detached(DetachedSignature {
            subject_file_path: path.to_path_buf(),
            artifact_path: artifact,
            signature_bytes: signature.to_bytes().to_vec(),
            signer_identity: credential.identity().to_string(),
        }))
    }

    /// Any mismatch is reported as `Invalid`; only a missing signature or an
    /// unreadable subject is an error.
    pub fn verify(&self, path: &Path) -> Result<VerificationOutcome> {
        require_file(path)?;
        let outcome = if embedded::supports_embedded(path) {
            self.verify_embedded(path)?
        } else {
            self.verify_detached(path)?
        };
        match &outcome.reason {
            None => info!(path = %path.display(), signer = ?outcome.signer_identity, "signature valid"),
            Some(reason) => warn!(path = %path.display(), %reason, "signature invalid"),
        }
        Ok(outcome)
    }

    fn verify_embedded(&self, path: &Path) -> Result<VerificationOutcome> {
        let content = fs::read(path).at(path)?;
        let (body, payload) = match embedded::extract(&content) {
            Block::Absent => return Err(TrustError::NoSignature(path.to_path_buf())),
            Block::Broken { reason, .. } => {
                return Ok(VerificationOutcome::invalid(path, None, true, reason))
            }
            Block::Present { body, payload } => (body, payload),
        };
        let envelope = match general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_slice::<SignatureEnvelope>(&raw).map_err(|e| e.to_string()))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                return Ok(VerificationOutcome::invalid(
                    path,
                    None,
                    true,
                    format!("malformed signature block: {e}"),
                ))
            }
        };
        let content_hash = digest_bytes(body, DigestAlgorithm::Sha256);
        Ok(check_envelope(path, &envelope, &content_hash, true))
    }

    fn verify_detached(&self, path: &Path) -> Result<VerificationOutcome> {
        let artifact = self.signature_path(path);
        let raw = match fs::read(&artifact) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrustError::NoSignature(path.to_path_buf()))
            }
            Err(e) => return Err(TrustError::io(&artifact, e)),
        };
        let envelope: SignatureEnvelope = match serde_json::from_slice(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Ok(VerificationOutcome::invalid(
                    path,
                    None,
                    false,
                    format!("malformed signature file: {e}"),
                ))
            }
        };
        let content_hash = digest_file(path, DigestAlgorithm::Sha256)?;
        Ok(check_envelope(path, &envelope, &content_hash, false))
    }

    /// Like [`verify`](Self::verify), but an invalid signature is an error.
    pub fn ensure_valid(&self, path: &Path) -> Result<VerificationOutcome> {
        let outcome = self.verify(path)?;
        if let Some(reason) = &outcome.reason {
            return Err(TrustError::SignatureInvalid {
                path: path.to_path_buf(),
                reason: reason.clone(),
            });
        }
        Ok(outcome)
    }
}

/// `tag || len(identity) || identity || sha256(content)`
fn signed_message(identity: &str, content_hash: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_TAG.len() + 4 + identity.len() + content_hash.len());
    message.extend_from_slice(DOMAIN_TAG);
    message.extend_from_slice(&(identity.len() as u32).to_be_bytes());
    message.extend_from_slice(identity.as_bytes());
    message.extend_from_slice(content_hash.as_bytes());
    message
}

fn seal_envelope(credential: &Credential, content_hash: &str) -> (SignatureEnvelope, Signature) {
    let signature = credential.sign(&signed_message(credential.identity(), content_hash));
    let envelope = SignatureEnvelope {
        version: ENVELOPE_VERSION,
        algorithm: KEY_ALGORITHM.to_string(),
        signer: credential.identity().to_string(),
        public_key: credential.public_key_b64(),
        signature: general_purpose::STANDARD.encode(signature.to_bytes()),
        signed_at: Utc::now(),
    };
    (envelope, signature)
}

fn check_envelope(
    path: &Path,
    envelope: &SignatureEnvelope,
    content_hash: &str,
    embedded: bool,
) -> VerificationOutcome {
    let signer = Some(envelope.signer.clone());
    match check_signature(envelope, content_hash) {
        Ok(()) => VerificationOutcome::valid(path, envelope.signer.clone(), embedded),
        Err(reason) => VerificationOutcome::invalid(path, signer, embedded, reason),
    }
}

fn check_signature(envelope: &SignatureEnvelope, content_hash: &str) -> std::result::Result<(), String> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(format!("unsupported envelope version {}", envelope.version));
    }
    if envelope.algorithm != KEY_ALGORITHM {
        return Err(format!("unsupported algorithm {}", envelope.algorithm));
    }
    let public = general_purpose::STANDARD
        .decode(&envelope.public_key)
        .map_err(|e| format!("decode public key: {e}"))?;
    let public: [u8; PUBLIC_KEY_LENGTH] = public
        .as_slice()
        .try_into()
        .map_err(|_| format!("public key must be {PUBLIC_KEY_LENGTH} bytes"))?;
    let key = VerifyingKey::from_bytes(&public).map_err(|e| format!("bad public key: {e}"))?;

    let sig = general_purpose::STANDARD
        .decode(&envelope.signature)
        .map_err(|e| format!("decode signature: {e}"))?;
    let sig: [u8; SIGNATURE_LENGTH] = sig
        .as_slice()
        .try_into()
        .map_err(|_| format!("signature must be {SIGNATURE_LENGTH} bytes"))?;
    let sig = Signature::from_bytes(&sig);

    key.verify_strict(&signed_message(&envelope.signer, content_hash), &sig)
        .map_err(|_| "signature does not match file content".to_string())
}
