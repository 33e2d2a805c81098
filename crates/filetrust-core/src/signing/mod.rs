//! File authenticity: Ed25519 signatures, embedded in scripts or detached.

pub mod credential;
pub mod embedded;
pub mod service;

pub use credential::{Credential, CredentialProvider, KeyFileCredentials, KeyringCredentials};
pub use embedded::supports_embedded;
pub use service::{
    DetachedSignature, SignatureEnvelope, SignatureRecord, SignatureService, SignatureStatus,
    VerificationOutcome,
};
