//! FileTrust core: integrity baselines, secure erase, password-based file
//! encryption and file signatures.
//!
//! The four public entry points are independent of each other:
//! [`IntegrityMonitor`], [`SecureEraser`], [`CryptoBox`] and
//! [`SignatureService`]. All of them block the calling thread.

pub mod crypto;
pub mod eraser;
pub mod error;
pub mod hash;
pub mod integrity;
pub mod paths;
pub mod settings;
pub mod signing;
pub mod util;

pub use crypto::CryptoBox;
pub use eraser::{DeletionCertificate, FillPattern, SecureEraser};
pub use error::{ErrorKind, Result, TrustError};
pub use hash::DigestAlgorithm;
pub use integrity::{
    BaselineStore, FsBaselineStore, IntegrityMonitor, IntegrityReport, MemoryBaselineStore,
    ModificationRecord, ModificationStatus,
};
pub use settings::TrustSettings;
pub use signing::{Credential, CredentialProvider, SignatureService, VerificationOutcome};
