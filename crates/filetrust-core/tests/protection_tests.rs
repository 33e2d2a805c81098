//! Integration tests for the single-file operations.
//!
//! Tests cover:
//!  1. Encryption round-trip over assorted contents
//!  2. Wrong password fails with DecryptionFailed and writes nothing
//!  3. Container layout (salt, iv, block-aligned ciphertext)
//!  4. Erase with verification removes the path
//!  5. Erase pass accounting
//!  6. Signature tamper sensitivity (detached and embedded)
//!  7. Signing with a credential loaded from a key file

use filetrust_core::crypto::{CryptoBox, BLOCK_LEN, HEADER_LEN};
use filetrust_core::eraser::{SecureEraser, DEFAULT_PASSES};
use filetrust_core::signing::{
    Credential, CredentialProvider, KeyFileCredentials, SignatureRecord, SignatureService,
};
use filetrust_core::ErrorKind;
use std::fs;
use tempfile::tempdir;
use zeroize::Zeroizing;

fn password(s: &str) -> Zeroizing<String> {
    Zeroizing::new(s.to_string())
}

// ─── Test 1: encryption round-trip ──────────────────────────────────────────

#[test]
fn test_protect_unprotect_round_trip() {
    let dir = tempdir().unwrap();
    let cb = CryptoBox::new();
    let contents: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"x".to_vec(),
        vec![0xAB; 16],
        (0..=255u8).cycle().take(100_003).collect(),
    ];

    for (i, content) in contents.iter().enumerate() {
        let src = dir.path().join(format!("plain{i}.bin"));
        fs::write(&src, content).unwrap();

        let enc = cb.protect(&src, password("correct horse")).unwrap();
        assert_eq!(enc, dir.path().join(format!("plain{i}.bin.enc")));
        assert_eq!(fs::read(&src).unwrap(), *content, "source must be untouched");

        fs::remove_file(&src).unwrap();
        let dec = cb.unprotect(&enc, password("correct horse")).unwrap();
        assert_eq!(dec, src);
        assert_eq!(fs::read(&dec).unwrap(), *content);
    }
}

// ─── Test 2: wrong password ─────────────────────────────────────────────────

#[test]
fn test_wrong_password_fails_cleanly() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("secret.txt");
    fs::write(&src, b"the launch codes").unwrap();
    let cb = CryptoBox::new();
    let enc = cb.protect(&src, password("pw1")).unwrap();
    let out = dir.path().join("out.txt");

    for wrong in ["pw2", "PW1", "pw1 ", "a much longer and entirely different password"] {
        let err = cb.unprotect_to(&enc, &out, password(wrong)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed, "password {wrong:?}");
        assert!(!out.exists());
    }
}

// ─── Test 3: container layout ───────────────────────────────────────────────

#[test]
fn test_container_layout() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("doc.txt");
    fs::write(&src, vec![7u8; 1000]).unwrap();
    let enc = CryptoBox::new().protect(&src, password("pw")).unwrap();

    let container = fs::read(&enc).unwrap();
    assert!(container.len() >= HEADER_LEN);
    assert_eq!((container.len() - HEADER_LEN) % BLOCK_LEN, 0);
    assert!(container.len() > 1000 + HEADER_LEN);
}

#[test]
fn test_unprotect_rejects_directory_and_missing() {
    let dir = tempdir().unwrap();
    let cb = CryptoBox::new();
    assert_eq!(
        cb.unprotect(dir.path(), password("pw")).unwrap_err().kind(),
        ErrorKind::IsDirectory
    );
    assert_eq!(
        cb.protect(&dir.path().join("missing"), password("pw")).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// ─── Test 4: erase ──────────────────────────────────────────────────────────

#[test]
fn test_erase_verified_removes_path() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("shred-me.db");
    fs::write(&target, vec![0x5A; 200_000]).unwrap();

    let cert = SecureEraser::new().erase(&target, DEFAULT_PASSES, true).unwrap();
    assert_eq!(cert.verified_deleted, Some(true));
    assert!(!target.exists());
    assert_eq!(cert.original_size, 200_000);
    assert_eq!(cert.file_name, "shred-me.db");
    // nothing left behind under a random name either
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ─── Test 5: pass accounting ────────────────────────────────────────────────

#[test]
fn test_erase_reports_requested_passes_plus_final_zero() {
    let dir = tempdir().unwrap();
    for passes in [1u32, 3, 7] {
        let target = dir.path().join(format!("f{passes}"));
        fs::write(&target, b"data").unwrap();
        let cert = SecureEraser::new().erase(&target, passes, false).unwrap();
        assert_eq!(cert.passes, passes);
        assert!(cert.final_zero_pass);
        assert_eq!(cert.total_overwrites, passes + 1);
        assert_eq!(cert.verified_deleted, None);
    }
}

#[test]
fn test_erase_out_of_range_passes_leaves_file() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("keep");
    fs::write(&target, b"data").unwrap();
    for passes in [0u32, 36] {
        let err = SecureEraser::new().erase(&target, passes, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(fs::read(&target).unwrap(), b"data");
}

// ─── Test 6: signature tamper sensitivity ───────────────────────────────────

#[test]
fn test_detached_signature_tamper_sensitivity() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("release.tar");
    let original: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    fs::write(&file, &original).unwrap();
    let service = SignatureService::new();
    let cred = Credential::generate("builds@example.org").unwrap();

    service.sign(&file, &cred).unwrap();
    assert!(service.verify(&file).unwrap().is_valid);
    let artifact_before = fs::read(service.signature_path(&file)).unwrap();

    for index in [0usize, 2048, 4095] {
        let mut mutated = original.clone();
        mutated[index] ^= 0x01;
        fs::write(&file, &mutated).unwrap();
        let outcome = service.verify(&file).unwrap();
        assert!(!outcome.is_valid, "byte {index}");
    }

    fs::write(&file, &original).unwrap();
    assert!(service.verify(&file).unwrap().is_valid);
    // verification never rewrites the artifact
    assert_eq!(fs::read(service.signature_path(&file)).unwrap(), artifact_before);
}

#[test]
fn test_embedded_signature_tamper_sensitivity() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("Install.ps1");
    fs::write(&script, b"Write-Host 'installing'\r\nExit 0\r\n").unwrap();
    let service = SignatureService::new();
    let cred = Credential::generate("ops").unwrap();

    let record = service.sign(&script, &cred).unwrap();
    assert_eq!(
        record,
        SignatureRecord::Embedded {
            path: script.clone(),
            signer_identity: "ops".into()
        }
    );
    assert!(service.verify(&script).unwrap().is_valid);

    let signed = fs::read(&script).unwrap();
    let mut mutated = signed.clone();
    mutated[0] = b'w';
    fs::write(&script, &mutated).unwrap();
    assert!(!service.verify(&script).unwrap().is_valid);
}

// ─── Test 7: key file credentials ───────────────────────────────────────────

#[test]
fn test_sign_with_key_file_credential() {
    let dir = tempdir().unwrap();
    let provider = KeyFileCredentials::new(dir.path().join("signer.json"));
    provider.store(&Credential::generate("qa-team").unwrap()).unwrap();

    let file = dir.path().join("report.csv");
    fs::write(&file, b"id,result\n1,pass\n").unwrap();
    let service = SignatureService::new();
    service.sign(&file, &provider.credential().unwrap()).unwrap();

    let outcome = service.ensure_valid(&file).unwrap();
    assert_eq!(outcome.signer_identity.as_deref(), Some("qa-team"));
}
