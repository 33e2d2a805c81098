//! Multi-pass overwrite-then-unlink of a single file.
//!
//! Pass patterns cycle Zeros, Ones, Random (pass 1, 2, 3, 4, ...), loosely
//! following DoD 5220.22-M. After the requested passes one extra zero pass
//! always runs, so the final on-disk state is predictable. The file is never
//! resized; every pass rewrites exactly the bytes it already occupies and is
//! synced to disk before the next pass starts. An advisory exclusive lock is
//! held on the file for the duration of the passes; a file someone else has
//! locked is refused untouched.

use crate::error::{IoResultExt, Result, TrustError};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MIN_PASSES: u32 = 1;
pub const MAX_PASSES: u32 = 35;
pub const DEFAULT_PASSES: u32 = 3;
const CHUNK_SIZE: usize = 64 * 1024;

/// Byte pattern written during one overwrite pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPattern {
    Zeros,
    Ones,
    Random,
}

impl FillPattern {
    /// Pattern for a 1-based pass number.
    pub fn for_pass(pass: u32) -> Self {
        match pass % 3 {
            1 => Self::Zeros,
            2 => Self::Ones,
            _ => Self::Random,
        }
    }

    fn fill(&self, buf: &mut [u8]) {
        match self {
            Self::Zeros => buf.fill(0x00),
            Self::Ones => buf.fill(0xFF),
            Self::Random => OsRng.fill_bytes(buf),
        }
    }
}

/// The requested passes in order, then the trailing zero pass.
#[derive(Debug, Clone)]
pub struct PassSchedule {
    requested: u32,
    next: u32,
}

impl PassSchedule {
    pub fn new(requested: u32) -> Self {
        Self { requested, next: 1 }
    }
}

impl Iterator for PassSchedule {
    type Item = FillPattern;

    fn next(&mut self) -> Option<FillPattern> {
        let pass = self.next;
        if pass > self.requested + 1 {
            return None;
        }
        self.next += 1;
        if pass <= self.requested {
            Some(FillPattern::for_pass(pass))
        } else {
            Some(FillPattern::Zeros)
        }
    }
}

/// Proof of a completed erase.
///
/// `passes` is the count the caller asked for. The trailing zero pass is
/// reported separately (`final_zero_pass`) and included in `total_overwrites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionCertificate {
    pub path: PathBuf,
    pub file_name: String,
    pub original_size: u64,
    pub passes: u32,
    pub final_zero_pass: bool,
    pub total_overwrites: u32,
    pub standard_name: String,
    pub deletion_date: DateTime<Utc>,
    /// `None` unless verification was requested.
    pub verified_deleted: Option<bool>,
}

/// Name of the overwrite convention a pass count corresponds to.
pub fn standard_name(passes: u32) -> String {
    match passes {
        1 => "Single pass".to_string(),
        3 => "DoD 5220.22-M".to_string(),
        7 => "DoD 5220.22-M ECE".to_string(),
        35 => "Gutmann".to_string(),
        n => format!("Custom ({n} passes)"),
    }
}

#[derive(Debug, Clone)]
pub struct SecureEraser {
    chunk_size: usize,
}

impl Default for SecureEraser {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureEraser {
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Overwrite `path` `passes` times (plus the final zero pass) and unlink it.
    ///
    /// With `verify`, a path that still resolves after unlinking yields a
    /// certificate with `verified_deleted == Some(false)` instead of an error;
    /// external locks can keep a name alive and that is not this call's fault.
    pub fn erase(&self, path: &Path, passes: u32, verify: bool) -> Result<DeletionCertificate> {
        if !(MIN_PASSES..=MAX_PASSES).contains(&passes) {
            return Err(TrustError::InvalidArgument(format!(
                "pass count {passes} outside {MIN_PASSES}..={MAX_PASSES}"
            )));
        }
        let metadata = fs::symlink_metadata(path).at(path)?;
        if metadata.is_dir() {
            return Err(TrustError::IsDirectory(path.to_path_buf()));
        }
        if metadata.file_type().is_symlink() {
            return Err(TrustError::InvalidArgument(format!(
                "refusing to erase through a symlink: {}",
                path.display()
            )));
        }

        let original_size = metadata.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if metadata.permissions().readonly() {
            make_writable(path, metadata.permissions())?;
        }

        {
            let mut file = OpenOptions::new().write(true).open(path).at(path)?;
            if let Err(e) = FileExt::try_lock_exclusive(&file) {
                warn!(path = %path.display(), error = %e, "file is locked elsewhere, not erasing");
                return Err(TrustError::io(path, e));
            }
            let mut buf = vec![0u8; self.chunk_size];
            for (index, pattern) in PassSchedule::new(passes).enumerate() {
                self.overwrite(&mut file, original_size, pattern, &mut buf)
                    .at(path)?;
                debug!(path = %path.display(), pass = index + 1, ?pattern, "overwrite pass complete");
            }
            // lock released when `file` drops, before the unlink
        }

        unlink_obscured(path)?;

        let verified_deleted = if verify {
            let gone = fs::symlink_metadata(path).is_err();
            if !gone {
                warn!(path = %path.display(), "path still resolves after erase");
            }
            Some(gone)
        } else {
            None
        };

        info!(
            path = %path.display(),
            bytes = original_size,
            passes,
            "file securely erased"
        );

        Ok(DeletionCertificate {
            path: path.to_path_buf(),
            file_name,
            original_size,
            passes,
            final_zero_pass: true,
            total_overwrites: passes + 1,
            standard_name: standard_name(passes),
            deletion_date: Utc::now(),
            verified_deleted,
        })
    }

    /// Like [`erase`](Self::erase) with verification, but a name that
    /// survives the unlink is an error.
    pub fn erase_verified(&self, path: &Path, passes: u32) -> Result<DeletionCertificate> {
        let certificate = self.erase(path, passes, true)?;
        if certificate.verified_deleted == Some(false) {
            return Err(TrustError::VerificationFailed(path.to_path_buf()));
        }
        Ok(certificate)
    }

    fn overwrite(
        &self,
        file: &mut File,
        len: u64,
        pattern: FillPattern,
        buf: &mut [u8],
    ) -> std::io::Result<()> {
        // one random draw per pass, reused for every chunk of that pass
        pattern.fill(buf);
        file.seek(SeekFrom::Start(0))?;
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        file.flush()?;
        file.sync_all()
    }
}

#[cfg(unix)]
fn make_writable(path: &Path, mut perms: fs::Permissions) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(perms.mode() | 0o200);
    fs::set_permissions(path, perms).at(path)
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path, mut perms: fs::Permissions) -> Result<()> {
    perms.set_readonly(false);
    fs::set_permissions(path, perms).at(path)
}

/// Rename to a random sibling name first so the original file name does not
/// linger in the directory entry, then unlink.
fn unlink_obscured(path: &Path) -> Result<()> {
    let mut token = [0u8; 12];
    OsRng.fill_bytes(&mut token);
    let scrambled = path.with_file_name(hex::encode(token));
    match fs::rename(path, &scrambled) {
        Ok(()) => fs::remove_file(&scrambled).at(&scrambled),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "rename before unlink failed");
            fs::remove_file(path).at(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn pattern_cycles_by_pass_number() {
        assert_eq!(FillPattern::for_pass(1), FillPattern::Zeros);
        assert_eq!(FillPattern::for_pass(2), FillPattern::Ones);
        assert_eq!(FillPattern::for_pass(3), FillPattern::Random);
        assert_eq!(FillPattern::for_pass(4), FillPattern::Zeros);
        assert_eq!(FillPattern::for_pass(35), FillPattern::Ones);
    }

    #[test]
    fn schedule_appends_final_zero_pass() {
        let schedule: Vec<_> = PassSchedule::new(3).collect();
        assert_eq!(
            schedule,
            vec![
                FillPattern::Zeros,
                FillPattern::Ones,
                FillPattern::Random,
                FillPattern::Zeros
            ]
        );
        assert_eq!(PassSchedule::new(1).count(), 2);
        assert_eq!(PassSchedule::new(35).count(), 36);
    }

    #[test]
    fn overwrite_keeps_length_and_ends_zeroed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("victim.bin");
        let data = vec![0xABu8; CHUNK_SIZE * 2 + 5];
        fs::write(&path, &data).unwrap();

        let eraser = SecureEraser::new();
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        let mut buf = vec![0u8; CHUNK_SIZE];
        for pattern in PassSchedule::new(2) {
            eraser
                .overwrite(&mut file, data.len() as u64, pattern, &mut buf)
                .unwrap();
        }
        drop(file);

        let mut after = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut after).unwrap();
        assert_eq!(after.len(), data.len());
        assert!(after.iter().all(|b| *b == 0));
    }

    #[test]
    fn erase_removes_file_and_reports_requested_passes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        fs::write(&path, b"top secret content").unwrap();

        let cert = SecureEraser::new().erase(&path, 7, true).unwrap();
        assert!(!path.exists());
        assert_eq!(cert.passes, 7);
        assert_eq!(cert.total_overwrites, 8);
        assert!(cert.final_zero_pass);
        assert_eq!(cert.original_size, 18);
        assert_eq!(cert.file_name, "secret.txt");
        assert_eq!(cert.standard_name, "DoD 5220.22-M ECE");
        assert_eq!(cert.verified_deleted, Some(true));
        // no scrambled leftovers
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn verification_is_null_unless_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, b"x").unwrap();
        let cert = SecureEraser::new().erase(&path, 1, false).unwrap();
        assert_eq!(cert.verified_deleted, None);
    }

    #[test]
    fn empty_file_is_erased() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        let cert = SecureEraser::new().erase(&path, 3, true).unwrap();
        assert_eq!(cert.original_size, 0);
        assert!(!path.exists());
    }

    #[test]
    fn read_only_file_is_erased() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.txt");
        fs::write(&path, b"locked").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        SecureEraser::new().erase(&path, 1, true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn locked_file_is_left_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in-use.db");
        fs::write(&path, b"still needed").unwrap();

        let holder = File::open(&path).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();
        let err = SecureEraser::new().erase(&path, 3, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(fs::read(&path).unwrap(), b"still needed");

        drop(holder);
        SecureEraser::new().erase(&path, 3, true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn rejects_bad_pass_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, b"x").unwrap();
        for passes in [0, 36] {
            let err = SecureEraser::new().erase(&path, passes, false).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert!(path.exists());
    }

    #[test]
    fn missing_and_directory_targets() {
        let dir = tempdir().unwrap();
        let eraser = SecureEraser::new();
        assert_eq!(
            eraser.erase(&dir.path().join("nope"), 3, false).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            eraser.erase(dir.path(), 3, false).unwrap_err().kind(),
            ErrorKind::IsDirectory
        );
    }

    #[test]
    fn standard_names() {
        assert_eq!(standard_name(1), "Single pass");
        assert_eq!(standard_name(3), "DoD 5220.22-M");
        assert_eq!(standard_name(35), "Gutmann");
        assert_eq!(standard_name(5), "Custom (5 passes)");
    }
}
