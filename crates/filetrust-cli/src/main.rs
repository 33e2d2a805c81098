mod secret;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use filetrust_core::crypto::CryptoBox;
use filetrust_core::eraser::SecureEraser;
use filetrust_core::hash::{digest_file, DigestAlgorithm};
use filetrust_core::integrity::{FsBaselineStore, IntegrityMonitor};
use filetrust_core::paths;
use filetrust_core::settings::{load_settings, TrustSettings};
use filetrust_core::signing::{
    Credential, CredentialProvider, KeyFileCredentials, KeyringCredentials, SignatureService,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FileTrust file protection toolkit", long_about = None)]
struct Cli {
    /// Directory for baselines and settings (overrides FILETRUST_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace); RUST_LOG wins if set
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the digest of a single file
    Hash {
        path: PathBuf,
        #[arg(long)]
        algorithm: Option<DigestAlgorithm>,
    },
    /// Create or replace the integrity baseline for a file or directory
    Baseline {
        path: PathBuf,
        #[arg(long)]
        algorithm: Option<DigestAlgorithm>,
        /// Only direct children of a directory
        #[arg(long)]
        no_recurse: bool,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Check a baselined path; exits 1 when anything changed
    Verify { path: PathBuf },
    /// Drop the baseline for a path
    Forget { path: PathBuf },
    /// Overwrite a file several times, then delete it
    Erase {
        path: PathBuf,
        #[arg(long)]
        passes: Option<u32>,
        /// Skip the post-deletion existence check
        #[arg(long)]
        no_verify: bool,
    },
    /// Encrypt a file with a password
    Protect {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Securely erase the plaintext after encrypting
        #[arg(long)]
        shred_source: bool,
    },
    /// Decrypt a file produced by `protect`
    Unprotect {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a signing key file
    Keygen {
        out: PathBuf,
        #[arg(long)]
        identity: String,
        /// Also store the key in the OS keyring
        #[arg(long)]
        keyring: bool,
    },
    /// Sign a file (embedded for scripts, `<file>.sig` otherwise)
    Sign {
        path: PathBuf,
        /// Key file; defaults to the one in settings
        #[arg(long, conflicts_with = "keyring_identity")]
        key: Option<PathBuf>,
        /// Load the key from the OS keyring entry for this identity
        #[arg(long)]
        keyring_identity: Option<String>,
    },
    /// Check a file's signature; exits 1 when invalid
    CheckSignature { path: PathBuf },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Session {
    data_dir: PathBuf,
    settings: TrustSettings,
}

impl Session {
    fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => paths::data_dir().context("resolve data directory")?,
        };
        let settings_path = paths::settings_path_in(&data_dir);
        let settings = load_settings(&settings_path)
            .with_context(|| format!("load settings from {}", settings_path.display()))?;
        debug!(data_dir = %data_dir.display(), "settings loaded");
        Ok(Self { data_dir, settings })
    }

    fn monitor(&self, workers: Option<usize>) -> Result<IntegrityMonitor> {
        let store = FsBaselineStore::new(paths::baselines_dir_in(&self.data_dir));
        let workers = workers.unwrap_or(self.settings.integrity.workers);
        Ok(IntegrityMonitor::with_workers(Arc::new(store), workers)?)
    }

    fn crypto_box(&self) -> CryptoBox {
        CryptoBox::with_extension(self.settings.crypto.encrypted_extension.clone())
    }

    fn signing_credential(
        &self,
        key: Option<PathBuf>,
        keyring_identity: Option<String>,
    ) -> Result<Credential> {
        if let Some(identity) = keyring_identity {
            return Ok(KeyringCredentials::new(identity).credential()?);
        }
        let key = key
            .or_else(|| self.settings.signing.key_file.clone())
            .ok_or_else(|| anyhow!("no signing key: pass --key or --keyring-identity"))?;
        KeyFileCredentials::new(&key)
            .credential()
            .with_context(|| format!("load key file {}", key.display()))
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ctx = Session::load(cli.data_dir)?;

    match cli.command {
        Commands::Hash { path, algorithm } => {
            let algorithm = algorithm.unwrap_or(ctx.settings.integrity.algorithm);
            let digest = digest_file(&path, algorithm)?;
            print_json(&json!({ "path": path, "algorithm": algorithm, "hash": digest }))?;
        }
        Commands::Baseline {
            path,
            algorithm,
            no_recurse,
            workers,
        } => {
            let monitor = ctx.monitor(workers)?;
            let algorithm = algorithm.unwrap_or(ctx.settings.integrity.algorithm);
            let recurse = ctx.settings.integrity.recurse && !no_recurse;
            let report = monitor.enable(&path, algorithm, recurse)?;
            print_json(&report)?;
        }
        Commands::Verify { path } => {
            let report = ctx.monitor(None)?.verify(&path)?;
            print_json(&report)?;
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Forget { path } => {
            let removed = ctx.monitor(None)?.disable(&path)?;
            print_json(&json!({ "path": path, "removed": removed }))?;
        }
        Commands::Erase {
            path,
            passes,
            no_verify,
        } => {
            let passes = passes.unwrap_or(ctx.settings.eraser.passes);
            let verify = ctx.settings.eraser.verify && !no_verify;
            let certificate = SecureEraser::new().erase(&path, passes, verify)?;
            print_json(&certificate)?;
            if certificate.verified_deleted == Some(false) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Protect {
            path,
            output,
            shred_source,
        } => {
            let password = secret::read_password(true)?;
            let cb = ctx.crypto_box();
            let output = output.unwrap_or_else(|| cb.encrypted_path(&path));
            let written = cb.protect_to(&path, &output, password)?;
            let shredded = if shred_source {
                Some(shred(&path, &ctx.settings)?)
            } else {
                None
            };
            print_json(&json!({ "source": path, "output": written, "shredded": shredded }))?;
        }
        Commands::Unprotect { path, output } => {
            let password = secret::read_password(false)?;
            let cb = ctx.crypto_box();
            let output = output.unwrap_or_else(|| cb.decrypted_path(&path));
            let written = cb.unprotect_to(&path, &output, password)?;
            print_json(&json!({ "source": path, "output": written }))?;
        }
        Commands::Keygen {
            out,
            identity,
            keyring,
        } => {
            let credential = Credential::generate(identity)?;
            KeyFileCredentials::new(&out).store(&credential)?;
            if keyring {
                KeyringCredentials::new(credential.identity()).store(&credential)?;
                info!(identity = %credential.identity(), "key stored in OS keyring");
            }
            print_json(&json!({
                "identity": credential.identity(),
                "public_key": credential.public_key_b64(),
                "key_file": out,
            }))?;
        }
        Commands::Sign {
            path,
            key,
            keyring_identity,
        } => {
            let credential = ctx.signing_credential(key, keyring_identity)?;
            let record = SignatureService::new().sign(&path, &credential)?;
            print_json(&record)?;
        }
        Commands::CheckSignature { path } => {
            let outcome = SignatureService::new().verify(&path)?;
            print_json(&outcome)?;
            if !outcome.is_valid {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn shred(path: &Path, settings: &TrustSettings) -> Result<filetrust_core::DeletionCertificate> {
    let certificate = SecureEraser::new()
        .erase_verified(path, settings.eraser.passes)
        .with_context(|| format!("erase plaintext {}", path.display()))?;
    Ok(certificate)
}
