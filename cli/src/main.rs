//! backup - Command-line interface for the mirror engine.
//!
//! Loads the persisted backup root, optionally rewrites it interactively,
//! then mirrors the source directory into it. Every copied file is recorded
//! in `<backupRoot>/backup.log`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use mirror_engine::{
    config::DEFAULT_CONFIG_FILE,
    create_mirror,
    model::{Action, MirrorJob, MirrorOptions, MirrorReport, TreeEntry},
    prepare_destination,
    progress::ProgressCallback,
    run_mirror, ActionLog, ChecksumAlgorithm, CipherKey, Config, EngineError,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding a hex-encoded cipher key.
const KEY_ENV_VAR: &str = "BACKUP_KEY";

/// backup - mirror a directory tree into a backup root
#[derive(Parser, Debug)]
#[command(name = "backup")]
#[command(version)]
#[command(about = "Mirror a directory into the configured backup root, skipping unchanged files")]
struct Args {
    /// Source directory to back up
    #[arg(long, value_name = "PATH", default_value = ".")]
    source: PathBuf,

    /// Encrypt file contents (AES-256-CFB)
    #[arg(long)]
    encrypt: bool,

    /// Prompt for a new backup directory and save it to the configuration
    #[arg(long)]
    update_backup_dir: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Cipher key file (32 raw bytes or 64 hex characters)
    #[arg(long, value_name = "PATH")]
    key_file: Option<PathBuf>,

    /// Digest used to detect unchanged files: sha256 or blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256")]
    hash: String,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback: one line per written file, and
/// per unchanged file as well in verbose mode
struct CliProgress {
    verbose: bool,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress { verbose }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let mins = secs / 60;
        let secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{:.2}s", elapsed.as_secs_f64())
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_mirror_started(&self, job: &MirrorJob) {
        if self.verbose {
            eprintln!("Mirroring {}", job.source_path.display());
            eprintln!("  into {}", job.destination_path.display());
            if job.options.encrypt {
                eprintln!("  with encryption");
            }
        }
    }

    fn on_entry_completed(&self, _job: &MirrorJob, entry: &TreeEntry, action: Action) {
        if entry.is_dir() {
            return;
        }
        if action.wrote_file() || self.verbose {
            eprintln!("  {:>9}: {}", action, entry.relative_path.display());
        }
    }

    fn on_mirror_completed(&self, _job: &MirrorJob, report: &MirrorReport) {
        eprintln!(
            "Summary: {} copied ({} encrypted), {} unchanged, {} directories",
            report.files_copied, report.files_encrypted, report.files_skipped, report.directories
        );
        eprintln!("Bytes written: {}", Self::format_bytes(report.bytes_written));
        let elapsed = report
            .finished_at
            .duration_since(report.started_at)
            .unwrap_or_default();
        eprintln!("Elapsed: {}", Self::format_duration(elapsed));
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Parse arguments, run the backup, map failure to exit code 1
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let stdin = std::io::stdin();
    let exit_code = match run_cli(&args, &mut stdin.lock()) {
        Ok(()) => 0,
        Err(err) => {
            if let Some(engine_err) = err.downcast_ref::<EngineError>() {
                error!(
                    path = ?engine_err.path(),
                    os_error = ?engine_err.raw_os_error(),
                    "Backup failed"
                );
            }
            eprintln!("Error: {:#}", err);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, input: &mut dyn BufRead) -> Result<()> {
    let algorithm = match ChecksumAlgorithm::from_str(&args.hash) {
        Some(algorithm) => algorithm,
        None => bail!(
            "Invalid hash algorithm '{}'. Must be 'sha256' or 'blake3'",
            args.hash
        ),
    };

    let mut config = Config::load(&args.config).context("Error loading config")?;

    if args.update_backup_dir {
        config.backup_root = prompt_backup_root(input)?;
        config.save(&args.config).context("Error saving config")?;
        info!(
            config = %args.config.display(),
            backup_root = %config.backup_root.display(),
            "Backup root updated"
        );
        println!("Configuration updated successfully!");
    }

    let key = if args.encrypt {
        Some(resolve_key(args.key_file.as_deref(), &config)?)
    } else {
        None
    };

    let options = MirrorOptions {
        encrypt: args.encrypt,
        checksum_algorithm: algorithm,
    };
    let job = create_mirror(&args.source, &config.backup_root, options)
        .context("Cannot start backup")?;

    // The root gets the source root's mode before the log file lands in it.
    prepare_destination(&job).context("Cannot create backup root")?;
    let mut action_log = ActionLog::open_in(&config.backup_root).context("Cannot open backup log")?;
    debug!(log = %action_log.path().display(), "Action log opened");
    let progress = CliProgress::new(args.verbose);

    run_mirror(&job, key.as_ref(), &mut action_log, Some(&progress))
        .context("Error walking through source directory")?;

    println!("Backup completed.");
    Ok(())
}

fn prompt_backup_root(input: &mut dyn BufRead) -> Result<PathBuf> {
    println!("Enter new backup directory:");
    std::io::stdout().flush().ok();

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read backup directory")?;

    let trimmed = line.trim();
    if trimmed.is_empty() {
        bail!("Backup directory must not be empty");
    }
    Ok(PathBuf::from(trimmed))
}

fn resolve_key(key_file: Option<&Path>, config: &Config) -> Result<CipherKey> {
    resolve_key_from(key_file, std::env::var(KEY_ENV_VAR).ok(), config)
}

/// Key precedence: --key-file, then $BACKUP_KEY (hex), then the config's keyFile.
fn resolve_key_from(
    key_file: Option<&Path>,
    env_key: Option<String>,
    config: &Config,
) -> Result<CipherKey> {
    if let Some(path) = key_file {
        return CipherKey::from_file(path).context("Cannot load --key-file");
    }
    if let Some(hex) = env_key {
        return CipherKey::from_hex(&hex).with_context(|| format!("Invalid ${}", KEY_ENV_VAR));
    }
    if let Some(ref path) = config.key_file {
        return CipherKey::from_file(path).context("Cannot load keyFile from config");
    }
    bail!(
        "Encryption requested but no key given: use --key-file, ${} or keyFile in the config",
        KEY_ENV_VAR
    )
}
