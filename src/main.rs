//! ruleweave CLI
//!
//! Entry point for the `ruleweave` command-line tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use ruleweave::config::{repo_config_path, user_config_path};
use ruleweave::{EffectiveConfig, OverlayStatus, SyncEngine, SyncError, SyncOptions};
use ruleweave_canon::{seal_document, verify_integrity, DocumentError, IntegrityStatus};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "ruleweave")]
#[command(about = "Keep one canonical rule set in sync across assistant formats", version)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log at debug level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve sources and export every configured format
    Sync {
        /// Use cached git checkouts only
        #[arg(long)]
        offline: bool,

        /// Refetch git sources even when the cache is fresh
        #[arg(long)]
        force_refresh: bool,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Downgrade integrity failures to warnings
        #[arg(long)]
        allow_integrity_bypass: bool,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare the current bundle against .ruleweave/lock.json
    Check {
        #[arg(long)]
        offline: bool,
    },

    /// Compute (or write) the integrity digest of a rule document
    Hash {
        /// JSON or YAML rule document
        file: PathBuf,

        /// Write the sealed document back to the file
        #[arg(long)]
        write: bool,
    },

    /// Show whether each configured overlay still matches
    Overlays {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Sync {
            offline,
            force_refresh,
            dry_run,
            allow_integrity_bypass,
            json,
        } => {
            let mut options = SyncOptions::new(&cli.root);
            options.offline = offline;
            options.force_refresh = force_refresh;
            options.dry_run = dry_run;
            options.allow_integrity_bypass = allow_integrity_bypass;
            run_sync(&options, json)
        }
        Commands::Check { offline } => {
            let mut options = SyncOptions::new(&cli.root);
            options.offline = offline;
            run_check(&options)
        }
        Commands::Hash { file, write } => run_hash(&file, write),
        Commands::Overlays { json } => run_overlays(&SyncOptions::new(&cli.root), json),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn load_engine(root: &Path) -> Result<SyncEngine, SyncError> {
    let user = user_config_path();
    let repo = repo_config_path(root);
    let effective = EffectiveConfig::build(user.as_deref(), Some(&repo), None)?;
    for source in &effective.sources {
        if let Some(path) = &source.path {
            log::debug!("config layer {:?}: {}", source.origin, path);
        }
    }
    Ok(SyncEngine::for_project(effective.typed()?, root))
}

fn run_sync(options: &SyncOptions, json: bool) -> Result<(), SyncError> {
    let engine = load_engine(&options.root)?;
    let report = engine.run(options)?;

    if json {
        println!("{}", to_json(&report)?);
        return Ok(());
    }

    let verb = if report.dry_run { "would write" } else { "wrote" };
    println!("mode: {}  bundle: {}", report.mode, short(&report.bundle_hash));
    for export in &report.exports {
        println!(
            "  {:<12} {} {}, {} unchanged, {} removed",
            export.format,
            verb,
            export.files_written.len(),
            export.files_unchanged.len(),
            export.files_removed.len()
        );
        for path in &export.files_written {
            println!("    {}", path.display());
        }
    }
    if report.lockfile_written {
        println!("  lockfile updated");
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

fn run_check(options: &SyncOptions) -> Result<(), SyncError> {
    let engine = load_engine(&options.root)?;
    let report = engine.check(options)?;
    println!("lockfile matches (bundle {})", short(&report.bundle_hash));
    Ok(())
}

fn run_hash(file: &Path, write: bool) -> Result<(), SyncError> {
    let io_err = |source: std::io::Error| SyncError::Io {
        path: file.to_path_buf(),
        source,
    };
    let text = fs::read_to_string(file).map_err(io_err)?;
    let yaml = matches!(
        file.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let document: Value = if yaml {
        serde_yaml::from_str(&text).map_err(|e| parse_error(file, e))?
    } else {
        serde_json::from_str(&text).map_err(|e| parse_error(file, e))?
    };

    if !write {
        let status = verify_integrity(&document)?;
        match &status {
            IntegrityStatus::Verified { digest } => println!("{}  verified", digest),
            IntegrityStatus::Mismatch { stored, computed } => {
                println!("{}  mismatch (stored {})", computed, stored)
            }
            other => match other.computed() {
                Some(computed) => println!("{}", computed),
                None => println!("integrity algorithm not supported"),
            },
        }
        return Ok(());
    }

    let sealed = seal_document(&document)?;
    let output = if yaml {
        serde_yaml::to_string(&sealed).map_err(|e| parse_error(file, e))?
    } else {
        format!("{}\n", to_json(&sealed)?)
    };
    fs::write(file, output).map_err(io_err)?;
    if let Some(digest) = sealed.pointer("/integrity/value").and_then(Value::as_str) {
        println!("{}  written", digest);
    }
    Ok(())
}

fn run_overlays(options: &SyncOptions, json: bool) -> Result<(), SyncError> {
    let engine = load_engine(&options.root)?;
    let health = engine.overlays(options)?;

    if json {
        println!("{}", to_json(&health)?);
        return Ok(());
    }
    if health.is_empty() {
        println!("no overlays configured");
        return Ok(());
    }
    for entry in &health {
        let status = match entry.status {
            OverlayStatus::Healthy => "healthy",
            OverlayStatus::Stale => "STALE",
            OverlayStatus::Rejected => "REJECTED",
        };
        match &entry.reason {
            Some(reason) => println!("{:<8} {}  ({})", status, entry.selector, reason),
            None => println!("{:<8} {}", status, entry.selector),
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, SyncError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SyncError::Document(DocumentError::Parse(e.to_string())))
}

fn parse_error(file: &Path, e: impl std::fmt::Display) -> SyncError {
    SyncError::Document(DocumentError::Parse(format!("{}: {}", file.display(), e)))
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
