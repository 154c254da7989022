mod logging;

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use fingerprint_core::{FingerprintMode, HashAlgorithm, PipelineOptions, Snapshot, SnapshotFormat, TraversalOptions, XattrMode};
use tracing::error;

#[derive(Parser)]
#[command(name = "fingerprint", version, about = "Compute a content-addressed fingerprint of one or more paths")]
struct Cli {
    /// Files or directories to fingerprint; combined into one result.
    paths: Vec<PathBuf>,

    /// Read additional paths (or glob patterns), one per line, from a
    /// file, with `${VAR}`/`$(VAR)` expansion against the environment.
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Only consider entries whose basename matches this glob.
    #[arg(long)]
    glob: Option<String>,

    /// Only consider entries whose full path matches this regex.
    #[arg(long)]
    regex: Option<String>,

    #[arg(long, value_enum, default_value_t = HashArg::Blake3)]
    hash: HashArg,

    /// `default` folds digests only (no path bytes, broken symlinks
    /// excluded); `absolute`/`relative` also mix in each entry's absolute
    /// or root-relative path and include broken symlinks with a sentinel
    /// digest.
    #[arg(long, value_enum, default_value_t = FingerprintModeArg::Default)]
    fingerprint_mode: FingerprintModeArg,

    /// `on` reads a matching cached digest or computes and writes one;
    /// `off` never touches the cache; `refresh` always recomputes and
    /// overwrites; `clear` computes normally but deletes any existing
    /// cached record instead of writing a new one.
    #[arg(long, value_enum, default_value_t = XattrArg::Off)]
    xattr: XattrArg,

    /// Print every file's own digest, not just the folded root
    /// fingerprint.
    #[arg(long)]
    list: bool,

    /// Write a snapshot of this run to the given file (format inferred
    /// from its extension: .json, .tsv, or .plist).
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Compare this run against a previously written snapshot and report
    /// added/removed/changed paths; exits non-zero if they differ.
    #[arg(long)]
    compare: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    max_concurrency: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum HashArg {
    Crc32c,
    Blake3,
}

impl From<HashArg> for HashAlgorithm {
    fn from(value: HashArg) -> Self {
        match value {
            HashArg::Crc32c => HashAlgorithm::Crc32c,
            HashArg::Blake3 => HashAlgorithm::Blake3,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FingerprintModeArg {
    Default,
    Absolute,
    Relative,
}

impl From<FingerprintModeArg> for FingerprintMode {
    fn from(value: FingerprintModeArg) -> Self {
        match value {
            FingerprintModeArg::Default => FingerprintMode::Default,
            FingerprintModeArg::Absolute => FingerprintMode::Absolute,
            FingerprintModeArg::Relative => FingerprintMode::Relative,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum XattrArg {
    On,
    Off,
    Refresh,
    Clear,
}

impl From<XattrArg> for XattrMode {
    fn from(value: XattrArg) -> Self {
        match value {
            XattrArg::On => XattrMode::On,
            XattrArg::Off => XattrMode::Off,
            XattrArg::Refresh => XattrMode::Refresh,
            XattrArg::Clear => XattrMode::Clear,
        }
    }
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fingerprint failed");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut paths = cli.paths.clone();
    if let Some(inputs_path) = &cli.inputs {
        let env: HashMap<String, String> = std::env::vars().collect();
        let file = File::open(inputs_path)?;
        let extra = fingerprint_core::inputs::read_inputs_file(file, &env)?;
        paths.extend(extra.into_iter().map(PathBuf::from));
    }
    if paths.is_empty() {
        anyhow::bail!("no paths given; pass one or more PATHs or --inputs FILE");
    }

    let glob = cli
        .glob
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --glob: {e}"))?;
    let regex = cli
        .regex
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --regex: {e}"))?;

    let fingerprint_mode: FingerprintMode = cli.fingerprint_mode.into();
    let options = PipelineOptions {
        algorithm: cli.hash.into(),
        xattr_mode: cli.xattr.into(),
        fingerprint_mode,
        max_concurrency: cli.max_concurrency,
        traversal: TraversalOptions { glob, regex },
    };

    let fingerprint = fingerprint_core::fingerprint_paths(&paths, &options)?;

    if cli.list {
        for file in &fingerprint.files {
            println!("{}\t{}", hex::encode(&file.digest), file.relative_path.display());
        }
    }
    println!("Fingerprint: {}", fingerprint.to_hex());

    let input_paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    let glob_patterns: Vec<String> = cli.glob.iter().cloned().collect();
    let regex_patterns: Vec<String> = cli.regex.iter().cloned().collect();
    let snapshot = Snapshot::from_fingerprint(
        &fingerprint,
        input_paths,
        glob_patterns,
        regex_patterns,
        fingerprint_mode,
        chrono::Utc::now(),
    );

    if let Some(snapshot_path) = &cli.snapshot {
        let format = format_for(snapshot_path)?;
        let file = File::create(snapshot_path)?;
        snapshot.write_to(file, format)?;
    }

    if let Some(compare_path) = &cli.compare {
        let format = format_for(compare_path)?;
        let file = File::open(compare_path)?;
        let previous = Snapshot::read_from(file, format)?;
        let diff = fingerprint_core::snapshot::diff(&previous, &snapshot);
        if diff.algorithm_mismatch {
            eprintln!("note: snapshots use different hash algorithms; hash differences are not reported");
        }
        if diff.is_empty() {
            println!("no differences");
        } else {
            for path in &diff.added {
                println!("+ {path}");
            }
            for path in &diff.removed {
                println!("- {path}");
            }
            for path in &diff.changed {
                println!("~ {path}");
            }
            return Ok(ExitCode::from(1));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn format_for(path: &PathBuf) -> anyhow::Result<SnapshotFormat> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    SnapshotFormat::from_extension(ext).ok_or_else(|| anyhow::anyhow!("unrecognized snapshot extension: '{ext}'"))
}
