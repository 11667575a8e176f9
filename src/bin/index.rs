//! NewsVault indexer entry point: TSV → quality gate → chunker → vault.
//!
//! The pipeline runs sequentially so checkpoints stay consistent; map
//! payloads are collected locally (shipping them to the external vector
//! index belongs to the hosting orchestrator, not this CLI).
//!
//! Exit codes: 0 success, 1 argument/runtime error.

use std::path::PathBuf;

use tracing::info;

use newsvault::config;
use newsvault::error::AppError;
use newsvault::indexing::index::VecSink;
use newsvault::indexing::pipeline::{IndexingPipeline, PipelineResult};
use newsvault::indexing::vault::VaultStorage;
use newsvault::logger;

fn main() {
    let _ = dotenvy::dotenv();

    let args = match CliArgs::parse() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("run with --help for usage");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<(), AppError> {
    let config = config::load(args.config_path.as_deref())?;
    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), None)?;

    let vault = VaultStorage::open(&config.vault_db_path(), config.vault.clone())?;
    let mut pipeline = IndexingPipeline::new(&config, vault, Box::new(VecSink::new()));

    info!(tsv = %args.tsv_path.display(), resume = args.resume, "indexer starting");

    let result = if args.resume || args.checkpoint.is_some() {
        pipeline.process_tsv_resumable(
            &args.tsv_path,
            args.checkpoint.as_deref(),
            args.site.as_deref(),
        )?
    } else {
        pipeline.process_tsv(&args.tsv_path, args.site.as_deref())?
    };

    print_result(&result);
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!("Success:      {}", result.success);
    println!("Failed:       {}", result.failed);
    println!("Buffered:     {}", result.buffered);
    println!("Skipped:      {}", result.skipped);
    println!("Total chunks: {}", result.total_chunks);
}

struct CliArgs {
    tsv_path: PathBuf,
    site: Option<String>,
    resume: bool,
    checkpoint: Option<PathBuf>,
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let mut tsv_path: Option<PathBuf> = None;
        let mut site = None;
        let mut resume = false;
        let mut checkpoint = None;
        let mut config_path = None;
        let mut verbosity = 0u8;

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                "--site" => {
                    site = Some(iter.next().ok_or("--site requires a value")?);
                }
                "--resume" => resume = true,
                "--checkpoint" => {
                    checkpoint =
                        Some(PathBuf::from(iter.next().ok_or("--checkpoint requires a path")?));
                }
                "-f" | "--config" => {
                    config_path = Some(iter.next().ok_or("--config requires a path")?);
                }
                "--verbose" => verbosity = verbosity.saturating_add(1),
                a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                    verbosity = verbosity.saturating_add((a.len() - 1) as u8);
                }
                a if a.starts_with('-') => return Err(format!("unrecognized argument: {a}")),
                positional => {
                    if tsv_path.is_some() {
                        return Err(format!("unexpected extra argument: {positional}"));
                    }
                    tsv_path = Some(PathBuf::from(positional));
                }
            }
        }

        let log_level = match verbosity {
            0 => None,
            1 => Some("warn"),
            2 => Some("info"),
            3 => Some("debug"),
            _ => Some("trace"),
        };

        Ok(CliArgs {
            tsv_path: tsv_path.ok_or("a TSV file path is required")?,
            site,
            resume,
            checkpoint,
            log_level,
            config_path,
        })
    }
}

fn print_usage() {
    println!("Usage: newsvault-index <tsv> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --site <name>            Override the site for all articles");
    println!("  --resume                 Resume from the checkpoint next to the TSV");
    println!("  --checkpoint <path>      Custom checkpoint file (implies resumable mode)");
    println!("  -f, --config <path>      Config file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv     Increase logging verbosity");
    println!("  -h, --help               Print help");
}
