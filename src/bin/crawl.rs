//! NewsVault crawler entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Build the site adapter (+ list discovery for list-based sources)
//!   7. Spawn Ctrl-C → shutdown token watcher
//!   8. Run the requested crawl mode
//!
//! Exit codes: 0 success, 1 argument/runtime error, 130 interrupted.

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newsvault::config;
use newsvault::crawler::engine::{CrawlStats, CrawlerEngine};
use newsvault::crawler::navigator::DateNavigator;
use newsvault::crawler::parser::{SiteParser, TransportKind};
use newsvault::crawler::sources;
use newsvault::crawler::transport::Transport;
use newsvault::error::AppError;
use newsvault::logger;

const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let args = match CliArgs::parse() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("run with --help for usage");
            std::process::exit(1);
        }
    };

    match run(args).await {
        Ok(Outcome::Finished) => {}
        Ok(Outcome::Interrupted) => std::process::exit(EXIT_INTERRUPTED),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

enum Outcome {
    Finished,
    Interrupted,
}

async fn run(args: CliArgs) -> Result<Outcome, AppError> {
    if args.list_sources {
        println!("Available news sources:");
        for source in sources::list_available() {
            println!("  - {source}");
        }
        return Ok(Outcome::Finished);
    }

    let config = config::load(args.config_path.as_deref())?;
    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), None)?;

    let Some(source) = args.source.as_deref() else {
        return Err(AppError::Config(
            "--source is required (use --list-sources to see available sources)".into(),
        ));
    };

    if args.dry_run {
        info!("dry run: nothing will be written");
    }

    let mut parser = sources::build(source)?;

    // One session for discovery, navigation and the crawl itself.
    let kind = if config.crawler.impersonate(source)
        || parser.preferred_transport() == TransportKind::Impersonating
    {
        TransportKind::Impersonating
    } else {
        TransportKind::Standard
    };
    let transport = Transport::for_kind(kind, &config.crawler)?;

    parser.prepare(&transport, args.max_pages).await?;

    // Date-window mode resolves to an ID range before the engine spins up.
    let id_range = match (args.date_start, args.date_end) {
        (Some(start), Some(end)) => {
            let latest = parser.latest_id(&transport).await?;
            let navigator = DateNavigator::new(&parser, &transport);
            match navigator.find_id_range(start, end, latest).await {
                Some(range) => Some(range),
                None => {
                    return Err(AppError::Fetch(format!(
                        "could not resolve an ID range for {start}..{end}"
                    )));
                }
            }
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Config(
                "--date-start and --date-end must be given together".into(),
            ));
        }
    };

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received, finishing in-flight work");
            ctrlc_token.cancel();
        }
    });

    let auto_save = !args.no_auto_save && !args.dry_run;
    let mut engine =
        CrawlerEngine::new(parser, &config, Some(transport), auto_save, shutdown.clone())?;

    let stats = if let Some((start_id, end_id)) = id_range {
        engine.run_range(start_id, end_id, args.reverse).await?
    } else if args.auto_latest {
        engine.run_auto(args.count).await?
    } else if let (Some(start_id), Some(end_id)) = (args.id_start, args.id_end) {
        engine.run_range(start_id, end_id, args.reverse).await?
    } else {
        return Err(AppError::Config(
            "must specify --auto-latest, --id-start/--id-end or --date-start/--date-end".into(),
        ));
    };

    engine.close().await;
    print_summary(&stats, args.dry_run);

    if shutdown.is_cancelled() {
        return Ok(Outcome::Interrupted);
    }
    Ok(Outcome::Finished)
}

fn print_summary(stats: &CrawlStats, dry_run: bool) {
    let title = if dry_run { "Dry run completed" } else { "Crawl completed" };
    println!("{title}");
    println!("  Total:     {}", stats.total);
    println!("  Success:   {}", stats.success);
    println!("  Failed:    {}", stats.failed);
    println!("  Skipped:   {}", stats.skipped);
    println!("  Not found: {}", stats.not_found);
    println!("  Blocked:   {}", stats.blocked);
    if stats.total > 0 {
        println!("  Success rate: {:.2}%", stats.success_rate() * 100.0);
    }
}

struct CliArgs {
    source: Option<String>,
    list_sources: bool,
    auto_latest: bool,
    count: usize,
    id_start: Option<u64>,
    id_end: Option<u64>,
    reverse: bool,
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
    max_pages: Option<usize>,
    no_auto_save: bool,
    dry_run: bool,
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let mut args = CliArgs {
            source: None,
            list_sources: false,
            auto_latest: false,
            count: 100,
            id_start: None,
            id_end: None,
            reverse: false,
            date_start: None,
            date_end: None,
            max_pages: None,
            no_auto_save: false,
            dry_run: false,
            log_level: None,
            config_path: None,
        };
        let mut verbosity = 0u8;

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                "--source" => args.source = Some(required(&mut iter, "--source")?),
                "--list-sources" => args.list_sources = true,
                "--auto-latest" => args.auto_latest = true,
                "--count" => args.count = parse_num(&mut iter, "--count")?,
                "--id-start" => args.id_start = Some(parse_num(&mut iter, "--id-start")?),
                "--id-end" => args.id_end = Some(parse_num(&mut iter, "--id-end")?),
                "--reverse" => args.reverse = true,
                "--date-start" => args.date_start = Some(parse_date(&mut iter, "--date-start")?),
                "--date-end" => args.date_end = Some(parse_date(&mut iter, "--date-end")?),
                "--max-pages" => args.max_pages = Some(parse_num(&mut iter, "--max-pages")?),
                "--no-auto-save" => args.no_auto_save = true,
                "--dry-run" => args.dry_run = true,
                "-f" | "--config" => args.config_path = Some(required(&mut iter, "--config")?),
                "--verbose" => verbosity = verbosity.saturating_add(1),
                a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                    verbosity = verbosity.saturating_add((a.len() - 1) as u8);
                }
                other => return Err(format!("unrecognized argument: {other}")),
            }
        }

        // Each -v raises verbosity one tier from the config default:
        //   -v      → warn   -vv → info   -vvv → debug   -vvvv+ → trace
        args.log_level = match verbosity {
            0 => None,
            1 => Some("warn"),
            2 => Some("info"),
            3 => Some("debug"),
            _ => Some("trace"),
        };

        Ok(args)
    }
}

fn required(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    iter.next().ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_num<T: std::str::FromStr>(
    iter: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    required(iter, flag)?
        .parse()
        .map_err(|_| format!("{flag} expects a number"))
}

fn parse_date(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<NaiveDate, String> {
    let raw = required(iter, flag)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| format!("{flag} expects YYYY-MM-DD, got '{raw}'"))
}

fn print_usage() {
    println!("Usage: newsvault-crawl [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --source <name>          News source to crawl (see --list-sources)");
    println!("  --list-sources           List all available news sources and exit");
    println!("  --auto-latest            Crawl backwards from the latest article ID");
    println!("  --count <n>              Articles to crawl in auto mode (default: 100)");
    println!("  --id-start <n>           Starting article ID");
    println!("  --id-end <n>             Ending article ID");
    println!("  --reverse                Sweep the ID range in descending order");
    println!("  --date-start <date>      Window start (YYYY-MM-DD), resolved via the navigator");
    println!("  --date-end <date>        Window end (YYYY-MM-DD)");
    println!("  --max-pages <n>          Listing pages to scan (list-based sources)");
    println!("  --no-auto-save           Do not write TSV/ID files");
    println!("  --dry-run                Crawl without saving anything");
    println!("  -f, --config <path>      Config file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv     Increase logging verbosity");
    println!("  -h, --help               Print help");
}
