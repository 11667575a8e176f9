//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file (default `config/default.toml` relative to the current
//! working directory), then applies `NEWSVAULT_DATA_DIR` and
//! `NEWSVAULT_LOG_LEVEL` env overrides. When no file exists a hardcoded
//! minimal default is returned so the binaries work out of the box.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

/// Fetch-engine configuration, including per-source overrides.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Default number of in-flight requests per source.
    pub concurrent_limit: usize,
    /// Inter-request jitter bounds, seconds.
    pub min_delay: f64,
    pub max_delay: f64,
    /// Per-request timeout, seconds.
    pub request_timeout: u64,
    pub max_retries: u32,
    /// Base retry delay, seconds; doubled per attempt with ±20% jitter.
    pub retry_delay: f64,
    pub max_retry_delay: f64,
    /// Global cooldown after a 429/403, seconds.
    pub rate_limit_cooldown: u64,
    /// Consecutive failures before a smart jump is attempted.
    pub smart_jump_threshold: u32,
    /// Classify request timeouts as NOT_FOUND (sweep acceleration) instead
    /// of retrying them. See the policy note in the crawler engine docs.
    pub timeout_as_not_found: bool,
    /// User-agent pool sampled per request.
    pub user_agents: Vec<String>,
    /// Sources that require the browser-impersonating transport.
    pub impersonate_sources: Vec<String>,
    /// Sources eligible for the smart-jump heuristic.
    pub smart_jump_sources: Vec<String>,
    /// Per-source overrides (from `[crawler.sources.<name>]`).
    pub sources: HashMap<String, SourceOverride>,
}

/// Per-source crawl overrides.
#[derive(Debug, Clone, Default)]
pub struct SourceOverride {
    pub concurrent_limit: Option<usize>,
    /// (min, max) inter-request jitter in seconds.
    pub delay_range: Option<(f64, f64)>,
}

impl CrawlerConfig {
    /// Effective concurrency for `source`, honoring overrides.
    pub fn concurrent_limit_for(&self, source: &str) -> usize {
        self.sources
            .get(source)
            .and_then(|s| s.concurrent_limit)
            .unwrap_or(self.concurrent_limit)
            .max(1)
    }

    /// Effective (min, max) jitter for `source`, honoring overrides.
    pub fn delay_range_for(&self, source: &str) -> (f64, f64) {
        self.sources
            .get(source)
            .and_then(|s| s.delay_range)
            .unwrap_or((self.min_delay, self.max_delay))
    }

    pub fn impersonate(&self, source: &str) -> bool {
        self.impersonate_sources.iter().any(|s| s == source)
    }

    pub fn smart_jump_enabled(&self, source: &str) -> bool {
        self.smart_jump_sources.iter().any(|s| s == source)
    }
}

/// Chunking targets (character counts).
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub target_length: usize,
    pub min_length: usize,
    /// Bodies strictly shorter than this become a single chunk.
    pub short_article_threshold: usize,
    pub summary_max_length: usize,
    pub extractive_sentences: usize,
}

/// Quality-gate thresholds.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    pub min_body_length: usize,
    /// Language-fit signal; set to 0.0 to disable for non-Chinese corpora.
    pub min_chinese_ratio: f64,
    pub max_html_ratio: f64,
}

/// Vault compression settings. The adaptive level picks
/// `short_compression` below `short_threshold` chars, `long_compression`
/// above `long_threshold`, `compression_level` otherwise.
#[derive(Debug, Clone)]
pub struct VaultTuning {
    pub compression_level: i32,
    pub short_threshold: usize,
    pub long_threshold: usize,
    pub short_compression: i32,
    pub long_compression: i32,
}

/// Indexing-pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Checkpoint flush cadence, in processed articles.
    pub checkpoint_interval: usize,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for all persistent data (already expanded, no `~`).
    pub data_dir: PathBuf,
    pub log_level: String,
    pub crawler: CrawlerConfig,
    pub chunking: ChunkingConfig,
    pub quality: QualityConfig,
    pub vault: VaultTuning,
    pub pipeline: PipelineConfig,
    /// Domain → tier number (1..=4) from `[tiers]`.
    pub tiers: HashMap<String, u8>,
}

impl Config {
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn crawled_ids_dir(&self) -> PathBuf {
        self.data_dir.join("crawled_ids")
    }

    pub fn vault_db_path(&self) -> PathBuf {
        self.data_dir.join("vault").join("full_texts.db")
    }

    pub fn rollback_db_path(&self) -> PathBuf {
        self.data_dir.join("indexing").join("migrations.db")
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.data_dir.join("indexing").join("buffer.jsonl")
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    core: RawCore,
    #[serde(default)]
    crawler: RawCrawler,
    #[serde(default)]
    chunking: RawChunking,
    #[serde(default)]
    quality: RawQuality,
    #[serde(default)]
    vault: RawVault,
    #[serde(default)]
    pipeline: RawPipeline,
    #[serde(default)]
    tiers: HashMap<String, u8>,
}

#[derive(Deserialize)]
struct RawCore {
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawCore {
    fn default() -> Self {
        Self { data_dir: default_data_dir(), log_level: default_log_level() }
    }
}

#[derive(Deserialize)]
struct RawCrawler {
    #[serde(default = "default_concurrent_limit")]
    concurrent_limit: usize,
    #[serde(default = "default_min_delay")]
    min_delay: f64,
    #[serde(default = "default_max_delay")]
    max_delay: f64,
    #[serde(default = "default_request_timeout")]
    request_timeout: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay")]
    retry_delay: f64,
    #[serde(default = "default_max_retry_delay")]
    max_retry_delay: f64,
    #[serde(default = "default_rate_limit_cooldown")]
    rate_limit_cooldown: u64,
    #[serde(default = "default_smart_jump_threshold")]
    smart_jump_threshold: u32,
    #[serde(default = "default_true")]
    timeout_as_not_found: bool,
    #[serde(default = "default_user_agents")]
    user_agents: Vec<String>,
    #[serde(default = "default_impersonate_sources")]
    impersonate_sources: Vec<String>,
    #[serde(default = "default_smart_jump_sources")]
    smart_jump_sources: Vec<String>,
    #[serde(default)]
    sources: HashMap<String, RawSourceOverride>,
}

impl Default for RawCrawler {
    fn default() -> Self {
        // serde only calls field defaults during deserialization; mirror them here.
        Self {
            concurrent_limit: default_concurrent_limit(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            max_retry_delay: default_max_retry_delay(),
            rate_limit_cooldown: default_rate_limit_cooldown(),
            smart_jump_threshold: default_smart_jump_threshold(),
            timeout_as_not_found: true,
            user_agents: default_user_agents(),
            impersonate_sources: default_impersonate_sources(),
            smart_jump_sources: default_smart_jump_sources(),
            sources: HashMap::new(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawSourceOverride {
    #[serde(default)]
    concurrent_limit: Option<usize>,
    #[serde(default)]
    delay_range: Option<(f64, f64)>,
}

#[derive(Deserialize)]
struct RawChunking {
    #[serde(default = "default_target_length")]
    target_length: usize,
    #[serde(default = "default_min_length")]
    min_length: usize,
    #[serde(default = "default_short_article_threshold")]
    short_article_threshold: usize,
    #[serde(default = "default_summary_max_length")]
    summary_max_length: usize,
    #[serde(default = "default_extractive_sentences")]
    extractive_sentences: usize,
}

impl Default for RawChunking {
    fn default() -> Self {
        Self {
            target_length: default_target_length(),
            min_length: default_min_length(),
            short_article_threshold: default_short_article_threshold(),
            summary_max_length: default_summary_max_length(),
            extractive_sentences: default_extractive_sentences(),
        }
    }
}

#[derive(Deserialize)]
struct RawQuality {
    #[serde(default = "default_min_body_length")]
    min_body_length: usize,
    #[serde(default = "default_min_chinese_ratio")]
    min_chinese_ratio: f64,
    #[serde(default = "default_max_html_ratio")]
    max_html_ratio: f64,
}

impl Default for RawQuality {
    fn default() -> Self {
        Self {
            min_body_length: default_min_body_length(),
            min_chinese_ratio: default_min_chinese_ratio(),
            max_html_ratio: default_max_html_ratio(),
        }
    }
}

#[derive(Deserialize)]
struct RawVault {
    #[serde(default = "default_compression_level")]
    compression_level: i32,
    #[serde(default = "default_short_threshold")]
    short_threshold: usize,
    #[serde(default = "default_long_threshold")]
    long_threshold: usize,
    #[serde(default = "default_short_compression")]
    short_compression: i32,
    #[serde(default = "default_long_compression")]
    long_compression: i32,
}

impl Default for RawVault {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            short_threshold: default_short_threshold(),
            long_threshold: default_long_threshold(),
            short_compression: default_short_compression(),
            long_compression: default_long_compression(),
        }
    }
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default = "default_checkpoint_interval")]
    checkpoint_interval: usize,
}

impl Default for RawPipeline {
    fn default() -> Self {
        Self { checkpoint_interval: default_checkpoint_interval() }
    }
}

fn default_data_dir() -> String { "data".to_string() }
fn default_log_level() -> String { "info".to_string() }

fn default_concurrent_limit() -> usize { 5 }
fn default_min_delay() -> f64 { 1.0 }
fn default_max_delay() -> f64 { 3.0 }
fn default_request_timeout() -> u64 { 15 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> f64 { 2.0 }
fn default_max_retry_delay() -> f64 { 30.0 }
fn default_rate_limit_cooldown() -> u64 { 60 }
fn default_smart_jump_threshold() -> u32 { 100 }

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_impersonate_sources() -> Vec<String> {
    vec!["cna".to_string()]
}

fn default_smart_jump_sources() -> Vec<String> {
    vec!["chinatimes".to_string(), "cna".to_string()]
}

fn default_target_length() -> usize { 170 }
fn default_min_length() -> usize { 100 }
fn default_short_article_threshold() -> usize { 200 }
fn default_summary_max_length() -> usize { 400 }
fn default_extractive_sentences() -> usize { 3 }

fn default_min_body_length() -> usize { 50 }
fn default_min_chinese_ratio() -> f64 { 0.2 }
fn default_max_html_ratio() -> f64 { 0.3 }

fn default_compression_level() -> i32 { 3 }
fn default_short_threshold() -> usize { 1000 }
fn default_long_threshold() -> usize { 5000 }
fn default_short_compression() -> i32 { 1 }
fn default_long_compression() -> i32 { 5 }

fn default_checkpoint_interval() -> usize { 10 }

fn default_true() -> bool { true }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides. If no path is given and the default file does not
/// exist, the built-in defaults are returned.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let data_dir_override = env::var("NEWSVAULT_DATA_DIR").ok();
    let log_level_override = env::var("NEWSVAULT_LOG_LEVEL").ok();

    if let Some(path) = config_path {
        // If explicitly provided, it must exist and be valid.
        return load_from(
            Path::new(path),
            data_dir_override.as_deref(),
            log_level_override.as_deref(),
        );
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(
            default_path,
            data_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    } else {
        let raw = RawConfig::default();
        Ok(resolve(
            raw,
            data_dir_override.as_deref(),
            log_level_override.as_deref(),
        ))
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("config error in {}: {e}", path.display())))?;

    Ok(resolve(parsed, data_dir_override, log_level_override))
}

fn resolve(
    parsed: RawConfig,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Config {
    let data_dir_str = data_dir_override.unwrap_or(&parsed.core.data_dir).to_string();
    let data_dir = expand_home(&data_dir_str);
    let log_level = log_level_override.unwrap_or(&parsed.core.log_level).to_string();

    let c = parsed.crawler;
    Config {
        data_dir,
        log_level,
        crawler: CrawlerConfig {
            concurrent_limit: c.concurrent_limit.max(1),
            min_delay: c.min_delay,
            max_delay: c.max_delay.max(c.min_delay),
            request_timeout: c.request_timeout,
            max_retries: c.max_retries,
            retry_delay: c.retry_delay,
            max_retry_delay: c.max_retry_delay,
            rate_limit_cooldown: c.rate_limit_cooldown,
            smart_jump_threshold: c.smart_jump_threshold.max(1),
            timeout_as_not_found: c.timeout_as_not_found,
            user_agents: c.user_agents,
            impersonate_sources: c.impersonate_sources,
            smart_jump_sources: c.smart_jump_sources,
            sources: c
                .sources
                .into_iter()
                .map(|(name, s)| {
                    (name, SourceOverride {
                        concurrent_limit: s.concurrent_limit,
                        delay_range: s.delay_range,
                    })
                })
                .collect(),
        },
        chunking: ChunkingConfig {
            target_length: parsed.chunking.target_length.max(1),
            min_length: parsed.chunking.min_length,
            short_article_threshold: parsed.chunking.short_article_threshold,
            summary_max_length: parsed.chunking.summary_max_length,
            extractive_sentences: parsed.chunking.extractive_sentences.max(1),
        },
        quality: QualityConfig {
            min_body_length: parsed.quality.min_body_length,
            min_chinese_ratio: parsed.quality.min_chinese_ratio,
            max_html_ratio: parsed.quality.max_html_ratio,
        },
        vault: VaultTuning {
            compression_level: parsed.vault.compression_level,
            short_threshold: parsed.vault.short_threshold,
            long_threshold: parsed.vault.long_threshold,
            short_compression: parsed.vault.short_compression,
            long_compression: parsed.vault.long_compression,
        },
        pipeline: PipelineConfig {
            checkpoint_interval: parsed.pipeline.checkpoint_interval.max(1),
        },
        tiers: parsed.tiers,
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — built-in defaults rooted at `data_dir`.
#[cfg(test)]
impl Config {
    pub fn test_default(data_dir: &Path) -> Self {
        let mut cfg = resolve(RawConfig::default(), None, None);
        cfg.data_dir = data_dir.to_path_buf();
        cfg
    }
}
