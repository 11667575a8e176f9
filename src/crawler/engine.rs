//! Concurrent fetch engine.
//!
//! Drives one site adapter over a per-source semaphore with jittered
//! delays, classifies every fetch into exactly one of SUCCESS / NOT_FOUND /
//! BLOCKED, retries transient failures with capped exponential backoff,
//! parks all workers during a global rate-limit cooldown, and — for sources
//! with date-encoded IDs — leaps over exhausted ID ranges to the next
//! calendar day once enough consecutive failures pile up.
//!
//! IDs are processed in small batches so counters update promptly and the
//! smart jump can trigger early. Individual task failures are folded into
//! statistics; nothing a single article does can abort a run.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use rand::Rng;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, CrawlerConfig};
use crate::crawler::parser::{ParserKind, SiteParser, TransportKind};
use crate::crawler::sink::TsvSink;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

/// Batch granularity: how many IDs are in flight between failure-counter
/// updates and smart-jump checks.
const BATCH_SIZE: usize = 10;

/// Bound on waiting for in-flight requests when closing the session.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub blocked: u64,
}

impl CrawlStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }
}

#[derive(Default)]
struct StatCounters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    not_found: AtomicU64,
    blocked: AtomicU64,
}

impl StatCounters {
    fn reset(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.success.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.not_found.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
        }
    }
}

/// Per-task result, richer than the three-way wire taxonomy so the jump
/// counter can treat parse failures as misses without recounting stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Success,
    Skipped,
    NotFound,
    Blocked,
    ParseFailed,
}

impl TaskOutcome {
    /// Whether this outcome feeds the consecutive-failure counter.
    fn is_failure(self) -> bool {
        matches!(self, TaskOutcome::NotFound | TaskOutcome::Blocked | TaskOutcome::ParseFailed)
    }
}

/// Smart-jump states. `Normal` while articles resolve, `Suspect` once a
/// failure streak starts, `Jump` when the streak reaches the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpState {
    Normal,
    Suspect,
    Jump,
}

/// The smart-jump state machine. Deliberately separate from the retry
/// loop: retries handle one flaky article, the jump handles a thousand
/// dead IDs in a row.
struct JumpMonitor {
    enabled: bool,
    threshold: u32,
    state: JumpState,
    failures: u32,
}

impl JumpMonitor {
    fn new(enabled: bool, threshold: u32) -> Self {
        Self { enabled, threshold, state: JumpState::Normal, failures: 0 }
    }

    fn record_success(&mut self) {
        self.failures = 0;
        self.state = JumpState::Normal;
    }

    fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.state = if self.failures >= self.threshold {
            JumpState::Jump
        } else {
            JumpState::Suspect
        };
    }

    /// Ready to leap. An aborted leap (no date in the ID, target out of
    /// range) leaves the state armed so the next batch re-evaluates.
    fn armed(&self) -> bool {
        self.enabled && self.state == JumpState::Jump
    }

    /// Back to `Normal` after a successful leap or a run reset.
    fn reset(&mut self) {
        self.failures = 0;
        self.state = JumpState::Normal;
    }
}

/// How the retry loop last failed, for fallback and logging decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryReason {
    None,
    Blocked,
    ServerError,
    Network,
}

enum Resolved {
    Success(String),
    NotFound,
    Blocked,
}

struct EngineShared<P: SiteParser> {
    parser: P,
    transport: RwLock<Transport>,
    fallback_used: AtomicBool,
    sink: Option<TsvSink>,
    crawled: std::sync::Mutex<HashSet<String>>,
    stats: StatCounters,
    cooldown_until: std::sync::Mutex<Option<Instant>>,
    semaphore: Semaphore,
    cfg: CrawlerConfig,
    min_delay: f64,
    max_delay: f64,
}

pub struct CrawlerEngine<P: SiteParser + 'static> {
    shared: Arc<EngineShared<P>>,
    shutdown: CancellationToken,
    jump: JumpMonitor,
    smart_jump_count: u32,
}

impl<P: SiteParser + 'static> CrawlerEngine<P> {
    /// Build an engine around `parser`.
    ///
    /// If `transport` is `None` a session is created honoring the parser's
    /// preference and the configured impersonation list. With
    /// `auto_save = false` (dry runs) no sink is opened and nothing is
    /// written to disk.
    pub fn new(
        parser: P,
        config: &Config,
        transport: Option<Transport>,
        auto_save: bool,
        shutdown: CancellationToken,
    ) -> Result<Self, AppError> {
        let source = parser.source_name();
        let crawler_cfg = config.crawler.clone();

        let transport = match transport {
            Some(t) => t,
            None => {
                let kind = if crawler_cfg.impersonate(source)
                    || parser.preferred_transport() == TransportKind::Impersonating
                {
                    TransportKind::Impersonating
                } else {
                    TransportKind::Standard
                };
                Transport::for_kind(kind, &crawler_cfg)?
            }
        };

        let sink = if auto_save {
            Some(TsvSink::open(source, &config.output_dir(), &config.crawled_ids_dir())?)
        } else {
            None
        };

        let history = TsvSink::load_history(source, &config.crawled_ids_dir());
        if !history.is_empty() {
            info!(source, count = history.len(), "loaded crawled URLs from history");
        }

        let concurrent_limit = crawler_cfg.concurrent_limit_for(source);
        let (min_delay, max_delay) = crawler_cfg.delay_range_for(source);
        let jump = JumpMonitor::new(
            crawler_cfg.smart_jump_enabled(source),
            crawler_cfg.smart_jump_threshold,
        );

        info!(
            source,
            transport = transport.kind_label(),
            concurrent_limit,
            min_delay,
            max_delay,
            auto_save,
            "engine initialized"
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                parser,
                transport: RwLock::new(transport),
                fallback_used: AtomicBool::new(false),
                sink,
                crawled: std::sync::Mutex::new(history.into_iter().collect()),
                stats: StatCounters::default(),
                cooldown_until: std::sync::Mutex::new(None),
                semaphore: Semaphore::new(concurrent_limit),
                cfg: crawler_cfg,
                min_delay,
                max_delay,
            }),
            shutdown,
            jump,
            smart_jump_count: 0,
        })
    }

    pub fn stats(&self) -> CrawlStats {
        self.shared.stats.snapshot()
    }

    /// Crawl the latest `count` articles: list-based sources consume their
    /// discovered IDs in declared order, range-based sources sweep down
    /// from the latest ID.
    pub async fn run_auto(&mut self, count: usize) -> Result<CrawlStats, AppError> {
        info!(count, "starting auto crawl");

        let latest = {
            let t = self.shared.transport.read().await;
            self.shared.parser.latest_id(&t).await?
        };
        let Some(latest) = latest else {
            return Err(AppError::Fetch("failed to get latest article ID".into()));
        };
        info!(latest, "latest article ID resolved");

        let target_ids: Vec<u64> = match self.shared.parser.kind() {
            ParserKind::ListBased => {
                let discovered = self.shared.parser.discovered_ids();
                if discovered.is_empty() {
                    warn!("list-based parser has no discovered IDs, falling back to range sweep");
                    range_down(latest, count)
                } else {
                    info!(
                        using = discovered.len().min(count),
                        discovered = discovered.len(),
                        "list-based crawl from discovered IDs"
                    );
                    discovered.into_iter().take(count).collect()
                }
            }
            ParserKind::RangeBased => {
                info!(from = latest, count, "range-based crawl sweeping down");
                range_down(latest, count)
            }
        };

        self.shared.stats.reset(target_ids.len() as u64);
        self.jump.reset();
        self.smart_jump_count = 0;

        for batch in target_ids.chunks(BATCH_SIZE) {
            if self.shutdown.is_cancelled() {
                warn!("shutdown requested, stopping auto crawl");
                break;
            }
            self.execute_id_batch(batch).await;
        }

        self.log_stats();
        Ok(self.stats())
    }

    /// Crawl an inclusive ID range, ascending by default or descending with
    /// `reverse`. Smart jump engages here for eligible sources.
    pub async fn run_range(
        &mut self,
        start_id: u64,
        end_id: u64,
        reverse: bool,
    ) -> Result<CrawlStats, AppError> {
        let (mut start_id, end_id) = normalize_range(start_id, end_id, reverse);

        info!(
            start = start_id,
            end = end_id,
            direction = if reverse { "reverse" } else { "forward" },
            smart_jump = self.jump.enabled,
            threshold = self.jump.threshold,
            "starting range crawl"
        );

        let total = start_id.abs_diff(end_id) + 1;
        self.shared.stats.reset(total);
        self.jump.reset();
        self.smart_jump_count = 0;

        let mut batch: Vec<u64> = Vec::with_capacity(BATCH_SIZE);
        let mut interrupted = false;
        loop {
            let in_range = if reverse { start_id >= end_id } else { start_id <= end_id };
            if !in_range {
                break;
            }
            batch.push(start_id);
            match advance(start_id, reverse) {
                Some(next) => start_id = next,
                None => {
                    // ID space exhausted at zero.
                    self.flush_range_batch(&mut batch).await;
                    break;
                }
            }

            if batch.len() >= BATCH_SIZE {
                self.flush_range_batch(&mut batch).await;

                if self.shutdown.is_cancelled() {
                    warn!("shutdown requested, draining range crawl");
                    interrupted = true;
                    break;
                }

                if let Some(target) = self.maybe_smart_jump(batch_anchor(start_id, reverse), end_id, reverse) {
                    start_id = target;
                }
            }
        }

        if !batch.is_empty() && !interrupted {
            self.flush_range_batch(&mut batch).await;
        }

        self.log_stats();
        if self.smart_jump_count > 0 {
            info!(jumps = self.smart_jump_count, "smart jump summary");
        }
        Ok(self.stats())
    }

    /// Crawl an explicit URL list.
    pub async fn run_list(&mut self, urls: &[String]) -> Result<CrawlStats, AppError> {
        info!(count = urls.len(), "starting list crawl");

        self.shared.stats.reset(urls.len() as u64);
        self.jump.reset();

        for batch in urls.chunks(BATCH_SIZE) {
            if self.shutdown.is_cancelled() {
                warn!("shutdown requested, stopping list crawl");
                break;
            }
            let mut set: JoinSet<TaskOutcome> = JoinSet::new();
            for url in batch {
                let shared = Arc::clone(&self.shared);
                let url = url.clone();
                set.spawn(async move { shared.run_one_url(&url).await });
            }
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "list task panicked");
                    self.shared.stats.blocked.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.log_stats();
        Ok(self.stats())
    }

    /// Release the HTTP session, waiting at most [`CLOSE_TIMEOUT`] for
    /// in-flight requests to let go of it.
    pub async fn close(&self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.shared.transport.write()).await {
            Ok(mut guard) => {
                *guard = Transport::scripted(Vec::new(), true);
                info!("engine closed");
            }
            Err(_) => warn!("session close timed out, forcing shutdown"),
        }
    }

    async fn execute_id_batch(&mut self, ids: &[u64]) -> Vec<TaskOutcome> {
        let mut set: JoinSet<(usize, TaskOutcome)> = JoinSet::new();
        for (idx, id) in ids.iter().enumerate() {
            let shared = Arc::clone(&self.shared);
            let id = *id;
            set.spawn(async move { (idx, shared.run_one_id(id).await) });
        }

        let mut outcomes = vec![TaskOutcome::Blocked; ids.len()];
        let mut panicked = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = outcome,
                Err(e) => {
                    error!(error = %e, "fetch task panicked");
                    panicked += 1;
                }
            }
        }
        for _ in 0..panicked {
            self.shared.stats.blocked.fetch_add(1, Ordering::Relaxed);
        }

        for outcome in &outcomes {
            if outcome.is_failure() {
                self.jump.record_failure();
            } else {
                self.jump.record_success();
            }
        }
        if self.jump.enabled && self.jump.state != JumpState::Normal {
            debug!(
                consecutive = self.jump.failures,
                threshold = self.jump.threshold,
                state = ?self.jump.state,
                "failure streak"
            );
        }
        outcomes
    }

    async fn flush_range_batch(&mut self, batch: &mut Vec<u64>) {
        if batch.is_empty() {
            return;
        }
        self.execute_id_batch(batch).await;
        batch.clear();
    }

    /// Decide whether to jump. `anchor` is the last ID handed out; the
    /// target is the first ID of the next calendar day at the anchor's
    /// digit width. Returns the new pointer, or `None` to keep sweeping.
    fn maybe_smart_jump(&mut self, anchor: u64, end_id: u64, reverse: bool) -> Option<u64> {
        if !self.jump.armed() {
            return None;
        }

        let Some(target) = jump_target(anchor) else {
            warn!(
                anchor,
                consecutive = self.jump.failures,
                "smart jump aborted: cannot derive a date from the current ID"
            );
            return None;
        };

        let in_range = if reverse { target >= end_id } else { target <= end_id };
        if !in_range {
            warn!(anchor, target, end_id, "smart jump aborted: target outside crawl range");
            return None;
        }

        warn!(
            anchor,
            target,
            failures = self.jump.failures,
            "smart jump triggered, leaping to next calendar day"
        );
        self.jump.reset();
        self.smart_jump_count += 1;
        Some(target)
    }

    fn log_stats(&self) {
        let s = self.stats();
        info!(
            total = s.total,
            success = s.success,
            failed = s.failed,
            skipped = s.skipped,
            not_found = s.not_found,
            blocked = s.blocked,
            success_rate = format!("{:.2}%", s.success_rate() * 100.0),
            "crawl statistics"
        );
    }
}

impl<P: SiteParser> EngineShared<P> {
    fn is_crawled(&self, url: &str) -> bool {
        self.crawled.lock().unwrap_or_else(|p| p.into_inner()).contains(url)
    }

    fn mark_crawled(&self, url: &str) {
        self.crawled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(url.to_string());
    }

    /// Park until the global cooldown (if armed) has elapsed.
    async fn wait_cooldown(&self) {
        loop {
            let wait = {
                let guard = self.cooldown_until.lock().unwrap_or_else(|p| p.into_inner());
                guard.and_then(|until| until.checked_duration_since(Instant::now()))
            };
            match wait {
                Some(d) if !d.is_zero() => {
                    debug!(seconds = d.as_secs_f64(), "waiting for rate-limit cooldown");
                    tokio::time::sleep(d).await;
                }
                _ => return,
            }
        }
    }

    fn arm_cooldown(&self) {
        let cooldown = Duration::from_secs(self.cfg.rate_limit_cooldown);
        let mut guard = self.cooldown_until.lock().unwrap_or_else(|p| p.into_inner());
        let until = Instant::now() + cooldown;
        let extend = guard.is_none_or(|prev| until > prev);
        if extend {
            *guard = Some(until);
            warn!(seconds = cooldown.as_secs(), "rate limit detected, cooling down");
        }
    }

    /// Exponential backoff with ±20% jitter, capped at `max_retry_delay`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.cfg.retry_delay * 2f64.powi(attempt.saturating_sub(1) as i32);
        let jitter = {
            let mut rng = rand::thread_rng();
            base * 0.2 * rng.gen_range(-1.0..1.0)
        };
        Duration::from_secs_f64((base + jitter).min(self.cfg.max_retry_delay).max(0.0))
    }

    async fn random_delay(&self) {
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.min_delay..=self.max_delay.max(self.min_delay))
        };
        if delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    /// Fetch with retries. Rate limits arm the global cooldown; transient
    /// failures back off exponentially; repeated network-layer deaths on a
    /// profile with a fallback recreate the session once.
    async fn fetch_with_retry(&self, url: &str) -> Resolved {
        let mut attempt: u32 = 0;
        let mut last_reason = RetryReason::None;

        loop {
            self.wait_cooldown().await;

            let outcome = {
                let t = self.transport.read().await;
                t.get(url).await
            };

            match outcome {
                FetchOutcome::Ok(body) => return Resolved::Success(body),
                FetchOutcome::NotFound => return Resolved::NotFound,
                FetchOutcome::RateLimited => {
                    self.arm_cooldown();
                    last_reason = RetryReason::Blocked;
                }
                FetchOutcome::Retryable(reason) => {
                    debug!(%url, %reason, "retryable failure");
                    last_reason = if reason.starts_with("network") {
                        RetryReason::Network
                    } else {
                        RetryReason::ServerError
                    };
                }
                FetchOutcome::Blocked(reason) => {
                    warn!(%url, %reason, "terminal fetch status");
                    return Resolved::Blocked;
                }
            }

            attempt += 1;
            if attempt > self.cfg.max_retries {
                if last_reason == RetryReason::Network && self.try_session_fallback().await {
                    attempt = 0;
                    last_reason = RetryReason::None;
                    continue;
                }
                warn!(%url, ?last_reason, retries = self.cfg.max_retries, "max retries reached");
                return Resolved::Blocked;
            }
            tokio::time::sleep(self.retry_delay(attempt)).await;
        }
    }

    /// Swap in the fallback profile once per run. Returns `true` if a swap
    /// happened and the caller should retry.
    async fn try_session_fallback(&self) -> bool {
        if self.fallback_used.swap(true, Ordering::SeqCst) {
            return false;
        }
        let replacement = {
            let t = self.transport.read().await;
            t.fallback(&self.cfg)
        };
        match replacement {
            Some(fb) => {
                warn!(transport = fb.kind_label(), "recreating session with fallback transport");
                *self.transport.write().await = fb;
                true
            }
            None => false,
        }
    }

    async fn run_one_id(self: Arc<Self>, article_id: u64) -> TaskOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => {
                self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                return TaskOutcome::Blocked;
            }
        };
        self.random_delay().await;

        let Some(url) = self.parser.url_for(article_id) else {
            debug!(article_id, "no URL for ID, skipping");
            self.stats.not_found.fetch_add(1, Ordering::Relaxed);
            return TaskOutcome::NotFound;
        };
        self.process_url(&url, Some(article_id)).await
    }

    async fn run_one_url(self: Arc<Self>, url: &str) -> TaskOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => {
                self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                return TaskOutcome::Blocked;
            }
        };
        self.random_delay().await;
        self.process_url(url, None).await
    }

    /// Per-article flow: dedup check, fetch, parse, persist, count.
    /// Exactly one statistics bucket is incremented per call.
    async fn process_url(&self, url: &str, article_id: Option<u64>) -> TaskOutcome {
        if self.is_crawled(url) {
            debug!(%url, "already crawled, skipping");
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return TaskOutcome::Skipped;
        }

        let html = match self.fetch_with_retry(url).await {
            Resolved::NotFound => {
                self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                return TaskOutcome::NotFound;
            }
            Resolved::Blocked => {
                self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                return TaskOutcome::Blocked;
            }
            Resolved::Success(body) => body,
        };

        let Some(record) = self.parser.parse(&html, url) else {
            debug!(%url, "parser rejected content");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return TaskOutcome::ParseFailed;
        };
        if !record.is_well_formed() {
            debug!(%url, "parser returned a record without headline or body");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return TaskOutcome::ParseFailed;
        }

        self.mark_crawled(url);

        if let Some(sink) = &self.sink {
            // The URL goes to the crawled log first so a crash between the
            // two writes never leaves an unlogged TSV line.
            if let Err(e) = sink.record_crawled(url).await {
                error!(%url, error = %e, "failed to record crawled URL");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return TaskOutcome::ParseFailed;
            }
            if let Err(e) = sink.save_item(url, &record).await {
                error!(%url, error = %e, "failed to save record");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return TaskOutcome::ParseFailed;
            }
        }

        match article_id {
            Some(id) => info!(article_id = id, %url, "parsed"),
            None => info!(%url, "parsed"),
        }
        self.stats.success.fetch_add(1, Ordering::Relaxed);
        TaskOutcome::Success
    }
}

fn normalize_range(start_id: u64, end_id: u64, reverse: bool) -> (u64, u64) {
    if (!reverse && start_id > end_id) || (reverse && start_id < end_id) {
        (end_id, start_id)
    } else {
        (start_id, end_id)
    }
}

fn advance(id: u64, reverse: bool) -> Option<u64> {
    if reverse { id.checked_sub(1) } else { id.checked_add(1) }
}

/// The last ID handed out before `next` became the pointer.
fn batch_anchor(next: u64, reverse: bool) -> u64 {
    if reverse { next.saturating_add(1) } else { next.saturating_sub(1) }
}

fn range_down(latest: u64, count: usize) -> Vec<u64> {
    let lowest = latest.saturating_sub(count.saturating_sub(1) as u64);
    (lowest..=latest).rev().collect()
}

/// Calendar date encoded in the leading eight digits of an ID, if any.
/// IDs shorter than eight digits never qualify.
fn parse_date_from_id(article_id: u64) -> Option<NaiveDate> {
    let id_str = article_id.to_string();
    if id_str.len() < 8 {
        return None;
    }
    NaiveDate::parse_from_str(&id_str[..8], "%Y%m%d").ok()
}

/// First ID of the next calendar day at the width of `current_id`:
/// 8 digits → bare date, 12 digits → `YYYYMMDD0001`, 14 digits (and any
/// other width) → `YYYYMMDD000000`.
fn jump_target(current_id: u64) -> Option<u64> {
    let date = parse_date_from_id(current_id)?;
    let next_day = date.succ_opt()?;
    let prefix = next_day.format("%Y%m%d").to_string();

    let target = match current_id.to_string().len() {
        8 => prefix,
        12 => format!("{prefix}0001"),
        _ => format!("{prefix}000000"),
    };
    target.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_success_rate() {
        let s = CrawlStats { total: 10, success: 7, ..Default::default() };
        assert!((s.success_rate() - 0.7).abs() < 1e-9);
        assert_eq!(CrawlStats::default().success_rate(), 0.0);
    }

    #[test]
    fn date_from_id_requires_eight_digits() {
        assert_eq!(parse_date_from_id(1234567), None);
        assert_eq!(
            parse_date_from_id(20251231),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
        assert_eq!(
            parse_date_from_id(20251231000001),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
        // Leading digits that are not a date.
        assert_eq!(parse_date_from_id(99999999), None);
    }

    #[test]
    fn jump_target_widths() {
        // 14-digit (ChinaTimes-style): next day + six zeros.
        assert_eq!(jump_target(20251231000001), Some(20260101000000));
        // 12-digit (CNA-style): next day + 0001.
        assert_eq!(jump_target(202512290031), Some(202512300001));
        // 8-digit: bare next day.
        assert_eq!(jump_target(20250228), Some(20250301));
        // Too short to carry a date.
        assert_eq!(jump_target(4567890), None);
    }

    #[test]
    fn jump_target_crosses_year() {
        assert_eq!(jump_target(20251231235959), Some(20260101000000));
    }

    #[test]
    fn range_normalization() {
        assert_eq!(normalize_range(10, 20, false), (10, 20));
        assert_eq!(normalize_range(20, 10, false), (10, 20));
        assert_eq!(normalize_range(20, 10, true), (20, 10));
        assert_eq!(normalize_range(10, 20, true), (20, 10));
    }

    #[test]
    fn range_down_is_descending_inclusive() {
        assert_eq!(range_down(1005, 3), vec![1005, 1004, 1003]);
        assert_eq!(range_down(2, 5), vec![2, 1, 0]);
    }

    #[test]
    fn jump_monitor_walks_its_states() {
        let mut m = JumpMonitor::new(true, 3);
        assert_eq!(m.state, JumpState::Normal);
        assert!(!m.armed());

        m.record_failure();
        assert_eq!(m.state, JumpState::Suspect);
        assert!(!m.armed());

        m.record_failure();
        m.record_failure();
        assert_eq!(m.state, JumpState::Jump);
        assert!(m.armed());

        // A success anywhere drops straight back to Normal.
        m.record_failure();
        m.record_success();
        assert_eq!(m.state, JumpState::Normal);
        assert_eq!(m.failures, 0);
    }

    #[test]
    fn jump_monitor_disabled_never_arms() {
        let mut m = JumpMonitor::new(false, 1);
        m.record_failure();
        m.record_failure();
        assert_eq!(m.state, JumpState::Jump);
        assert!(!m.armed(), "disabled sources track state but never leap");
    }

    #[test]
    fn outcome_failure_classification() {
        assert!(TaskOutcome::NotFound.is_failure());
        assert!(TaskOutcome::Blocked.is_failure());
        assert!(TaskOutcome::ParseFailed.is_failure());
        assert!(!TaskOutcome::Success.is_failure());
        assert!(!TaskOutcome::Skipped.is_failure());
    }
}
