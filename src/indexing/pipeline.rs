//! Indexing pipeline: TSV → quality gate → chunker → vault + map payloads.
//!
//! Two modes: transient (iterate and count) and resumable (a JSON
//! checkpoint records the processed URLs and last line, is flushed every
//! `checkpoint_interval` articles and on any error, and is deleted on a
//! clean finish — so a killed run restarts where it stopped and re-running
//! a finished TSV starts fresh).
//!
//! The vault handle and payload sink are owned by the pipeline and passed
//! in at construction; there are no process-global stores.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::AppError;
use crate::indexing::chunker::Chunker;
use crate::indexing::index::PayloadSink;
use crate::indexing::ingest::{CanonicalDataModel, IngestionEngine};
use crate::indexing::quality::QualityGate;
use crate::indexing::tiers::SourceTiers;
use crate::indexing::vault::{MapPayload, VaultStorage};

/// Resumable-run state, serialized as JSON next to the TSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub tsv_path: String,
    #[serde(default)]
    pub processed_urls: BTreeSet<String>,
    /// url → error for articles that failed with a storage/sink error.
    #[serde(default)]
    pub failed_urls: HashMap<String, String>,
    #[serde(default)]
    pub last_processed_line: usize,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl PipelineCheckpoint {
    fn new(tsv_path: &Path) -> Self {
        let now = now_iso8601();
        Self {
            tsv_path: tsv_path.display().to_string(),
            processed_urls: BTreeSet::new(),
            failed_urls: HashMap::new(),
            last_processed_line: 0,
            started_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, AppError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Storage(format!("checkpoint: read {}: {e}", path.display())))?;
        let checkpoint = serde_json::from_str(&raw)
            .map_err(|e| AppError::Storage(format!("checkpoint: parse {}: {e}", path.display())))?;
        Ok(Some(checkpoint))
    }

    fn save(&mut self, path: &Path) -> Result<(), AppError> {
        self.updated_at = now_iso8601();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("checkpoint: create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Storage(format!("checkpoint: serialize: {e}")))?;
        fs::write(path, json)
            .map_err(|e| AppError::Storage(format!("checkpoint: write {}: {e}", path.display())))
    }
}

/// Run counters. `total_chunks` counts vault rows written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineResult {
    pub success: usize,
    pub failed: usize,
    pub buffered: usize,
    pub skipped: usize,
    pub total_chunks: usize,
}

enum ArticleOutcome {
    Stored(usize),
    Buffered,
    Skipped,
}

pub struct IndexingPipeline {
    ingestion: IngestionEngine,
    quality_gate: QualityGate,
    chunker: Chunker,
    tiers: SourceTiers,
    vault: VaultStorage,
    sink: Box<dyn PayloadSink>,
    checkpoint_interval: usize,
    buffer_path: PathBuf,
}

impl IndexingPipeline {
    pub fn new(config: &Config, vault: VaultStorage, sink: Box<dyn PayloadSink>) -> Self {
        Self {
            ingestion: IngestionEngine::new(),
            quality_gate: QualityGate::new(config.quality.clone()),
            chunker: Chunker::new(config.chunking.clone()),
            tiers: SourceTiers::from_config(&config.tiers),
            vault,
            sink,
            checkpoint_interval: config.pipeline.checkpoint_interval,
            buffer_path: config.buffer_path(),
        }
    }

    pub fn tiers(&self) -> &SourceTiers {
        &self.tiers
    }

    /// Default checkpoint location for a TSV: `<tsv>.checkpoint.json`.
    pub fn default_checkpoint_path(tsv_path: &Path) -> PathBuf {
        PathBuf::from(format!("{}.checkpoint.json", tsv_path.display()))
    }

    /// Transient mode: iterate the whole file, accumulate counters.
    pub fn process_tsv(
        &mut self,
        tsv_path: &Path,
        site_override: Option<&str>,
    ) -> Result<PipelineResult, AppError> {
        info!(tsv = %tsv_path.display(), "starting transient pipeline run");
        let mut result = PipelineResult::default();
        let mut seen: HashSet<String> = HashSet::new();

        for cdm in self.ingestion.parse_tsv_file(tsv_path)? {
            self.step(cdm, site_override, &mut seen, &mut result, None);
        }

        log_result(&result);
        Ok(result)
    }

    /// Resumable mode. Lines before the checkpointed position are skipped
    /// outright; URLs already processed count as SKIPPED. The checkpoint
    /// is flushed every `checkpoint_interval` processed articles, flushed
    /// again on any systemic error, and removed on clean completion.
    pub fn process_tsv_resumable(
        &mut self,
        tsv_path: &Path,
        checkpoint_file: Option<&Path>,
        site_override: Option<&str>,
    ) -> Result<PipelineResult, AppError> {
        let checkpoint_path = checkpoint_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default_checkpoint_path(tsv_path));

        let mut checkpoint = match PipelineCheckpoint::load(&checkpoint_path)? {
            Some(cp) => {
                info!(
                    line = cp.last_processed_line,
                    processed = cp.processed_urls.len(),
                    "resuming from checkpoint"
                );
                cp
            }
            None => PipelineCheckpoint::new(tsv_path),
        };

        info!(tsv = %tsv_path.display(), checkpoint = %checkpoint_path.display(), "starting resumable pipeline run");

        let mut result = PipelineResult::default();
        let outcome = self.run_resumable(
            tsv_path,
            site_override,
            &mut checkpoint,
            &checkpoint_path,
            &mut result,
        );

        match outcome {
            Ok(()) => {
                if checkpoint_path.exists() {
                    fs::remove_file(&checkpoint_path).map_err(|e| {
                        AppError::Storage(format!(
                            "checkpoint: remove {}: {e}",
                            checkpoint_path.display()
                        ))
                    })?;
                }
                log_result(&result);
                Ok(result)
            }
            Err(e) => {
                // Flush state so the run stays resumable, then surface.
                if let Err(save_err) = checkpoint.save(&checkpoint_path) {
                    error!(error = %save_err, "failed to flush checkpoint after error");
                }
                Err(e)
            }
        }
    }

    fn run_resumable(
        &mut self,
        tsv_path: &Path,
        site_override: Option<&str>,
        checkpoint: &mut PipelineCheckpoint,
        checkpoint_path: &Path,
        result: &mut PipelineResult,
    ) -> Result<(), AppError> {
        let content = fs::read_to_string(tsv_path)
            .map_err(|e| AppError::Validation(format!("cannot read {}: {e}", tsv_path.display())))?;

        let mut seen: HashSet<String> = checkpoint.processed_urls.iter().cloned().collect();

        for (line_num, line) in content.lines().enumerate() {
            if line_num < checkpoint.last_processed_line {
                continue;
            }
            let Some(cdm) = self.ingestion.parse_tsv_line(line) else {
                continue;
            };

            if checkpoint.processed_urls.contains(&cdm.url) {
                result.skipped += 1;
                continue;
            }

            let url = cdm.url.clone();
            self.step(cdm, site_override, &mut seen, result, Some(&mut *checkpoint));

            let processed = result.success + result.failed + result.buffered;
            if processed > 0 && processed % self.checkpoint_interval == 0 {
                checkpoint.last_processed_line = line_num;
                checkpoint.save(checkpoint_path)?;
                debug!(line = line_num, %url, "checkpoint flushed");
            }
        }
        Ok(())
    }

    /// One article through gate → chunker → vault → sink, with per-article
    /// failures folded into counters.
    fn step(
        &mut self,
        cdm: CanonicalDataModel,
        site_override: Option<&str>,
        seen: &mut HashSet<String>,
        result: &mut PipelineResult,
        checkpoint: Option<&mut PipelineCheckpoint>,
    ) {
        let url = cdm.url.clone();
        match self.process_article(cdm, site_override, seen) {
            Ok(ArticleOutcome::Stored(chunks)) => {
                result.success += 1;
                result.total_chunks += chunks;
                if let Some(cp) = checkpoint {
                    cp.processed_urls.insert(url);
                }
            }
            Ok(ArticleOutcome::Buffered) => {
                result.buffered += 1;
                if let Some(cp) = checkpoint {
                    cp.processed_urls.insert(url);
                }
            }
            Ok(ArticleOutcome::Skipped) => {
                result.skipped += 1;
            }
            Err(e) => {
                error!(%url, error = %e, "article failed");
                result.failed += 1;
                if let Some(cp) = checkpoint {
                    cp.failed_urls.insert(url, e.to_string());
                }
            }
        }
    }

    fn process_article(
        &mut self,
        cdm: CanonicalDataModel,
        site_override: Option<&str>,
        seen: &mut HashSet<String>,
    ) -> Result<ArticleOutcome, AppError> {
        if self.quality_gate.is_duplicate(&cdm.url, seen) {
            debug!(url = %cdm.url, "duplicate URL, skipping");
            return Ok(ArticleOutcome::Skipped);
        }

        let verdict = self.quality_gate.validate(&cdm);
        if !verdict.passed() {
            self.buffer_article(&cdm, &verdict.failure_reasons)?;
            seen.insert(cdm.url);
            return Ok(ArticleOutcome::Buffered);
        }

        let site = site_override.unwrap_or(&cdm.source_id).to_string();
        debug!(url = %cdm.url, %site, tier = self.tiers.label_for(&site), "article passed gate");

        let chunks = self.chunker.chunk_article(&cdm);
        if chunks.is_empty() {
            seen.insert(cdm.url);
            return Ok(ArticleOutcome::Buffered);
        }

        // All chunks of one article land in one transaction.
        self.vault.store_chunks(&chunks)?;

        let payloads: Vec<MapPayload> = chunks
            .iter()
            .map(|c| MapPayload::from_chunk(c, &site))
            .collect();
        let count = chunks.len();
        self.sink.ship(payloads)?;

        seen.insert(cdm.url);
        Ok(ArticleOutcome::Stored(count))
    }

    /// Append a rejected article to the review buffer (JSON lines).
    fn buffer_article(
        &self,
        cdm: &CanonicalDataModel,
        reasons: &[String],
    ) -> Result<(), AppError> {
        if let Some(parent) = self.buffer_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("buffer: create {}: {e}", parent.display()))
            })?;
        }
        let entry = json!({
            "url": cdm.url,
            "headline": cdm.headline,
            "source_id": cdm.source_id,
            "reasons": reasons,
            "timestamp": now_iso8601(),
        });
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.buffer_path)
            .map_err(|e| {
                AppError::Storage(format!("buffer: open {}: {e}", self.buffer_path.display()))
            })?;
        writeln!(file, "{entry}")
            .map_err(|e| AppError::Storage(format!("buffer: write: {e}")))
    }
}

fn log_result(result: &PipelineResult) {
    info!(
        success = result.success,
        failed = result.failed,
        buffered = result.buffered,
        skipped = result.skipped,
        total_chunks = result.total_chunks,
        "pipeline run finished"
    );
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
