//! Integration tests for the indexing half, including the TSV boundary
//! between the crawler sink and the ingestion engine.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use newsvault::Config;
use newsvault::config;
use newsvault::crawler::parser::ArticleRecord;
use newsvault::crawler::sink::TsvSink;
use newsvault::error::AppError;
use newsvault::indexing::chunker::{Chunker, parse_chunk_id};
use newsvault::indexing::index::PayloadSink;
use newsvault::indexing::ingest::IngestionEngine;
use newsvault::indexing::pipeline::{IndexingPipeline, PipelineCheckpoint};
use newsvault::indexing::rollback::{BackupPayload, MigrationStatus, RollbackManager};
use newsvault::indexing::tiers::{SourceTier, SourceTiers};
use newsvault::indexing::vault::{MapPayload, VaultStorage};

// ── helpers ──────────────────────────────────────────────────────────────────

fn test_config(dir: &TempDir) -> Config {
    let toml = format!(
        r#"
[core]
data_dir = "{}"
log_level = "error"

[tiers]
"cna.com.tw" = 1
"example.com" = 2
"#,
        dir.path().display()
    );
    let path = dir.path().join("config.toml");
    std::fs::write(&path, toml).unwrap();
    config::load_from(&path, None, None).unwrap()
}

/// Payload sink whose contents stay visible to the test.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<MapPayload>>>);

impl PayloadSink for SharedSink {
    fn ship(&mut self, payloads: Vec<MapPayload>) -> Result<(), AppError> {
        self.0.lock().unwrap().extend(payloads);
        Ok(())
    }
}

fn pipeline_with_sink(config: &Config) -> (IndexingPipeline, SharedSink) {
    let vault = VaultStorage::open(&config.vault_db_path(), config.vault.clone()).unwrap();
    let sink = SharedSink::default();
    let pipeline = IndexingPipeline::new(config, vault, Box::new(sink.clone()));
    (pipeline, sink)
}

fn record(url: &str, body: &str) -> ArticleRecord {
    ArticleRecord {
        schema_type: "NewsArticle".into(),
        headline: "台灣產業動態".into(),
        article_body: body.into(),
        author: "王記者".into(),
        publisher: "測試社".into(),
        date_published: "2025-01-01T08:00:00+08:00".into(),
        in_language: "zh-TW".into(),
        url: url.into(),
        keywords: vec!["產業".into(), "台灣".into()],
    }
}

fn long_body() -> String {
    "台灣半導體產業在今年展現強勁成長動能。供應鏈持續擴張，帶動周邊產業同步受惠。專家認為後續仍有上行空間。".repeat(4)
}

// ── crawler TSV → indexer boundary ───────────────────────────────────────────

#[tokio::test]
async fn sink_output_feeds_pipeline_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // Crawler side: write real sink output.
    let sink = TsvSink::open("example", &config.output_dir(), &config.crawled_ids_dir()).unwrap();
    let body = long_body();
    for n in 1..=3 {
        let url = format!("https://www.example.com/news/{n}");
        sink.record_crawled(&url).await.unwrap();
        sink.save_item(&url, &record(&url, &body)).await.unwrap();
    }
    let tsv_path = sink.output_path().to_path_buf();

    // Indexer side: the same file ingests cleanly.
    let (mut pipeline, shipped) = pipeline_with_sink(&config);
    let result = pipeline.process_tsv(&tsv_path, None).unwrap();
    assert_eq!(result.success, 3);
    assert_eq!(result.failed, 0);
    assert_eq!(result.buffered, 0);
    assert!(result.total_chunks >= 3);

    // Vault round-trip: stored text reassembles each article body.
    let vault = VaultStorage::open(&config.vault_db_path(), config.vault.clone()).unwrap();
    for n in 1..=3 {
        let url = format!("https://www.example.com/news/{n}");
        let texts = vault.get_article_chunks(&url).unwrap();
        assert!(!texts.is_empty());
        assert_eq!(texts.concat(), body);
    }

    // Map payloads: chunk ids round-trip and the site came from the URL.
    let payloads = shipped.0.lock().unwrap();
    assert_eq!(payloads.len(), result.total_chunks);
    for payload in payloads.iter() {
        let (url, idx) = parse_chunk_id(&payload.url).expect("chunk id parses");
        assert!(url.starts_with("https://www.example.com/news/"));
        assert_eq!(payload.site, "example.com");
        let schema: serde_json::Value = serde_json::from_str(&payload.schema_json).unwrap();
        assert_eq!(schema["chunk_index"], idx);
    }
}

#[tokio::test]
async fn ingestion_round_trip_matches_wire_shape() {
    // The canonical scenario: minimal JSON-LD through ingestion + chunker.
    let line = concat!(
        "https://x/y\t",
        r#"{"headline":"H","articleBody":"S1。S2。S3。","#,
        r#""datePublished":"2025-01-01T00:00:00+08:00","url":"https://x/y"}"#
    );
    let cdm = IngestionEngine::new().parse_tsv_line(line).unwrap();
    assert!(cdm.is_valid);
    assert_eq!(cdm.source_id, "x");
    assert_eq!(cdm.date_published.unwrap().to_string(), "2025-01-01 00:00:00");

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let chunks = Chunker::new(config.chunking.clone()).chunk_article(&cdm);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].sentences, vec!["S1。", "S2。", "S3。"]);
    assert_eq!(chunks[0].chunk_id, "https://x/y::chunk::0");
}

// ── resumable pipeline ───────────────────────────────────────────────────────

#[test]
fn killed_run_resumes_where_it_stopped() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let body = long_body();
    let lines: Vec<String> = (1..=50)
        .map(|n| {
            format!(
                "https://www.example.com/news/{n}\t{}",
                serde_json::json!({
                    "headline": format!("標題{n}"),
                    "articleBody": body,
                    "datePublished": "2025-01-01T00:00:00+08:00",
                })
            )
        })
        .collect();
    let tsv = dir.path().join("input.tsv");
    std::fs::write(&tsv, lines.join("\n") + "\n").unwrap();

    // First "run" dies after 25 articles: simulate by planting the
    // checkpoint that run would have flushed.
    let cp_path = IndexingPipeline::default_checkpoint_path(&tsv);
    assert!(PipelineCheckpoint::load(&cp_path).unwrap().is_none());
    let cp = PipelineCheckpoint {
        tsv_path: tsv.display().to_string(),
        processed_urls: (1..=25)
            .map(|n| format!("https://www.example.com/news/{n}"))
            .collect(),
        failed_urls: Default::default(),
        last_processed_line: 24,
        started_at: "2025-01-01T00:00:00Z".into(),
        updated_at: "2025-01-01T00:00:00Z".into(),
    };
    std::fs::write(&cp_path, serde_json::to_string(&cp).unwrap()).unwrap();

    let (mut pipeline, _) = pipeline_with_sink(&config);

    let second = pipeline.process_tsv_resumable(&tsv, None, None).unwrap();
    // Line 24 is re-read but its URL is known; lines 25..49 do real work.
    assert_eq!(second.success, 25);
    assert_eq!(second.skipped, 1);
    assert!(!cp_path.exists(), "checkpoint removed after clean finish");

    // Combined coverage: every article is in the vault exactly once.
    let vault = VaultStorage::open(&config.vault_db_path(), config.vault.clone()).unwrap();
    for n in 26..=50 {
        let url = format!("https://www.example.com/news/{n}");
        assert!(!vault.get_article_chunks(&url).unwrap().is_empty(), "missing {url}");
    }
}

#[test]
fn resume_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let body = long_body();
    let lines: Vec<String> = (1..=5)
        .map(|n| {
            format!(
                "https://www.example.com/news/{n}\t{}",
                serde_json::json!({"headline": "H", "articleBody": body})
            )
        })
        .collect();
    let tsv = dir.path().join("input.tsv");
    std::fs::write(&tsv, lines.join("\n") + "\n").unwrap();

    let (mut pipeline, _) = pipeline_with_sink(&config);
    let first = pipeline.process_tsv_resumable(&tsv, None, None).unwrap();
    let (mut pipeline, _) = pipeline_with_sink(&config);
    let second = pipeline.process_tsv_resumable(&tsv, None, None).unwrap();

    // A finished run removed its checkpoint, so the rerun processes the
    // file afresh and lands on the same URL set (vault upserts).
    assert_eq!(first.success, 5);
    assert_eq!(second.success, 5);
    let vault = VaultStorage::open(&config.vault_db_path(), config.vault.clone()).unwrap();
    let texts = vault.get_article_chunks("https://www.example.com/news/3").unwrap();
    assert_eq!(texts.concat(), body);
}

// ── rollback lifecycle ───────────────────────────────────────────────────────

#[test]
fn migration_rollback_scenario() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let manager = RollbackManager::open(&config.rollback_db_path()).unwrap();

    let migration_id = manager.start("example.com").unwrap();
    let payloads: Vec<BackupPayload> = (0..3)
        .map(|i| BackupPayload {
            point_id: format!("point-{i}"),
            payload: serde_json::json!({"name": format!("摘要{i}"), "site": "example.com"}),
        })
        .collect();
    manager.backup_payloads(&migration_id, &payloads).unwrap();

    // Simulated failure: the migration never completes.
    manager.mark_rolled_back(&migration_id).unwrap();

    let record = manager.get_migration(&migration_id).unwrap().unwrap();
    assert_eq!(record.status, MigrationStatus::RolledBack);

    let restored = manager.get_backup_payloads(&migration_id).unwrap();
    assert_eq!(restored.len(), 3);
    assert_eq!(restored, payloads);

    // Day-zero cleanup sweeps the finished migration's backups.
    let removed = manager.cleanup_old_backups(0).unwrap();
    assert_eq!(removed, 3);
    assert!(manager.get_backup_payloads(&migration_id).unwrap().is_empty());
}

// ── tiers from config ────────────────────────────────────────────────────────

#[test]
fn tiers_load_from_config_table() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let tiers = SourceTiers::from_config(&config.tiers);
    assert_eq!(tiers.tier_for("cna.com.tw"), SourceTier::Authoritative);
    assert_eq!(tiers.tier_for("example.com"), SourceTier::Verified);
    assert_eq!(tiers.tier_for("unknown.example"), SourceTier::Standard);
}
