//! TSV output pipeline.
//!
//! One append-only TSV file per crawl (`<source>_<timestamp>.tsv`, lines of
//! `URL<TAB>JSON<LF>`) plus one append-only crawled-URL log
//! (`<source>.txt`). Each file sits behind its own async mutex so parallel
//! workers cannot interleave partial lines. JSON is compact and
//! ASCII-escaped for downstream tooling.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::crawler::parser::ArticleRecord;
use crate::error::AppError;

/// Report returned by [`TsvSink::save_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub failed_urls: Vec<String>,
}

pub struct TsvSink {
    output_path: PathBuf,
    ids_path: PathBuf,
    tsv_file: Mutex<File>,
    ids_file: Mutex<File>,
}

impl TsvSink {
    /// Open (creating directories as needed) the crawl output file and the
    /// crawled-URL log for `source`. The TSV filename carries a local
    /// timestamp so every crawl gets its own file.
    pub fn open(source: &str, output_dir: &Path, ids_dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(output_dir)
            .map_err(|e| AppError::Storage(format!("sink: cannot create {}: {e}", output_dir.display())))?;
        fs::create_dir_all(ids_dir)
            .map_err(|e| AppError::Storage(format!("sink: cannot create {}: {e}", ids_dir.display())))?;

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M");
        let output_path = output_dir.join(format!("{source}_{timestamp}.tsv"));
        let ids_path = ids_dir.join(format!("{source}.txt"));

        let tsv_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&output_path)
            .map_err(|e| AppError::Storage(format!("sink: open {}: {e}", output_path.display())))?;
        let ids_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ids_path)
            .map_err(|e| AppError::Storage(format!("sink: open {}: {e}", ids_path.display())))?;

        info!(output = %output_path.display(), ids = %ids_path.display(), "TSV sink ready");

        Ok(Self {
            output_path,
            ids_path,
            tsv_file: Mutex::new(tsv_file),
            ids_file: Mutex::new(ids_file),
        })
    }

    /// Load the crawled-URL history for `source`, one URL per line.
    /// Missing file means a fresh start.
    pub fn load_history(source: &str, ids_dir: &Path) -> Vec<String> {
        let ids_path = ids_dir.join(format!("{source}.txt"));
        match fs::read_to_string(&ids_path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn ids_path(&self) -> &Path {
        &self.ids_path
    }

    /// Append one `URL<TAB>JSON<LF>` line. The JSON is compact with all
    /// non-ASCII characters `\uXXXX`-escaped.
    pub async fn save_item(&self, url: &str, record: &ArticleRecord) -> Result<(), AppError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AppError::Parser(format!("sink: serialize record for {url}: {e}")))?;
        let line = format!("{url}\t{}\n", ascii_escape(&json));

        let mut f = self.tsv_file.lock().await;
        f.write_all(line.as_bytes())
            .map_err(|e| AppError::Storage(format!("sink: write {url}: {e}")))?;
        Ok(())
    }

    /// Append `url` to the crawled-URL log. Called before the record is
    /// written so a crash never leaves an unlogged TSV line.
    pub async fn record_crawled(&self, url: &str) -> Result<(), AppError> {
        let mut f = self.ids_file.lock().await;
        f.write_all(format!("{url}\n").as_bytes())
            .map_err(|e| AppError::Storage(format!("sink: record {url}: {e}")))?;
        Ok(())
    }

    /// Persist a batch, tolerating per-item failures.
    pub async fn save_batch(&self, items: &[(String, ArticleRecord)]) -> BatchReport {
        let mut report = BatchReport { total: items.len(), ..Default::default() };
        for (url, record) in items {
            match self.save_item(url, record).await {
                Ok(()) => report.success += 1,
                Err(e) => {
                    warn!(%url, error = %e, "batch item failed");
                    report.failed += 1;
                    report.failed_urls.push(url.clone());
                }
            }
        }
        info!(success = report.success, total = report.total, "batch save completed");
        report
    }
}

/// Escape every non-ASCII character in a JSON string as `\uXXXX`
/// (surrogate pairs beyond the BMP). Valid JSON only carries non-ASCII
/// inside string literals, so a character-level pass is safe.
pub fn ascii_escape(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        let cp = ch as u32;
        if cp < 0x80 {
            out.push(ch);
        } else if cp <= 0xFFFF {
            out.push_str(&format!("\\u{cp:04x}"));
        } else {
            let v = cp - 0x10000;
            let high = 0xD800 + (v >> 10);
            let low = 0xDC00 + (v & 0x3FF);
            out.push_str(&format!("\\u{high:04x}\\u{low:04x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str) -> ArticleRecord {
        ArticleRecord {
            schema_type: "NewsArticle".into(),
            headline: "測試標題".into(),
            article_body: "第一句。第二句。".into(),
            author: "記者".into(),
            publisher: "測試社".into(),
            date_published: "2025-01-01T00:00:00".into(),
            in_language: "zh-TW".into(),
            url: url.into(),
            keywords: vec!["台灣".into()],
        }
    }

    #[test]
    fn ascii_escape_basic() {
        assert_eq!(ascii_escape("abc"), "abc");
        assert_eq!(ascii_escape("中"), "\\u4e2d");
        // Astral plane goes through a surrogate pair.
        assert_eq!(ascii_escape("𝄞"), "\\ud834\\udd1e");
    }

    #[test]
    fn ascii_escape_round_trips_through_serde() {
        let original = serde_json::json!({"headline": "晶片法案", "n": 1});
        let escaped = ascii_escape(&serde_json::to_string(&original).unwrap());
        assert!(escaped.is_ascii());
        let back: serde_json::Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(back, original);
    }

    #[tokio::test]
    async fn save_item_writes_one_tab_one_newline() {
        let dir = TempDir::new().unwrap();
        let sink = TsvSink::open("demo", &dir.path().join("out"), &dir.path().join("ids")).unwrap();
        let url = "https://example.com/news/1";
        sink.record_crawled(url).await.unwrap();
        sink.save_item(url, &record(url)).await.unwrap();

        let content = fs::read_to_string(sink.output_path()).unwrap();
        let line = content.strip_suffix('\n').unwrap();
        assert_eq!(line.matches('\t').count(), 1);
        let (got_url, json) = line.split_once('\t').unwrap();
        assert_eq!(got_url, url);
        assert!(json.is_ascii());
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(v["@type"], "NewsArticle");
        assert_eq!(v["headline"], "測試標題");

        let ids = fs::read_to_string(sink.ids_path()).unwrap();
        assert_eq!(ids, format!("{url}\n"));
    }

    #[tokio::test]
    async fn history_round_trip() {
        let dir = TempDir::new().unwrap();
        let ids_dir = dir.path().join("ids");
        {
            let sink = TsvSink::open("demo", &dir.path().join("out"), &ids_dir).unwrap();
            sink.record_crawled("https://example.com/a").await.unwrap();
            sink.record_crawled("https://example.com/b").await.unwrap();
        }
        let history = TsvSink::load_history("demo", &ids_dir);
        assert_eq!(history, vec!["https://example.com/a", "https://example.com/b"]);
        assert!(TsvSink::load_history("other", &ids_dir).is_empty());
    }

    #[tokio::test]
    async fn save_batch_reports_counts() {
        let dir = TempDir::new().unwrap();
        let sink = TsvSink::open("demo", &dir.path().join("out"), &dir.path().join("ids")).unwrap();
        let items = vec![
            ("https://example.com/1".to_string(), record("https://example.com/1")),
            ("https://example.com/2".to_string(), record("https://example.com/2")),
        ];
        let report = sink.save_batch(&items).await;
        assert_eq!(report.total, 2);
        assert_eq!(report.success, 2);
        assert!(report.failed_urls.is_empty());
    }
}
