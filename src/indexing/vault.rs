//! The Vault — compressed full-text blob store — and the Map payload
//! builder for the external vector index.
//!
//! ## Schema
//! One table, `article_chunks`: primary key `chunk_id`, zstd-compressed
//! text, original/compressed lengths, format version, soft-delete flag.
//! The connection runs WAL so pipeline writes coexist with readers.
//!
//! ## Compression
//! Level adapts to text length (cheap level for short chunks, heavier for
//! long ones). Reads fall back to raw bytes when a blob predates
//! compression.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde_json::json;

use crate::config::VaultTuning;
use crate::error::AppError;
use crate::indexing::chunker::Chunk;

/// Blob format version written with every row.
const VAULT_VERSION: i64 = 2;

pub struct VaultStorage {
    db_path: PathBuf,
    tuning: VaultTuning,
}

impl VaultStorage {
    /// Open (or create) the vault at `db_path` and ensure the schema.
    pub fn open(db_path: &Path, tuning: VaultTuning) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("vault: cannot create {}: {e}", parent.display()))
            })?;
        }
        let store = Self { db_path: db_path.to_path_buf(), tuning };
        let conn = store.open_conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS article_chunks (
                chunk_id TEXT PRIMARY KEY,
                article_url TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                full_text_compressed BLOB NOT NULL,
                original_length INTEGER,
                compressed_length INTEGER,
                version INTEGER DEFAULT 2,
                is_deleted INTEGER DEFAULT 0,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_article_url ON article_chunks(article_url);
            CREATE INDEX IF NOT EXISTS idx_version ON article_chunks(version);
            CREATE INDEX IF NOT EXISTS idx_is_deleted ON article_chunks(is_deleted);
            ",
        )
        .map_err(|e| AppError::Storage(format!("vault: initialize schema: {e}")))?;
        Ok(store)
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Storage(format!("vault: open {}: {e}", self.db_path.display())))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Storage(format!("vault: set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Storage(format!("vault: set busy_timeout: {e}")))?;
        Ok(conn)
    }

    fn compression_level(&self, text_chars: usize) -> i32 {
        if text_chars < self.tuning.short_threshold {
            self.tuning.short_compression
        } else if text_chars > self.tuning.long_threshold {
            self.tuning.long_compression
        } else {
            self.tuning.compression_level
        }
    }

    fn compress(&self, text: &str) -> Result<Vec<u8>, AppError> {
        let level = self.compression_level(text.chars().count());
        zstd::stream::encode_all(text.as_bytes(), level)
            .map_err(|e| AppError::Storage(format!("vault: compress: {e}")))
    }

    /// Decompress, or fall back to treating the blob as raw UTF-8 for rows
    /// written before compression existed.
    fn decompress(data: &[u8]) -> Result<String, AppError> {
        match zstd::stream::decode_all(data) {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|e| AppError::Storage(format!("vault: decompressed text not UTF-8: {e}"))),
            Err(_) => String::from_utf8(data.to_vec())
                .map_err(|e| AppError::Storage(format!("vault: raw blob not UTF-8: {e}"))),
        }
    }

    /// Store one chunk (upsert).
    pub fn store_chunk(&self, chunk: &Chunk) -> Result<(), AppError> {
        self.store_chunks(std::slice::from_ref(chunk))
    }

    /// Store chunks of one article in a single transaction, so readers
    /// never observe a partial article.
    pub fn store_chunks(&self, chunks: &[Chunk]) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("vault: begin tx: {e}")))?;

        let now = now_iso8601();
        for chunk in chunks {
            let compressed = self.compress(&chunk.full_text)?;
            tx.execute(
                "INSERT OR REPLACE INTO article_chunks
                 (chunk_id, article_url, chunk_index, full_text_compressed,
                  original_length, compressed_length, version, is_deleted, created_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, NULL)",
                params![
                    chunk.chunk_id,
                    chunk.article_url,
                    chunk.chunk_index as i64,
                    compressed,
                    chunk.full_text.chars().count() as i64,
                    compressed.len() as i64,
                    VAULT_VERSION,
                    now,
                ],
            )
            .map_err(|e| AppError::Storage(format!("vault: insert {}: {e}", chunk.chunk_id)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Storage(format!("vault: commit store_chunks: {e}")))
    }

    /// Full text for one chunk, or `None` if absent or soft-deleted.
    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<String>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT full_text_compressed FROM article_chunks
                 WHERE chunk_id = ?1 AND is_deleted = 0",
            )
            .map_err(|e| AppError::Storage(format!("vault: prepare get_chunk: {e}")))?;

        let blob: Option<Vec<u8>> = stmt
            .query_row(params![chunk_id], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(|e| AppError::Storage(format!("vault: get_chunk {chunk_id}: {e}")))?;

        blob.map(|b| Self::decompress(&b)).transpose()
    }

    /// All live chunk texts of an article, ordered by `chunk_index`.
    pub fn get_article_chunks(&self, article_url: &str) -> Result<Vec<String>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT full_text_compressed FROM article_chunks
                 WHERE article_url = ?1 AND is_deleted = 0
                 ORDER BY chunk_index",
            )
            .map_err(|e| AppError::Storage(format!("vault: prepare get_article_chunks: {e}")))?;

        let rows = stmt
            .query_map(params![article_url], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| AppError::Storage(format!("vault: query get_article_chunks: {e}")))?;

        let mut texts = Vec::new();
        for row in rows {
            let blob =
                row.map_err(|e| AppError::Storage(format!("vault: read chunk row: {e}")))?;
            texts.push(Self::decompress(&blob)?);
        }
        Ok(texts)
    }

    /// Soft delete: flips `is_deleted` and stamps `deleted_at`. Physical
    /// removal is a separate maintenance concern.
    pub fn soft_delete_chunks(&self, chunk_ids: &[String]) -> Result<usize, AppError> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("vault: begin delete tx: {e}")))?;

        let now = now_iso8601();
        let mut affected = 0usize;
        for chunk_id in chunk_ids {
            affected += tx
                .execute(
                    "UPDATE article_chunks SET is_deleted = 1, deleted_at = ?1 WHERE chunk_id = ?2",
                    params![now, chunk_id],
                )
                .map_err(|e| AppError::Storage(format!("vault: soft delete {chunk_id}: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Storage(format!("vault: commit delete tx: {e}")))?;
        Ok(affected)
    }

    /// Stored lengths `(original, compressed)` for one chunk row.
    pub fn stored_lengths(&self, chunk_id: &str) -> Result<Option<(usize, usize)>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            "SELECT original_length, compressed_length FROM article_chunks WHERE chunk_id = ?1",
            params![chunk_id],
            |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as usize)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::Storage(format!("vault: stored_lengths {chunk_id}: {other}"))),
        })
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Map payload ───────────────────────────────────────────────────────────────

/// The unit shipped to the external vector index: summary as the searchable
/// name, chunk id as the point URL, plus a schema blob locating the chunk
/// inside its article.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapPayload {
    /// The chunk id — downstream systems parse it back with
    /// [`crate::indexing::chunker::parse_chunk_id`].
    pub url: String,
    /// The extractive summary; this is what gets embedded.
    pub name: String,
    pub site: String,
    pub schema_json: String,
}

impl MapPayload {
    pub fn from_chunk(chunk: &Chunk, site: &str) -> Self {
        let schema = json!({
            "article_url": chunk.article_url,
            "chunk_index": chunk.chunk_index,
            "char_start": chunk.char_start,
            "char_end": chunk.char_end,
            "@type": "ArticleChunk",
            "version": VAULT_VERSION,
            "indexed_at": now_iso8601(),
        });
        Self {
            url: chunk.chunk_id.clone(),
            name: chunk.summary.clone(),
            site: site.to_string(),
            schema_json: schema.to_string(),
        }
    }
}
