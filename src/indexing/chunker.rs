//! Length-targeted, sentence-bounded chunking.
//!
//! Bodies split at Chinese end-punctuation (。！？, punctuation kept with
//! its sentence), accumulate greedily toward `target_length` characters and
//! merge an undersized trailing chunk into its predecessor. Each chunk gets
//! an extractive summary (headline + first/middle/last sentence). All
//! lengths and offsets count characters, not bytes.

use serde::{Deserialize, Serialize};

use crate::config::ChunkingConfig;
use crate::indexing::ingest::CanonicalDataModel;

const CHUNK_ID_SEPARATOR: &str = "::chunk::";

/// A contiguous, sentence-bounded slice of an article body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// `<article_url>::chunk::<index>` — wire format, parsed downstream.
    pub chunk_id: String,
    pub article_url: String,
    pub chunk_index: usize,
    pub sentences: Vec<String>,
    pub full_text: String,
    /// Headline + representative sentences, capped at `summary_max_length`.
    pub summary: String,
    /// Character offsets into the (trimmed) article body.
    pub char_start: usize,
    pub char_end: usize,
}

/// `::chunk::` keeps article URLs (which may contain `#`) unambiguous.
pub fn make_chunk_id(article_url: &str, chunk_index: usize) -> String {
    format!("{article_url}{CHUNK_ID_SEPARATOR}{chunk_index}")
}

/// Inverse of [`make_chunk_id`]. Splits on the *last* separator so URLs
/// containing the marker still round-trip.
pub fn parse_chunk_id(chunk_id: &str) -> Option<(&str, usize)> {
    let (url, idx) = chunk_id.rsplit_once(CHUNK_ID_SEPARATOR)?;
    Some((url, idx.parse().ok()?))
}

pub struct Chunker {
    cfg: ChunkingConfig,
}

impl Chunker {
    pub fn new(cfg: ChunkingConfig) -> Self {
        Self { cfg }
    }

    /// Chunk one article. Bodies strictly shorter than
    /// `short_article_threshold` become a single chunk.
    pub fn chunk_article(&self, cdm: &CanonicalDataModel) -> Vec<Chunk> {
        let text = cdm.article_body.trim();
        let total_chars = text.chars().count();

        if total_chars < self.cfg.short_article_threshold {
            let sentences = split_sentences(text);
            if sentences.is_empty() {
                return Vec::new();
            }
            return vec![self.build_chunk(cdm, sentences, 0, 0, total_chars)];
        }

        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;
        let mut char_position = 0usize;

        for sentence in sentences {
            let sentence_len = sentence.chars().count();

            // Flush before the sentence that would overflow the target;
            // a buffer sitting exactly at the target flushes too.
            if current_len + sentence_len > self.cfg.target_length && !current.is_empty() {
                chunks.push(self.build_chunk(
                    cdm,
                    std::mem::take(&mut current),
                    chunks.len(),
                    char_position - current_len,
                    char_position,
                ));
                current_len = 0;
            }

            current.push(sentence);
            current_len += sentence_len;
            char_position += sentence_len;
        }

        if !current.is_empty() {
            if current_len < self.cfg.min_length && !chunks.is_empty() {
                // Trailing runt: extend the previous chunk instead.
                let last = chunks.len() - 1;
                let mut merged = chunks[last].sentences.clone();
                merged.extend(current);
                let char_start = chunks[last].char_start;
                chunks[last] = self.build_chunk(cdm, merged, last, char_start, char_position);
            } else {
                chunks.push(self.build_chunk(
                    cdm,
                    current,
                    chunks.len(),
                    char_position - current_len,
                    char_position,
                ));
            }
        }

        chunks
    }

    fn build_chunk(
        &self,
        cdm: &CanonicalDataModel,
        sentences: Vec<String>,
        chunk_index: usize,
        char_start: usize,
        char_end: usize,
    ) -> Chunk {
        let full_text = sentences.concat();
        let summary = self.summarize(&cdm.headline, &sentences);
        Chunk {
            chunk_id: make_chunk_id(&cdm.url, chunk_index),
            article_url: cdm.url.clone(),
            chunk_index,
            sentences,
            full_text,
            summary,
            char_start,
            char_end,
        }
    }

    /// Inverted-pyramid extract: first, middle and last sentence of the
    /// chunk, headline prepended, truncated with a `...` suffix.
    fn summarize(&self, headline: &str, sentences: &[String]) -> String {
        let selected: Vec<&str> = if sentences.len() <= 2 {
            sentences.iter().map(String::as_str).collect()
        } else if self.cfg.extractive_sentences <= 2 {
            vec![&sentences[0], &sentences[sentences.len() - 1]]
        } else {
            let mid = sentences.len() / 2;
            vec![&sentences[0], &sentences[mid], &sentences[sentences.len() - 1]]
        };

        let content = selected.concat();
        let summary = if headline.is_empty() {
            content
        } else {
            format!("{headline}。{content}")
        };

        if summary.chars().count() > self.cfg.summary_max_length {
            let keep: String = summary
                .chars()
                .take(self.cfg.summary_max_length.saturating_sub(3))
                .collect();
            format!("{keep}...")
        } else {
            summary
        }
    }
}

/// Split at 。！？, keeping the punctuation with the preceding sentence.
/// A trailing un-terminated fragment is kept unless it is blank.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '。' | '！' | '？') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}
