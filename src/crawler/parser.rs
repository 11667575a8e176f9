//! Site-adapter contract.
//!
//! Every news source implements [`SiteParser`]. The fetch engine depends only
//! on this trait; site-specific URL schemes and HTML structure stay inside the
//! adapters under [`crate::crawler::sources`].
//!
//! Capabilities the original system probed at runtime are declared up front:
//! [`ParserKind`] (range- vs list-based ID discovery), [`IdScheme`]
//! (sequential vs date-encoded IDs) and [`TransportKind`] (preferred HTTP
//! profile), so the engine's branching is type-directed.

#![allow(async_fn_in_trait)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::crawler::transport::Transport;
use crate::error::AppError;

/// How a source exposes article IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// IDs form a dense-enough numeric range; the engine sweeps it.
    RangeBased,
    /// IDs exist only in listing pages; the engine consumes the
    /// discovered set in declared order.
    ListBased,
}

/// Structure of a source's numeric IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    /// Plain monotonically-assigned serial numbers.
    Sequential,
    /// `YYYYMMDD` prefix followed by `suffix_digits` serial digits
    /// (4 → 12-digit IDs, 6 → 14-digit IDs, 0 → bare dates).
    DateEncoded { suffix_digits: u8 },
}

/// Preferred HTTP transport profile for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Standard pooled client.
    Standard,
    /// Browser-impersonating header profile, for sites that fingerprint
    /// clients.
    Impersonating,
}

/// One news article normalized to the Schema.org `NewsArticle` shape.
///
/// Field order matches the wire format written to the TSV sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(rename = "@type")]
    pub schema_type: String,
    pub headline: String,
    #[serde(rename = "articleBody")]
    pub article_body: String,
    pub author: String,
    pub publisher: String,
    #[serde(rename = "datePublished")]
    pub date_published: String,
    #[serde(rename = "inLanguage")]
    pub in_language: String,
    pub url: String,
    pub keywords: Vec<String>,
}

impl ArticleRecord {
    /// Minimal well-formedness check applied before a record leaves a parser:
    /// non-empty headline and body. Deeper validation belongs to the
    /// indexing quality gate.
    pub fn is_well_formed(&self) -> bool {
        !self.headline.trim().is_empty() && !self.article_body.trim().is_empty()
    }
}

/// Contract every site adapter implements.
///
/// `parse` and the capability getters are pure and synchronous; only
/// `latest_id` and `date_for` touch the network, and both go through the
/// engine-owned [`Transport`].
pub trait SiteParser: Send + Sync {
    /// Stable source identifier (`"ltn"`, `"cna"`, …).
    fn source_name(&self) -> &'static str;

    fn kind(&self) -> ParserKind {
        ParserKind::RangeBased
    }

    fn id_scheme(&self) -> IdScheme {
        IdScheme::Sequential
    }

    fn preferred_transport(&self) -> TransportKind {
        TransportKind::Standard
    }

    /// Deterministic URL for a numeric ID. `None` when the source is
    /// list-based and the ID has not been discovered in a list scan.
    fn url_for(&self, article_id: u64) -> Option<String>;

    /// Discovered IDs in declared order; empty for range-based sources.
    fn discovered_ids(&self) -> Vec<u64> {
        Vec::new()
    }

    /// Best-effort latest available ID.
    async fn latest_id(&self, transport: &Transport) -> Result<Option<u64>, AppError>;

    /// Lightweight publish-date lookup for the date navigator. Must not
    /// require full article parsing; date-encoded sources answer from the
    /// ID alone.
    async fn date_for(&self, article_id: u64, transport: &Transport) -> Option<NaiveDateTime>;

    /// HTML → article record, or `None` when the content is unusable
    /// (body too short, parse failure, blocked-page placeholder).
    fn parse(&self, html: &str, url: &str) -> Option<ArticleRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_well_formedness() {
        let mut r = ArticleRecord {
            schema_type: "NewsArticle".into(),
            headline: "標題".into(),
            article_body: "內文。".into(),
            author: String::new(),
            publisher: "測試".into(),
            date_published: "2025-01-01T00:00:00".into(),
            in_language: "zh-TW".into(),
            url: "https://example.com/1".into(),
            keywords: vec![],
        };
        assert!(r.is_well_formed());
        r.article_body = "   ".into();
        assert!(!r.is_well_formed());
    }

    #[test]
    fn record_serializes_wire_keys() {
        let r = ArticleRecord {
            schema_type: "NewsArticle".into(),
            headline: "H".into(),
            article_body: "B".into(),
            author: "A".into(),
            publisher: "P".into(),
            date_published: "2025-01-01T00:00:00".into(),
            in_language: "zh-TW".into(),
            url: "https://example.com/1".into(),
            keywords: vec!["k1".into()],
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"@type\":\"NewsArticle\""));
        assert!(json.contains("\"articleBody\":\"B\""));
        assert!(json.contains("\"datePublished\""));
        assert!(json.contains("\"inLanguage\""));
        assert!(json.contains("\"keywords\":[\"k1\"]"));
    }
}
