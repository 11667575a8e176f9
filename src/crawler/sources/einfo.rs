//! E-Info (環境資訊中心) adapter — list-based over `/node/<id>` pages.
//!
//! Node IDs are sparse, so the adapter discovers the newest node from the
//! front-page listings and hands the engine a bounded descending window
//! below it rather than an open-ended range.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::crawler::parser::{ArticleRecord, ParserKind, SiteParser};
use crate::crawler::sources::extract;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

const BASE_URL: &str = "https://e-info.org.tw";
const MIN_ARTICLE_LENGTH: usize = 100;
const DEFAULT_WINDOW: usize = 100;

static NODE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/node/(\d+)").unwrap());

static DATE_IN_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[-/年](\d{2})[-/月](\d{2})").unwrap());

#[derive(Debug, Default)]
pub struct EinfoParser {
    discovered: Vec<u64>,
}

impl EinfoParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate the newest node on the front page and open a descending
    /// window of `window` IDs below it. Must run before a crawl; dead IDs
    /// inside the window resolve as NOT_FOUND during the sweep.
    pub async fn discover(
        &mut self,
        transport: &Transport,
        window: Option<usize>,
    ) -> Result<usize, AppError> {
        let FetchOutcome::Ok(html) = transport.get(BASE_URL).await else {
            warn!("einfo: front page unavailable, discovery failed");
            return Ok(0);
        };
        let Some(latest) = NODE_LINK
            .captures_iter(&html)
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max()
        else {
            warn!("einfo: no node links on front page");
            return Ok(0);
        };

        let window = window.unwrap_or(DEFAULT_WINDOW).max(1) as u64;
        let lowest = latest.saturating_sub(window - 1);
        self.discovered = (lowest..=latest).rev().collect();
        info!(latest, count = self.discovered.len(), "einfo: discovery finished");
        Ok(self.discovered.len())
    }

    /// Seed the window directly — test and replay path.
    pub fn with_discovered(ids: Vec<u64>) -> Self {
        Self { discovered: ids }
    }
}

impl SiteParser for EinfoParser {
    fn source_name(&self) -> &'static str {
        "einfo"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::ListBased
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        self.discovered
            .contains(&article_id)
            .then(|| format!("{BASE_URL}/node/{article_id}"))
    }

    fn discovered_ids(&self) -> Vec<u64> {
        self.discovered.clone()
    }

    async fn latest_id(&self, _transport: &Transport) -> Result<Option<u64>, AppError> {
        Ok(self.discovered.first().copied())
    }

    async fn date_for(&self, article_id: u64, transport: &Transport) -> Option<NaiveDateTime> {
        let url = format!("{BASE_URL}/node/{article_id}");
        let FetchOutcome::Ok(html) = transport.get(&url).await else {
            return None;
        };
        let caps = DATE_IN_PAGE.captures(&html)?;
        let (y, m, d) = (
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        chrono::NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)
    }

    fn parse(&self, html: &str, url: &str) -> Option<ArticleRecord> {
        let doc = Html::parse_document(html);
        let ld = extract::json_ld_news_article(&doc);

        let headline = ld
            .as_ref()
            .and_then(|v| extract::name_of(v.get("headline")))
            .or_else(|| extract::og_title(&doc))
            .or_else(|| extract::paragraphs(&doc, "h1.node-title, h1").into_iter().next())?;

        let body = ld
            .as_ref()
            .and_then(|v| v.get("articleBody"))
            .and_then(|v| v.as_str())
            .map(extract::clean_text)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| {
                extract::paragraphs(&doc, "div.field-name-body p, div.node-content p").join("")
            });

        if body.chars().count() < MIN_ARTICLE_LENGTH {
            debug!(%url, "einfo: body too short");
            return None;
        }

        let date_published = ld
            .as_ref()
            .and_then(|v| v.get("datePublished"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                DATE_IN_PAGE
                    .captures(html)
                    .map(|c| format!("{}-{}-{}T00:00:00", &c[1], &c[2], &c[3]))
            })?;

        let author = ld
            .as_ref()
            .and_then(|v| extract::name_of(v.get("author")))
            .map(|a| extract::clean_author(&a))
            .unwrap_or_default();

        Some(ArticleRecord {
            schema_type: "NewsArticle".into(),
            headline: extract::clean_text(&headline),
            article_body: body,
            author,
            publisher: "環境資訊中心".into(),
            date_published,
            in_language: "zh-TW".into(),
            url: url.to_string(),
            keywords: extract::meta_keywords(&doc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::transport::ScriptedResponse;

    #[tokio::test]
    async fn discover_opens_descending_window() {
        let front = r#"<a href="/node/242100">新文</a> <a href="/node/242099">舊文</a>"#;
        let t = Transport::scripted(vec![ScriptedResponse::ok(front)], true);
        let mut p = EinfoParser::new();
        let count = p.discover(&t, Some(5)).await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(p.discovered_ids(), vec![242100, 242099, 242098, 242097, 242096]);
        assert_eq!(p.url_for(242100).unwrap(), "https://e-info.org.tw/node/242100");
        assert!(p.url_for(1).is_none());
    }

    #[tokio::test]
    async fn seeded_window_answers_like_a_discovered_one() {
        let p = EinfoParser::with_discovered(vec![242100, 242099]);
        let t = Transport::scripted(Vec::new(), true);
        assert_eq!(p.latest_id(&t).await.unwrap(), Some(242100));
        assert!(p.url_for(242099).is_some());
        assert!(p.url_for(242098).is_none());
    }

    #[tokio::test]
    async fn discovery_failure_leaves_empty_window() {
        let t = Transport::scripted(vec![ScriptedResponse::status(404)], true);
        let mut p = EinfoParser::new();
        assert_eq!(p.discover(&t, None).await.unwrap(), 0);
        assert!(p.discovered_ids().is_empty());
    }

    #[test]
    fn parse_reads_drupal_body() {
        let sentence = "環境資訊中心報導指出，棲地保育工作需要長期投入。";
        let html = format!(
            r#"<html><head><meta property="og:title" content="保育專題" /></head>
            <body><span class="date">2025年06月15日</span>
            <div class="field-name-body">{}</div></body></html>"#,
            format!("<p>{}</p>", sentence).repeat(5)
        );
        let p = EinfoParser::new();
        let record = p.parse(&html, "https://e-info.org.tw/node/242100").unwrap();
        assert_eq!(record.headline, "保育專題");
        assert_eq!(record.publisher, "環境資訊中心");
        assert_eq!(record.date_published, "2025-06-15T00:00:00");
    }
}
