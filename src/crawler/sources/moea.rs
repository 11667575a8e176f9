//! MOEA (經濟部新聞) adapter — list-based.
//!
//! Press-release IDs are not dense, so the adapter scans listing pages
//! first and only ever fetches IDs it has discovered. `url_for` answers
//! `None` for anything outside the discovered set and the engine counts it
//! NOT_FOUND, exactly like a dead serial ID.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::crawler::parser::{ArticleRecord, ParserKind, SiteParser};
use crate::crawler::sources::extract;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

const LIST_URL: &str = "https://www.moea.gov.tw/Mns/populace/news/News.aspx?kind=1";
const MIN_ARTICLE_LENGTH: usize = 100;
const DEFAULT_MAX_PAGES: usize = 5;

static NEWS_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"News_View\.aspx\?kind=1&menu_id=\d+&news_id=(\d+)"#).unwrap());

static DATE_IN_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[-/年](\d{2})[-/月](\d{2})").unwrap());

#[derive(Debug, Default)]
pub struct MoeaParser {
    /// Discovered IDs in listing order, with their URLs.
    discovered: Vec<u64>,
    urls: HashMap<u64, String>,
}

impl MoeaParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan up to `max_pages` listing pages and remember every press
    /// release found, newest first. Must run before a crawl.
    pub async fn discover(
        &mut self,
        transport: &Transport,
        max_pages: Option<usize>,
    ) -> Result<usize, AppError> {
        let pages = max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1);
        for page in 1..=pages {
            let page_url = format!("{LIST_URL}&page={page}");
            let FetchOutcome::Ok(html) = transport.get(&page_url).await else {
                warn!(page, "moea: listing page unavailable, stopping scan");
                break;
            };
            let before = self.discovered.len();
            for caps in NEWS_LINK.captures_iter(&html) {
                if let Ok(id) = caps[1].parse::<u64>() {
                    if !self.urls.contains_key(&id) {
                        self.discovered.push(id);
                        self.urls.insert(id, Self::view_url(id));
                    }
                }
            }
            if self.discovered.len() == before {
                debug!(page, "moea: no new IDs on page, stopping scan");
                break;
            }
        }
        info!(count = self.discovered.len(), "moea: discovery finished");
        Ok(self.discovered.len())
    }

    fn view_url(news_id: u64) -> String {
        format!("https://www.moea.gov.tw/Mns/populace/news/News_View.aspx?kind=1&menu_id=40&news_id={news_id}")
    }

    /// Seed the discovered set directly — test and replay path.
    pub fn with_discovered(ids: Vec<u64>) -> Self {
        let urls = ids.iter().map(|&id| (id, Self::view_url(id))).collect();
        Self { discovered: ids, urls }
    }
}

impl SiteParser for MoeaParser {
    fn source_name(&self) -> &'static str {
        "moea"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::ListBased
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        self.urls.get(&article_id).cloned()
    }

    fn discovered_ids(&self) -> Vec<u64> {
        self.discovered.clone()
    }

    async fn latest_id(&self, _transport: &Transport) -> Result<Option<u64>, AppError> {
        Ok(self.discovered.first().copied())
    }

    async fn date_for(&self, article_id: u64, transport: &Transport) -> Option<NaiveDateTime> {
        let url = self.url_for(article_id)?;
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

        let headline = extract::og_title(&doc)
            .or_else(|| extract::paragraphs(&doc, "h2.news-title, h1").into_iter().next())?;

        let body_paragraphs = extract::paragraphs(&doc, "div.news-content p, div.main_word p");
        let body = body_paragraphs.join("");
        if body.chars().count() < MIN_ARTICLE_LENGTH {
            debug!(%url, "moea: body too short");
            return None;
        }

        let date_published = DATE_IN_PAGE
            .captures(html)
            .map(|c| format!("{}-{}-{}T00:00:00", &c[1], &c[2], &c[3]))?;

        Some(ArticleRecord {
            schema_type: "NewsArticle".into(),
            headline: extract::clean_text(&headline),
            article_body: body,
            author: String::new(),
            publisher: "經濟部".into(),
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

    #[test]
    fn url_only_for_discovered_ids() {
        let p = MoeaParser::with_discovered(vec![98001, 98000]);
        assert!(p.url_for(98001).is_some());
        assert!(p.url_for(12345).is_none());
        assert_eq!(p.discovered_ids(), vec![98001, 98000]);
        assert_eq!(p.kind(), ParserKind::ListBased);
    }

    #[tokio::test]
    async fn latest_is_head_of_discovered() {
        let p = MoeaParser::with_discovered(vec![98001, 98000]);
        let t = Transport::scripted(Vec::new(), true);
        assert_eq!(p.latest_id(&t).await.unwrap(), Some(98001));

        let empty = MoeaParser::new();
        assert_eq!(empty.latest_id(&t).await.unwrap(), None);
    }

    #[tokio::test]
    async fn discover_collects_ids_in_order() {
        let page1 = r#"<a href="News_View.aspx?kind=1&menu_id=40&news_id=98002">一</a>
                       <a href="News_View.aspx?kind=1&menu_id=40&news_id=98001">二</a>"#;
        let t = Transport::scripted(
            vec![ScriptedResponse::ok(page1), ScriptedResponse::ok("<p>empty</p>")],
            true,
        );
        let mut p = MoeaParser::new();
        let count = p.discover(&t, Some(3)).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(p.discovered_ids(), vec![98002, 98001]);
    }

    #[test]
    fn parse_builds_record_from_plain_page() {
        let body: String = "本部今日公布最新產業政策說明。".repeat(8);
        let html = format!(
            r#"<html><head><meta property="og:title" content="經濟部新聞稿" /></head>
            <body><span>發布日期：2025/06/15</span>
            <div class="news-content"><p>{body}</p></div></body></html>"#
        );
        let p = MoeaParser::new();
        let record = p.parse(&html, "https://www.moea.gov.tw/x").unwrap();
        assert_eq!(record.headline, "經濟部新聞稿");
        assert_eq!(record.date_published, "2025-06-15T00:00:00");
        assert_eq!(record.publisher, "經濟部");
    }
}
