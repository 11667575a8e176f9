//! LTN (自由時報) adapter — sequential article IDs.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

use crate::crawler::parser::{ArticleRecord, SiteParser};
use crate::crawler::sources::extract;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

const LIST_URL: &str = "https://news.ltn.com.tw/list/breakingnews";
const MIN_ARTICLE_LENGTH: usize = 100;

static ID_IN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"breakingnews/(\d+)").unwrap());

static DATE_PUBLISHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""datePublished"\s*:\s*"([^"]+)""#).unwrap());

#[derive(Debug, Default)]
pub struct LtnParser;

impl LtnParser {
    pub fn new() -> Self {
        Self
    }
}

impl SiteParser for LtnParser {
    fn source_name(&self) -> &'static str {
        "ltn"
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        Some(format!("https://news.ltn.com.tw/news/life/breakingnews/{article_id}"))
    }

    async fn latest_id(&self, transport: &Transport) -> Result<Option<u64>, AppError> {
        let FetchOutcome::Ok(html) = transport.get(LIST_URL).await else {
            warn!("ltn: breaking-news list unavailable");
            return Ok(None);
        };
        let latest = ID_IN_LINK
            .captures_iter(&html)
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max();
        Ok(latest)
    }

    async fn date_for(&self, article_id: u64, transport: &Transport) -> Option<NaiveDateTime> {
        let url = self.url_for(article_id)?;
        let FetchOutcome::Ok(html) = transport.get(&url).await else {
            return None;
        };
        let raw = DATE_PUBLISHED.captures(&html)?[1].to_string();
        parse_iso_datetime(&raw)
    }

    fn parse(&self, html: &str, url: &str) -> Option<ArticleRecord> {
        let doc = Html::parse_document(html);

        let ld = extract::json_ld_news_article(&doc);

        let headline = ld
            .as_ref()
            .and_then(|v| extract::name_of(v.get("headline")))
            .or_else(|| extract::og_title(&doc))?;

        let date_published = ld
            .as_ref()
            .and_then(|v| v.get("datePublished"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| extract::meta_content(&doc, r#"meta[property="article:published_time"]"#))?;

        let body = ld
            .as_ref()
            .and_then(|v| v.get("articleBody"))
            .and_then(|v| v.as_str())
            .map(extract::clean_text)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| extract::paragraphs(&doc, "div.text > p").join(""));

        if body.chars().count() < MIN_ARTICLE_LENGTH {
            debug!(%url, chars = body.chars().count(), "ltn: body too short");
            return None;
        }

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
            publisher: "自由時報".into(),
            date_published,
            in_language: "zh-TW".into(),
            url: url.to_string(),
            keywords: extract::meta_keywords(&doc),
        })
    }
}

/// ISO-8601 with optional fractional seconds and timezone suffix.
pub(crate) fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    static TZ_SUFFIX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(Z|[+-]\d{2}:?\d{2})$").unwrap());
    let clean = TZ_SUFFIX.replace(raw.trim(), "");
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&clean, fmt) {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_HTML: &str = r#"<html><head>
        <script type="application/ld+json">
        {"@type":"NewsArticle","headline":"測試新聞標題",
         "articleBody":"這是一篇測試文章的內文，為了跨過最短長度限制，內容必須要有足夠的字數。第二句繼續補充更多細節，描述事件的背景與影響。第三句總結整件事情的後續發展，並且提醒讀者持續關注。最後一句補滿長度需求，確保解析器不會拒絕這篇文章。",
         "author":{"@type":"Person","name":"記者王小明／台北報導"},
         "datePublished":"2025-06-01T08:30:00+08:00"}
        </script>
        <meta name="keywords" content="測試, 新聞" />
        </head><body></body></html>"#;

    #[test]
    fn parse_extracts_record_from_json_ld() {
        let p = LtnParser::new();
        let url = "https://news.ltn.com.tw/news/life/breakingnews/4567890";
        let record = p.parse(ARTICLE_HTML, url).unwrap();
        assert_eq!(record.schema_type, "NewsArticle");
        assert_eq!(record.headline, "測試新聞標題");
        assert_eq!(record.author, "王小明");
        assert_eq!(record.publisher, "自由時報");
        assert_eq!(record.date_published, "2025-06-01T08:30:00+08:00");
        assert_eq!(record.keywords, vec!["測試", "新聞"]);
        assert_eq!(record.url, url);
    }

    #[test]
    fn parse_rejects_short_body() {
        let p = LtnParser::new();
        let html = r#"<script type="application/ld+json">
            {"@type":"NewsArticle","headline":"短","articleBody":"太短。",
             "datePublished":"2025-06-01T08:30:00+08:00"}</script>"#;
        assert!(p.parse(html, "https://news.ltn.com.tw/x/1").is_none());
    }

    #[test]
    fn parse_rejects_missing_headline() {
        let p = LtnParser::new();
        assert!(p.parse("<html><body><p>無標題</p></body></html>", "https://x/1").is_none());
    }

    #[test]
    fn url_is_deterministic() {
        let p = LtnParser::new();
        assert_eq!(
            p.url_for(4567890).unwrap(),
            "https://news.ltn.com.tw/news/life/breakingnews/4567890"
        );
    }

    #[test]
    fn iso_datetime_variants() {
        assert!(parse_iso_datetime("2025-01-01T00:00:00+08:00").is_some());
        assert!(parse_iso_datetime("2025-01-01T00:00:00.123Z").is_some());
        assert!(parse_iso_datetime("2025-01-01T00:00:00").is_some());
        assert!(parse_iso_datetime("not a date").is_none());
    }

    #[tokio::test]
    async fn latest_id_takes_max_from_list() {
        let list = r#"<a href="/news/life/breakingnews/100">a</a>
                      <a href="/news/politics/breakingnews/4567890">b</a>
                      <a href="/news/world/breakingnews/4567889">c</a>"#;
        let t = Transport::scripted(
            vec![crate::crawler::transport::ScriptedResponse::ok(list)],
            true,
        );
        let p = LtnParser::new();
        assert_eq!(p.latest_id(&t).await.unwrap(), Some(4567890));
    }
}
