//! UDN (聯合新聞網) adapter — sequential article IDs.
//!
//! URLs are `/news/story/{category}/{article_id}`; the site redirects to
//! the right category, so the default category works for any ID.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

use crate::crawler::parser::{ArticleRecord, SiteParser};
use crate::crawler::sources::extract;
use crate::crawler::sources::ltn::parse_iso_datetime;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

const LIST_URL: &str = "https://udn.com/news/breaknews/1";
const DEFAULT_CATEGORY: &str = "6656";
const MIN_ARTICLE_LENGTH: usize = 100;

static ID_IN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/news/story/\d+/(\d+)").unwrap());

static DATE_PUBLISHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""datePublished"\s*:\s*"([^"]+)""#).unwrap());

#[derive(Debug, Default)]
pub struct UdnParser;

impl UdnParser {
    pub fn new() -> Self {
        Self
    }
}

impl SiteParser for UdnParser {
    fn source_name(&self) -> &'static str {
        "udn"
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        Some(format!("https://udn.com/news/story/{DEFAULT_CATEGORY}/{article_id}"))
    }

    async fn latest_id(&self, transport: &Transport) -> Result<Option<u64>, AppError> {
        let FetchOutcome::Ok(html) = transport.get(LIST_URL).await else {
            warn!("udn: break-news list unavailable");
            return Ok(None);
        };
        Ok(ID_IN_LINK
            .captures_iter(&html)
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max())
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
            .or_else(|| extract::meta_content(&doc, r#"meta[name="date"]"#))?;

        let body = ld
            .as_ref()
            .and_then(|v| v.get("articleBody"))
            .and_then(|v| v.as_str())
            .map(extract::clean_text)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| {
                extract::paragraphs(&doc, "section.article-content__editor > p").join("")
            });

        if body.chars().count() < MIN_ARTICLE_LENGTH {
            debug!(%url, "udn: body too short");
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
            publisher: "聯合新聞網".into(),
            date_published,
            in_language: "zh-TW".into(),
            url: url.to_string(),
            keywords: extract::meta_keywords(&doc),
        })
    }
}
