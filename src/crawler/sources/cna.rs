//! CNA (中央社) adapter — 12-digit date-encoded IDs (`YYYYMMDD` + 4-digit
//! serial). The site fingerprints plain HTTP clients, so the adapter asks
//! for the impersonating transport.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

use crate::crawler::parser::{ArticleRecord, IdScheme, SiteParser, TransportKind};
use crate::crawler::sources::extract;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

const LIST_URL: &str = "https://www.cna.com.tw/list/aall.aspx";
const MIN_ARTICLE_LENGTH: usize = 100;

static ID_IN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/news/[a-z]+/(\d{12})\.aspx").unwrap());

#[derive(Debug, Default)]
pub struct CnaParser;

impl CnaParser {
    pub fn new() -> Self {
        Self
    }
}

impl SiteParser for CnaParser {
    fn source_name(&self) -> &'static str {
        "cna"
    }

    fn id_scheme(&self) -> IdScheme {
        IdScheme::DateEncoded { suffix_digits: 4 }
    }

    fn preferred_transport(&self) -> TransportKind {
        TransportKind::Impersonating
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        Some(format!("https://www.cna.com.tw/news/aipl/{article_id}.aspx"))
    }

    async fn latest_id(&self, transport: &Transport) -> Result<Option<u64>, AppError> {
        let FetchOutcome::Ok(html) = transport.get(LIST_URL).await else {
            warn!("cna: list page unavailable");
            return Ok(None);
        };
        Ok(ID_IN_LINK
            .captures_iter(&html)
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max())
    }

    /// The serial suffix carries no clock time; the date prefix answers at
    /// midnight without a request.
    async fn date_for(&self, article_id: u64, _transport: &Transport) -> Option<NaiveDateTime> {
        let id_str = article_id.to_string();
        if id_str.len() != 12 {
            return None;
        }
        let date = NaiveDate::parse_from_str(&id_str[..8], "%Y%m%d").ok()?;
        date.and_hms_opt(0, 0, 0)
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
            .or_else(|| extract::meta_content(&doc, r#"meta[itemprop="datePublished"]"#))?;

        let body = ld
            .as_ref()
            .and_then(|v| v.get("articleBody"))
            .and_then(|v| v.as_str())
            .map(extract::clean_text)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| extract::paragraphs(&doc, "div.paragraph > p").join(""));

        if body.chars().count() < MIN_ARTICLE_LENGTH {
            debug!(%url, "cna: body too short");
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
            publisher: "中央社".into(),
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

    #[tokio::test]
    async fn date_decodes_from_id_prefix() {
        let p = CnaParser::new();
        let t = Transport::scripted(Vec::new(), true);
        let dt = p.date_for(202512290031, &t).await.unwrap();
        assert_eq!(dt.to_string(), "2025-12-29 00:00:00");
        assert!(p.date_for(20251229, &t).await.is_none());
    }

    #[test]
    fn declares_impersonating_preference() {
        assert_eq!(CnaParser::new().preferred_transport(), TransportKind::Impersonating);
        assert_eq!(
            CnaParser::new().id_scheme(),
            IdScheme::DateEncoded { suffix_digits: 4 }
        );
    }

    #[test]
    fn url_is_aspx_shaped() {
        assert_eq!(
            CnaParser::new().url_for(202512290031).unwrap(),
            "https://www.cna.com.tw/news/aipl/202512290031.aspx"
        );
    }

    #[tokio::test]
    async fn latest_id_scans_all_channels() {
        let list = r#"<a href="/news/aipl/202512290031.aspx">x</a>
                      <a href="/news/afe/202512290188.aspx">y</a>"#;
        let t = Transport::scripted(
            vec![crate::crawler::transport::ScriptedResponse::ok(list)],
            true,
        );
        assert_eq!(CnaParser::new().latest_id(&t).await.unwrap(), Some(202512290188));
    }
}
