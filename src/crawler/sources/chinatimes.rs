//! ChinaTimes (中時新聞網) adapter — 14-digit date-encoded IDs
//! (`YYYYMMDDHHmmss`), smart-jump eligible.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

use crate::crawler::parser::{ArticleRecord, IdScheme, SiteParser};
use crate::crawler::sources::extract;
use crate::crawler::transport::{FetchOutcome, Transport};
use crate::error::AppError;

const LIST_URL: &str = "https://www.chinatimes.com/realtimenews/";
const MIN_ARTICLE_LENGTH: usize = 100;

static ID_IN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"realtimenews/(\d{14})-\d+").unwrap());

#[derive(Debug, Default)]
pub struct ChinaTimesParser;

impl ChinaTimesParser {
    pub fn new() -> Self {
        Self
    }
}

impl SiteParser for ChinaTimesParser {
    fn source_name(&self) -> &'static str {
        "chinatimes"
    }

    fn id_scheme(&self) -> IdScheme {
        IdScheme::DateEncoded { suffix_digits: 6 }
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        Some(format!("https://www.chinatimes.com/realtimenews/{article_id}-260405"))
    }

    async fn latest_id(&self, transport: &Transport) -> Result<Option<u64>, AppError> {
        let FetchOutcome::Ok(html) = transport.get(LIST_URL).await else {
            warn!("chinatimes: realtime list unavailable");
            return Ok(None);
        };
        Ok(ID_IN_LINK
            .captures_iter(&html)
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max())
    }

    /// The ID itself carries the publish timestamp; no request needed.
    async fn date_for(&self, article_id: u64, _transport: &Transport) -> Option<NaiveDateTime> {
        datetime_from_id(article_id)
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
            .unwrap_or_else(|| extract::paragraphs(&doc, "div.article-body > p").join(""));

        if body.chars().count() < MIN_ARTICLE_LENGTH {
            debug!(%url, "chinatimes: body too short");
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
            publisher: "中時新聞網".into(),
            date_published,
            in_language: "zh-TW".into(),
            url: url.to_string(),
            keywords: extract::meta_keywords(&doc),
        })
    }
}

/// `YYYYMMDDHHmmss` → timestamp. Falls back to midnight when the trailing
/// six digits are not a valid time-of-day.
fn datetime_from_id(article_id: u64) -> Option<NaiveDateTime> {
    let id_str = article_id.to_string();
    if id_str.len() != 14 {
        return None;
    }
    let date = NaiveDate::parse_from_str(&id_str[..8], "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(&id_str[8..], "%H%M%S")
        .unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_decodes_from_id() {
        let dt = datetime_from_id(20251231235959).unwrap();
        assert_eq!(dt.to_string(), "2025-12-31 23:59:59");
    }

    #[test]
    fn serial_suffix_falls_back_to_midnight() {
        // Suffix 990101 is not a clock time.
        let dt = datetime_from_id(20251231990101).unwrap();
        assert_eq!(dt.to_string(), "2025-12-31 00:00:00");
    }

    #[test]
    fn wrong_width_yields_none() {
        assert!(datetime_from_id(202512310001).is_none());
        assert!(datetime_from_id(1234).is_none());
    }

    #[test]
    fn declares_six_digit_suffix() {
        assert_eq!(
            ChinaTimesParser::new().id_scheme(),
            IdScheme::DateEncoded { suffix_digits: 6 }
        );
    }

    #[test]
    fn url_embeds_channel_suffix() {
        let p = ChinaTimesParser::new();
        assert_eq!(
            p.url_for(20251231000001).unwrap(),
            "https://www.chinatimes.com/realtimenews/20251231000001-260405"
        );
    }
}
