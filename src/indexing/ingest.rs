//! Ingestion: TSV lines → canonical data model.
//!
//! Each line is `url<TAB>JSON-LD`. Malformed lines never vanish silently:
//! they become invalid CDMs carrying a readable error so the quality gate
//! can buffer them for review.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::error::AppError;

/// Canonical representation of one news article inside the indexing
/// pipeline. Built from one TSV line, consumed by the quality gate, then
/// either buffered or chunked.
#[derive(Debug, Clone)]
pub struct CanonicalDataModel {
    pub url: String,
    pub headline: String,
    pub article_body: String,
    /// Lower-cased host with any `www.` prefix stripped.
    pub source_id: String,
    pub author: Option<String>,
    pub date_published: Option<NaiveDateTime>,
    pub publisher: Option<String>,
    pub keywords: Vec<String>,
    /// The JSON-LD exactly as it appeared on the wire.
    pub raw_schema_json: String,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct IngestionEngine;

impl IngestionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Parse a single TSV line. Returns `None` only for blank lines.
    pub fn parse_tsv_line(&self, line: &str) -> Option<CanonicalDataModel> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((url, json_ld)) = line.split_once('\t') else {
            return Some(invalid_cdm(line, "malformed TSV line: missing JSON-LD field"));
        };

        let schema: Value = match serde_json::from_str(json_ld) {
            Ok(v) => v,
            Err(e) => return Some(invalid_cdm(url, &format!("JSON parse failed: {e}"))),
        };

        Some(self.parse_schema(url, &schema, json_ld))
    }

    /// Parse a whole TSV file, skipping blank lines.
    pub fn parse_tsv_file(&self, tsv_path: &Path) -> Result<Vec<CanonicalDataModel>, AppError> {
        let file = File::open(tsv_path)
            .map_err(|e| AppError::Validation(format!("cannot open {}: {e}", tsv_path.display())))?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line =
                line.map_err(|e| AppError::Validation(format!("read {}: {e}", tsv_path.display())))?;
            if let Some(cdm) = self.parse_tsv_line(&line) {
                records.push(cdm);
            }
        }
        Ok(records)
    }

    fn parse_schema(&self, url: &str, schema: &Value, raw_json: &str) -> CanonicalDataModel {
        let mut errors = Vec::new();

        let headline = str_field(schema, "headline")
            .or_else(|| str_field(schema, "name"))
            .unwrap_or_default();
        if headline.is_empty() {
            errors.push("missing headline".to_string());
        }

        let article_body = str_field(schema, "articleBody")
            .or_else(|| str_field(schema, "text"))
            .unwrap_or_default();
        if article_body.is_empty() {
            errors.push("missing articleBody".to_string());
        }

        CanonicalDataModel {
            url: url.to_string(),
            headline,
            article_body,
            source_id: extract_source_id(url),
            author: name_field(schema.get("author")),
            date_published: schema
                .get("datePublished")
                .and_then(Value::as_str)
                .and_then(parse_iso_date),
            publisher: name_field(schema.get("publisher")),
            keywords: extract_keywords(schema.get("keywords")),
            raw_schema_json: raw_json.to_string(),
            is_valid: errors.is_empty(),
            validation_errors: errors,
        }
    }
}

fn invalid_cdm(url: &str, error: &str) -> CanonicalDataModel {
    CanonicalDataModel {
        url: url.to_string(),
        headline: String::new(),
        article_body: String::new(),
        source_id: extract_source_id(url),
        author: None,
        date_published: None,
        publisher: None,
        keywords: Vec::new(),
        raw_schema_json: String::new(),
        is_valid: false,
        validation_errors: vec![error.to_string()],
    }
}

fn str_field(schema: &Value, key: &str) -> Option<String> {
    let s = schema.get(key)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// `author` / `publisher` may be a string, an object with `name`, or an
/// array of either; everything normalizes to one string.
fn name_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Object(map) => name_field(map.get("name")),
        Value::Array(items) => items.iter().find_map(|v| name_field(Some(v))),
        _ => None,
    }
}

/// `keywords` arrives as a comma-separated string or an array.
fn extract_keywords(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Lower-cased host, `www.` stripped. Unparseable URLs yield an empty id.
pub fn extract_source_id(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// ISO-8601 variants: with milliseconds, without, date-only. A trailing
/// `Z` or `±HH:MM` timezone is stripped before parsing.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDateTime> {
    static TZ_SUFFIX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(Z|[+-]\d{2}:\d{2})$").unwrap());
    let clean = TZ_SUFFIX.replace(raw.trim(), "");

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&clean, fmt) {
            return Some(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(&clean, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> IngestionEngine {
        IngestionEngine::new()
    }

    #[test]
    fn parses_full_line() {
        let line = concat!(
            "https://www.example.com.tw/news/1\t",
            r#"{"@type":"NewsArticle","headline":"H","articleBody":"S1。S2。S3。","#,
            r#""author":{"@type":"Person","name":"王記者"},"publisher":"例報","#,
            r#""datePublished":"2025-01-01T00:00:00+08:00","keywords":["a","b"]}"#
        );
        let cdm = engine().parse_tsv_line(line).unwrap();
        assert!(cdm.is_valid);
        assert_eq!(cdm.headline, "H");
        assert_eq!(cdm.article_body, "S1。S2。S3。");
        assert_eq!(cdm.source_id, "example.com.tw");
        assert_eq!(cdm.author.as_deref(), Some("王記者"));
        assert_eq!(cdm.publisher.as_deref(), Some("例報"));
        assert_eq!(
            cdm.date_published.unwrap().to_string(),
            "2025-01-01 00:00:00"
        );
        assert_eq!(cdm.keywords, vec!["a", "b"]);
    }

    #[test]
    fn blank_line_is_none() {
        assert!(engine().parse_tsv_line("   ").is_none());
    }

    #[test]
    fn missing_tab_is_invalid_not_dropped() {
        let cdm = engine().parse_tsv_line("https://x/no-tab-here").unwrap();
        assert!(!cdm.is_valid);
        assert!(cdm.validation_errors[0].contains("missing JSON-LD"));
    }

    #[test]
    fn bad_json_is_invalid_with_reason() {
        let cdm = engine().parse_tsv_line("https://x/1\t{not json").unwrap();
        assert!(!cdm.is_valid);
        assert!(cdm.validation_errors[0].contains("JSON parse failed"));
    }

    #[test]
    fn name_and_text_fallbacks() {
        let line = r#"https://x/1	{"name":"後備標題","text":"後備內文"}"#;
        let cdm = engine().parse_tsv_line(line).unwrap();
        assert!(cdm.is_valid);
        assert_eq!(cdm.headline, "後備標題");
        assert_eq!(cdm.article_body, "後備內文");
    }

    #[test]
    fn author_shapes_normalize() {
        for (author_json, expected) in [
            (r#""王小明""#, "王小明"),
            (r#"{"name":"王小明"}"#, "王小明"),
            (r#"[{"name":"王小明"},{"name":"李四"}]"#, "王小明"),
            (r#"["王小明"]"#, "王小明"),
        ] {
            let line = format!(
                r#"https://x/1	{{"headline":"H","articleBody":"B","author":{author_json}}}"#
            );
            let cdm = engine().parse_tsv_line(&line).unwrap();
            assert_eq!(cdm.author.as_deref(), Some(expected), "shape: {author_json}");
        }
    }

    #[test]
    fn keywords_comma_string() {
        let line = r#"https://x/1	{"headline":"H","articleBody":"B","keywords":"a, b ,,c"}"#;
        let cdm = engine().parse_tsv_line(line).unwrap();
        assert_eq!(cdm.keywords, vec!["a", "b", "c"]);
    }

    #[test]
    fn date_variants_parse() {
        assert!(parse_iso_date("2025-01-01T08:30:00.123+08:00").is_some());
        assert!(parse_iso_date("2025-01-01T08:30:00Z").is_some());
        assert!(parse_iso_date("2025-01-01T08:30:00").is_some());
        assert_eq!(
            parse_iso_date("2025-01-01").unwrap().to_string(),
            "2025-01-01 00:00:00"
        );
        assert!(parse_iso_date("01/02/2025").is_none());
    }

    #[test]
    fn source_id_strips_www_and_lowercases() {
        assert_eq!(extract_source_id("https://WWW.Example.COM/a"), "example.com");
        assert_eq!(extract_source_id("https://news.ltn.com.tw/x"), "news.ltn.com.tw");
        assert_eq!(extract_source_id("not a url"), "");
    }

    #[test]
    fn parse_file_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.tsv");
        std::fs::write(
            &path,
            "https://x/1\t{\"headline\":\"A\",\"articleBody\":\"B\"}\n\nhttps://x/2\tbroken\n",
        )
        .unwrap();
        let records = engine().parse_tsv_file(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_valid);
        assert!(!records[1].is_valid);
    }
}
