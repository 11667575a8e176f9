//! Shared HTML extraction helpers for site adapters.
//!
//! Adapters prefer the embedded JSON-LD `NewsArticle` block when a site
//! ships one, and fall back to meta tags + paragraph scraping otherwise.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Bylines come wrapped in reporting boilerplate ("記者王小明／台北報導").
static AUTHOR_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(記者|文字|編譯|撰文|綜合報導|報導|專題|／[^／]*報導|[〔〕\[\]（）()])").unwrap()
});

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Strip reporting boilerplate from a byline, leaving the name.
pub fn clean_author(raw: &str) -> String {
    clean_text(&AUTHOR_NOISE.replace_all(raw, ""))
}

/// Find the JSON-LD `NewsArticle` object in a document, looking through
/// top-level objects, arrays and `@graph` containers.
pub fn json_ld_news_article(doc: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in doc.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        if let Some(article) = find_news_article(&value) {
            return Some(article.clone());
        }
    }
    None
}

fn find_news_article(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if map.get("@type").and_then(Value::as_str) == Some("NewsArticle") {
                return Some(value);
            }
            map.get("@graph").and_then(find_news_article)
        }
        Value::Array(items) => items.iter().find_map(find_news_article),
        _ => None,
    }
}

/// `<meta ... content="…">` lookup by CSS selector.
pub fn meta_content(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let content = doc.select(&selector).next()?.value().attr("content")?;
    let cleaned = clean_text(content);
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn og_title(doc: &Html) -> Option<String> {
    meta_content(doc, r#"meta[property="og:title"]"#)
        .or_else(|| meta_content(doc, r#"meta[name="title"]"#))
}

/// Comma/頓號-separated keyword meta, deduplicated in order.
pub fn meta_keywords(doc: &Html) -> Vec<String> {
    let Some(raw) = meta_content(doc, r#"meta[name="keywords"]"#) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    raw.split([',', '、'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

/// Text of every element matching `css`, cleaned, skipping empties.
pub fn paragraphs(doc: &Html, css: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(css) else {
        return Vec::new();
    };
    doc.select(&selector)
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|p| !p.is_empty())
        .collect()
}

/// A JSON-LD field that may be a string, an object with `name`, or an
/// array of either. Returns the first usable name.
pub fn name_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = clean_text(s);
            (!s.is_empty()).then_some(s)
        }
        Value::Object(map) => name_of(map.get("name")),
        Value::Array(items) => items.iter().find_map(|v| name_of(Some(v))),
        _ => None,
    }
}
