//! Quality gate: decides whether an article is fit for the store.
//!
//! Failures are BUFFERED (kept for review), never silently dropped;
//! duplicates are SKIPPED. The script-pattern list is a heuristic tuned
//! for leaked page scaffolding, not a general language detector.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::QualityConfig;
use crate::indexing::ingest::CanonicalDataModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityStatus {
    Passed,
    /// Failed a check; the article is appended to the review buffer.
    Buffered,
    /// Duplicate URL; not stored and not buffered.
    Skipped,
}

#[derive(Debug)]
pub struct QualityResult {
    pub status: QualityStatus,
    pub failure_reasons: Vec<String>,
}

impl QualityResult {
    pub fn passed(&self) -> bool {
        self.status == QualityStatus::Passed
    }
}

/// Clear JavaScript fingerprints; ordinary prose does not trip these.
static SCRIPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"function\s+\w+\s*\(",
        r"function\s*\(\s*\)\s*\{",
        r"var\s+\w+\s*=\s*[\[\{]",
        r"const\s+\w+\s*=\s*[\[\{]",
        r"let\s+\w+\s*=\s*[\[\{]",
        r"document\.\w+",
        r"window\.\w+",
        r"=>\s*\{",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

pub struct QualityGate {
    cfg: QualityConfig,
}

impl QualityGate {
    pub fn new(cfg: QualityConfig) -> Self {
        Self { cfg }
    }

    /// Validate one CDM. Duplicate checking is a separate concern
    /// ([`Self::is_duplicate`]) because only the pipeline knows the
    /// processed-URL set.
    pub fn validate(&self, cdm: &CanonicalDataModel) -> QualityResult {
        let mut failures: Vec<String> = Vec::new();

        if !cdm.is_valid {
            failures.extend(cdm.validation_errors.iter().cloned());
        }

        if cdm.headline.trim().is_empty() {
            failures.push("missing headline".to_string());
        }

        let body_chars = cdm.article_body.chars().count();
        if body_chars < self.cfg.min_body_length {
            failures.push(format!(
                "body too short ({body_chars} < {})",
                self.cfg.min_body_length
            ));
        }

        if !cdm.article_body.is_empty() {
            if let Some(reason) = self.content_defect(&cdm.article_body) {
                failures.push(reason);
            }
        }

        QualityResult {
            status: if failures.is_empty() {
                QualityStatus::Passed
            } else {
                QualityStatus::Buffered
            },
            failure_reasons: failures,
        }
    }

    pub fn is_duplicate(&self, url: &str, existing: &HashSet<String>) -> bool {
        existing.contains(url)
    }

    /// HTML residue, script leakage, or failing the language-fit ratio.
    fn content_defect(&self, body: &str) -> Option<String> {
        let total_chars = body.chars().count().max(1);

        let html_chars: usize = HTML_TAG
            .find_iter(body)
            .map(|m| m.as_str().chars().count())
            .sum();
        let html_ratio = html_chars as f64 / total_chars as f64;
        if html_ratio > self.cfg.max_html_ratio {
            return Some(format!(
                "HTML tag ratio too high ({:.1}% > {:.0}%)",
                html_ratio * 100.0,
                self.cfg.max_html_ratio * 100.0
            ));
        }

        if SCRIPT_PATTERNS.iter().any(|p| p.is_match(body)) {
            return Some("suspected script content".to_string());
        }

        if self.cfg.min_chinese_ratio > 0.0 {
            let chinese_chars = body
                .chars()
                .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
                .count();
            let chinese_ratio = chinese_chars as f64 / total_chars as f64;
            if chinese_ratio < self.cfg.min_chinese_ratio {
                return Some(format!(
                    "Chinese character ratio too low ({:.1}% < {:.0}%)",
                    chinese_ratio * 100.0,
                    self.cfg.min_chinese_ratio * 100.0
                ));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QualityGate {
        QualityGate::new(QualityConfig {
            min_body_length: 50,
            min_chinese_ratio: 0.2,
            max_html_ratio: 0.3,
        })
    }

    fn cdm(headline: &str, body: &str) -> CanonicalDataModel {
        CanonicalDataModel {
            url: "https://example.com/1".into(),
            headline: headline.into(),
            article_body: body.into(),
            source_id: "example.com".into(),
            author: None,
            date_published: None,
            publisher: None,
            keywords: Vec::new(),
            raw_schema_json: String::new(),
            is_valid: true,
            validation_errors: Vec::new(),
        }
    }

    fn good_body() -> String {
        "台灣經濟部今日發布最新統計，指出產業投資持續成長。".repeat(3)
    }

    #[test]
    fn clean_article_passes() {
        let r = gate().validate(&cdm("標題", &good_body()));
        assert!(r.passed());
        assert!(r.failure_reasons.is_empty());
    }

    #[test]
    fn missing_headline_buffers() {
        let r = gate().validate(&cdm("  ", &good_body()));
        assert_eq!(r.status, QualityStatus::Buffered);
        assert!(r.failure_reasons.iter().any(|f| f.contains("headline")));
    }

    #[test]
    fn short_body_buffers_with_reason() {
        let r = gate().validate(&cdm("標題", "太短。"));
        assert_eq!(r.status, QualityStatus::Buffered);
        assert!(r.failure_reasons.iter().any(|f| f.contains("body too short")));
    }

    #[test]
    fn html_residue_buffers() {
        let tagged = format!("<div><span>{}</span></div>", "短");
        let r = gate().validate(&cdm("標題", &tagged.repeat(10)));
        assert_eq!(r.status, QualityStatus::Buffered);
    }

    #[test]
    fn script_content_buffers() {
        let body = format!("{}function track() {{ document.title = 1; }}", good_body());
        let r = gate().validate(&cdm("標題", &body));
        assert_eq!(r.status, QualityStatus::Buffered);
        assert!(r.failure_reasons.iter().any(|f| f.contains("script")));
    }

    #[test]
    fn low_chinese_ratio_buffers() {
        let body = "This is an entirely English body of sufficient length to pass the size check but not the language fit.";
        let r = gate().validate(&cdm("標題", body));
        assert_eq!(r.status, QualityStatus::Buffered);
        assert!(r.failure_reasons.iter().any(|f| f.contains("Chinese")));
    }

    #[test]
    fn zero_ratio_disables_language_check() {
        let g = QualityGate::new(QualityConfig {
            min_body_length: 50,
            min_chinese_ratio: 0.0,
            max_html_ratio: 0.3,
        });
        let body = "An English-language body of sufficient length that should be accepted once the language check is off.";
        assert!(g.validate(&cdm("Title", body)).passed());
    }

    #[test]
    fn invalid_cdm_carries_its_errors_through() {
        let mut c = cdm("標題", &good_body());
        c.is_valid = false;
        c.validation_errors = vec!["JSON parse failed: boom".into()];
        let r = gate().validate(&c);
        assert_eq!(r.status, QualityStatus::Buffered);
        assert!(r.failure_reasons.iter().any(|f| f.contains("boom")));
    }

    #[test]
    fn duplicate_lookup() {
        let mut seen = HashSet::new();
        seen.insert("https://example.com/1".to_string());
        assert!(gate().is_duplicate("https://example.com/1", &seen));
        assert!(!gate().is_duplicate("https://example.com/2", &seen));
    }
}
