//! Site-adapter registry.
//!
//! `build(name)` is the factory — called once per crawl from the CLI.
//! Adding a site = new module + new match arm.

pub mod chinatimes;
pub mod cna;
pub mod einfo;
pub mod extract;
pub mod ltn;
pub mod moea;
pub mod udn;

use chrono::NaiveDateTime;

use crate::crawler::parser::{ArticleRecord, IdScheme, ParserKind, SiteParser, TransportKind};
use crate::crawler::transport::Transport;
use crate::error::AppError;

use chinatimes::ChinaTimesParser;
use cna::CnaParser;
use einfo::EinfoParser;
use ltn::LtnParser;
use moea::MoeaParser;
use udn::UdnParser;

/// All registered source names, in display order.
pub fn list_available() -> &'static [&'static str] {
    &["ltn", "udn", "chinatimes", "cna", "moea", "einfo"]
}

/// Construct the adapter for `name`.
pub fn build(name: &str) -> Result<SourceParser, AppError> {
    match name {
        "ltn" => Ok(SourceParser::Ltn(LtnParser::new())),
        "udn" => Ok(SourceParser::Udn(UdnParser::new())),
        "chinatimes" => Ok(SourceParser::ChinaTimes(ChinaTimesParser::new())),
        "cna" => Ok(SourceParser::Cna(CnaParser::new())),
        "moea" => Ok(SourceParser::Moea(MoeaParser::new())),
        "einfo" => Ok(SourceParser::Einfo(EinfoParser::new())),
        other => Err(AppError::Parser(format!("unknown source: {other}"))),
    }
}

/// One concrete adapter behind a single dispatchable type.
#[derive(Debug)]
pub enum SourceParser {
    Ltn(LtnParser),
    Udn(UdnParser),
    ChinaTimes(ChinaTimesParser),
    Cna(CnaParser),
    Moea(MoeaParser),
    Einfo(EinfoParser),
}

impl SourceParser {
    /// Pre-crawl preparation: list-based adapters scan their listings here;
    /// range-based adapters have nothing to do.
    pub async fn prepare(
        &mut self,
        transport: &Transport,
        max_pages: Option<usize>,
    ) -> Result<(), AppError> {
        match self {
            SourceParser::Moea(p) => {
                p.discover(transport, max_pages).await?;
            }
            SourceParser::Einfo(p) => {
                p.discover(transport, max_pages).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl SiteParser for SourceParser {
    fn source_name(&self) -> &'static str {
        match self {
            SourceParser::Ltn(p) => p.source_name(),
            SourceParser::Udn(p) => p.source_name(),
            SourceParser::ChinaTimes(p) => p.source_name(),
            SourceParser::Cna(p) => p.source_name(),
            SourceParser::Moea(p) => p.source_name(),
            SourceParser::Einfo(p) => p.source_name(),
        }
    }

    fn kind(&self) -> ParserKind {
        match self {
            SourceParser::Ltn(p) => p.kind(),
            SourceParser::Udn(p) => p.kind(),
            SourceParser::ChinaTimes(p) => p.kind(),
            SourceParser::Cna(p) => p.kind(),
            SourceParser::Moea(p) => p.kind(),
            SourceParser::Einfo(p) => p.kind(),
        }
    }

    fn id_scheme(&self) -> IdScheme {
        match self {
            SourceParser::Ltn(p) => p.id_scheme(),
            SourceParser::Udn(p) => p.id_scheme(),
            SourceParser::ChinaTimes(p) => p.id_scheme(),
            SourceParser::Cna(p) => p.id_scheme(),
            SourceParser::Moea(p) => p.id_scheme(),
            SourceParser::Einfo(p) => p.id_scheme(),
        }
    }

    fn preferred_transport(&self) -> TransportKind {
        match self {
            SourceParser::Ltn(p) => p.preferred_transport(),
            SourceParser::Udn(p) => p.preferred_transport(),
            SourceParser::ChinaTimes(p) => p.preferred_transport(),
            SourceParser::Cna(p) => p.preferred_transport(),
            SourceParser::Moea(p) => p.preferred_transport(),
            SourceParser::Einfo(p) => p.preferred_transport(),
        }
    }

    fn url_for(&self, article_id: u64) -> Option<String> {
        match self {
            SourceParser::Ltn(p) => p.url_for(article_id),
            SourceParser::Udn(p) => p.url_for(article_id),
            SourceParser::ChinaTimes(p) => p.url_for(article_id),
            SourceParser::Cna(p) => p.url_for(article_id),
            SourceParser::Moea(p) => p.url_for(article_id),
            SourceParser::Einfo(p) => p.url_for(article_id),
        }
    }

    fn discovered_ids(&self) -> Vec<u64> {
        match self {
            SourceParser::Ltn(p) => p.discovered_ids(),
            SourceParser::Udn(p) => p.discovered_ids(),
            SourceParser::ChinaTimes(p) => p.discovered_ids(),
            SourceParser::Cna(p) => p.discovered_ids(),
            SourceParser::Moea(p) => p.discovered_ids(),
            SourceParser::Einfo(p) => p.discovered_ids(),
        }
    }

    async fn latest_id(&self, transport: &Transport) -> Result<Option<u64>, AppError> {
        match self {
            SourceParser::Ltn(p) => p.latest_id(transport).await,
            SourceParser::Udn(p) => p.latest_id(transport).await,
            SourceParser::ChinaTimes(p) => p.latest_id(transport).await,
            SourceParser::Cna(p) => p.latest_id(transport).await,
            SourceParser::Moea(p) => p.latest_id(transport).await,
            SourceParser::Einfo(p) => p.latest_id(transport).await,
        }
    }

    async fn date_for(&self, article_id: u64, transport: &Transport) -> Option<NaiveDateTime> {
        match self {
            SourceParser::Ltn(p) => p.date_for(article_id, transport).await,
            SourceParser::Udn(p) => p.date_for(article_id, transport).await,
            SourceParser::ChinaTimes(p) => p.date_for(article_id, transport).await,
            SourceParser::Cna(p) => p.date_for(article_id, transport).await,
            SourceParser::Moea(p) => p.date_for(article_id, transport).await,
            SourceParser::Einfo(p) => p.date_for(article_id, transport).await,
        }
    }

    fn parse(&self, html: &str, url: &str) -> Option<ArticleRecord> {
        match self {
            SourceParser::Ltn(p) => p.parse(html, url),
            SourceParser::Udn(p) => p.parse(html, url),
            SourceParser::ChinaTimes(p) => p.parse(html, url),
            SourceParser::Cna(p) => p.parse(html, url),
            SourceParser::Moea(p) => p.parse(html, url),
            SourceParser::Einfo(p) => p.parse(html, url),
        }
    }
}
