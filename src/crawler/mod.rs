//! Crawler half: parser contract, HTTP transport, fetch engine, date
//! navigator, TSV sink and the site adapters.

pub mod engine;
pub mod navigator;
pub mod parser;
pub mod sink;
pub mod sources;
pub mod transport;

pub use engine::{CrawlStats, CrawlerEngine};
pub use navigator::DateNavigator;
pub use parser::{ArticleRecord, IdScheme, ParserKind, SiteParser, TransportKind};
pub use sink::TsvSink;
pub use transport::{FetchOutcome, ScriptedResponse, Transport};
