//! NewsVault — news crawler and dual-tier indexing core.
//!
//! Two halves share this crate:
//!
//! - [`crawler`] harvests articles from heterogeneous news sites into a
//!   uniform `URL<TAB>JSON-LD` TSV stream: site adapters behind one trait,
//!   a concurrent fetch engine with retry/cooldown/smart-jump, a date
//!   navigator and a mutex-guarded TSV sink.
//! - [`indexing`] turns those TSV streams into a dual-tier store: a quality
//!   gate, a sentence-bounded chunker, the compressed full-text Vault,
//!   map payloads for the external vector index, a rollback journal and a
//!   checkpointed pipeline orchestrator.
//!
//! [`config`], [`logger`] and [`error`] carry the shared ambient stack.

pub mod config;
pub mod crawler;
pub mod error;
pub mod indexing;
pub mod logger;

pub use config::Config;
pub use error::AppError;
