//! Indexing half: ingestion, quality gate, chunker, vault + map payloads,
//! rollback journal, source tiers and the pipeline orchestrator.

pub mod chunker;
pub mod index;
pub mod ingest;
pub mod pipeline;
pub mod quality;
pub mod rollback;
pub mod tiers;
pub mod vault;

pub use chunker::{Chunk, Chunker, make_chunk_id, parse_chunk_id};
pub use index::{DiscardSink, EmbeddingProvider, MapPoint, PayloadSink, VecSink, VectorIndex};
pub use ingest::{CanonicalDataModel, IngestionEngine};
pub use pipeline::{IndexingPipeline, PipelineCheckpoint, PipelineResult};
pub use quality::{QualityGate, QualityResult, QualityStatus};
pub use rollback::{BackupPayload, MigrationRecord, MigrationStatus, RollbackManager};
pub use tiers::{SourceTier, SourceTiers};
pub use vault::{MapPayload, VaultStorage};
