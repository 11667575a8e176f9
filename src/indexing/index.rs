//! Collaborator interfaces for the external vector index.
//!
//! The pipeline produces [`MapPayload`]s and hands them off through
//! [`PayloadSink`]; embedding and upserting into the real index are the
//! caller's concern. These traits are consumed here, never implemented by
//! anything in this crate beyond test/CLI sinks.

use crate::error::AppError;
use crate::indexing::vault::MapPayload;

/// `embed(text) → vector` — provided by the host's embedding model.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

/// One point ready for the vector index.
#[derive(Debug, Clone)]
pub struct MapPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: MapPayload,
}

/// The external vector index (the "Map").
pub trait VectorIndex {
    fn upsert(&mut self, collection: &str, points: Vec<MapPoint>) -> Result<(), AppError>;

    /// Remove every point of a site; returns how many were deleted.
    fn delete_by_site(&mut self, site: &str) -> Result<u64, AppError>;
}

/// Where the pipeline ships each article's map payloads. The caller owns
/// embedding + upsert; the pipeline only guarantees it calls `ship` once
/// per stored article, after the vault write.
pub trait PayloadSink: Send {
    fn ship(&mut self, payloads: Vec<MapPayload>) -> Result<(), AppError>;
}

/// Collects payloads in memory — the test double and the CLI default.
#[derive(Debug, Default)]
pub struct VecSink {
    pub payloads: Vec<MapPayload>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadSink for VecSink {
    fn ship(&mut self, payloads: Vec<MapPayload>) -> Result<(), AppError> {
        self.payloads.extend(payloads);
        Ok(())
    }
}

/// Drops everything — dry runs.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl PayloadSink for DiscardSink {
    fn ship(&mut self, _payloads: Vec<MapPayload>) -> Result<(), AppError> {
        Ok(())
    }
}
