use crate::chunking::split_document;
use crate::error::IngestError;
use crate::loader::load_report;
use crate::models::{ChunkingOptions, Document, IngestionReport};
use crate::traits::ChunkIndex;
use std::path::Path;
use tracing::{debug, info};

/// Chunks a loaded document and upserts it into the index. Chunks whose ID
/// is already present are skipped, so re-running on unchanged input adds
/// nothing and touches no external service.
pub async fn ingest_document<I: ChunkIndex>(
    document: &Document,
    index: &I,
    options: &ChunkingOptions,
) -> Result<IngestionReport, IngestError> {
    let chunks = split_document(document, options)?;

    let known = index.existing_ids().await?;
    let existing = chunks
        .iter()
        .filter(|chunk| known.contains(&chunk.id))
        .count();
    let added = index.upsert(&chunks).await?;

    info!(
        source = %document.source,
        total = chunks.len(),
        existing,
        added,
        "ingested report"
    );

    Ok(IngestionReport {
        total_chunks: chunks.len(),
        existing,
        added,
    })
}

/// Full ingestion: load, convert, chunk, index. Returns `Ok(None)` when the
/// source file is missing; that is a reported condition, not a failure, and
/// nothing downstream is invoked.
pub async fn ingest_report<I: ChunkIndex>(
    path: &Path,
    index: &I,
    options: &ChunkingOptions,
) -> Result<Option<IngestionReport>, IngestError> {
    let Some(document) = load_report(path)? else {
        return Ok(None);
    };

    debug!(
        source = %document.source,
        checksum = %document.checksum,
        chars = document.content.len(),
        "converted report to markdown"
    );

    let report = ingest_document(&document, index, options).await?;
    Ok(Some(report))
}
