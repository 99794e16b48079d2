//! Result types reported for each document and for a whole run.

use crate::error::FallbackError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    /// The source document.
    pub input: PathBuf,
    /// Where the flattened document now lives (equal to `input` when replaced).
    pub output: PathBuf,
    /// Whether the original was overwritten.
    pub replaced: bool,
    /// Size of the final artifact in bytes.
    pub output_bytes: u64,
    /// Outcome of the raster pass.
    pub raster: RasterOutcome,
    /// Wall-clock time for the whole document.
    pub duration_ms: u64,
}

/// Outcome of the rasterise-and-reassemble pass for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RasterOutcome {
    /// The pass was not requested for this document.
    Disabled,
    /// Every page is now an embedded raster image.
    Applied { pages: usize, assembler: String },
    /// The pass failed; the vector-flattened result was kept.
    Failed { error: FallbackError },
}

impl RasterOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RasterOutcome::Failed { .. })
    }
}

/// A document that failed fatally under [`crate::ErrorPolicy::Continue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub input: PathBuf,
    pub error: String,
}

/// Aggregate result of flattening a file or a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The path the run was started on.
    pub root: PathBuf,
    /// Number of PDFs discovered.
    pub discovered: usize,
    /// Documents flattened successfully, in processing order.
    pub documents: Vec<DocumentReport>,
    /// Documents that failed (only populated under `ErrorPolicy::Continue`).
    pub failures: Vec<DocumentFailure>,
    pub total_duration_ms: u64,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.documents.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Documents whose raster pass failed (non-fatal).
    pub fn raster_warnings(&self) -> usize {
        self.documents.iter().filter(|d| d.raster.is_failed()).count()
    }
}
