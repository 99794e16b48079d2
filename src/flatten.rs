//! Per-document flattening entry points.
//!
//! [`flatten_document`] runs the full pipeline for one request against
//! engines that have already been verified. [`flatten_file`] is the
//! convenience wrapper that opens, probes and flattens a single path.

use crate::config::FlattenConfig;
use crate::document::{Document, FlattenRequest};
use crate::engine::Engines;
use crate::error::{FallbackError, FlattenError};
use crate::output::{DocumentReport, RasterOutcome};
use crate::pipeline::{commit, plan, raster, vector};
use crate::probe;
use std::time::Instant;
use tempfile::TempPath;
use tracing::{info, warn};

/// Flatten a single PDF file.
///
/// Verifies Ghostscript first, like every top-level entry point.
///
/// # Errors
/// Returns `Err(FlattenError)` only for fatal errors:
/// - Ghostscript missing or not genuine
/// - `path` is not an existing PDF
/// - the vector flatten failed (the original is untouched)
/// - the original could not be replaced
///
/// A failed raster pass is not an error; see [`DocumentReport::raster`].
pub async fn flatten_file(
    path: impl AsRef<std::path::Path>,
    config: &FlattenConfig,
) -> Result<DocumentReport, FlattenError> {
    let document = Document::open(path)?;
    let engines = Engines::resolve(config)?;
    probe::verify_engines(&engines).await?;
    flatten_document(&FlattenRequest::new(document, config), &engines, config).await
}

/// Run the pipeline for one request.
///
/// In replace mode the original is removed only after the flattened
/// replacement has been verified, so a failing vector flatten leaves it
/// byte-for-byte unchanged.
pub async fn flatten_document(
    request: &FlattenRequest,
    engines: &Engines,
    config: &FlattenConfig,
) -> Result<DocumentReport, FlattenError> {
    let start = Instant::now();
    let input = request.document.path();

    // ── Step 1: Plan paths ───────────────────────────────────────────────
    let plan = plan::plan(&request.document, request.replace);
    info!(
        "Flattening: {} -> {}",
        input.display(),
        plan.final_output.display()
    );

    // ── Step 2: Vector flatten ───────────────────────────────────────────
    let mut output_bytes = match &plan.vector_temp {
        Some(name) => {
            let temp = plan.reserve(name).map_err(|e| FlattenError::FlattenFailed {
                path: input.to_path_buf(),
                detail: format!("could not create temporary file: {e}"),
            })?;
            vector::run(input, &temp, engines).await?;

            // ── Step 3: Commit over the original (replace mode) ──────────
            commit::commit(temp, &plan.final_output, engines).await?
        }
        None => {
            // The previous `_flattened` output is superseded; a stale copy
            // must not pass verification.
            commit::discard(&plan.final_output).await;
            vector::run(input, &plan.final_output, engines).await?
        }
    };
    info!("Successfully flattened: {}", plan.final_output.display());

    // ── Step 4: Raster pass ──────────────────────────────────────────────
    let raster = if request.raster_pass {
        match raster::run(&plan.final_output, &plan, engines, config).await {
            Ok(summary) => {
                match swap_in_raster(summary.output, &plan.final_output, engines).await? {
                    Ok(bytes) => {
                        output_bytes = bytes;
                        info!(
                            pages = summary.pages,
                            "Raster pass complete: {}",
                            plan.final_output.display()
                        );
                        RasterOutcome::Applied {
                            pages: summary.pages,
                            assembler: summary.assembler,
                        }
                    }
                    Err(error) => fallback_warning(request, config, error),
                }
            }
            Err(error) => fallback_warning(request, config, error),
        }
    } else {
        RasterOutcome::Disabled
    };

    Ok(DocumentReport {
        input: input.to_path_buf(),
        output: plan.final_output.clone(),
        replaced: request.replace,
        output_bytes,
        raster,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Commit the reassembled PDF over the vector-flattened one.
///
/// The outer error is fatal: the vector-flattened file was removed but the
/// raster result could not be moved into its place. The inner error means
/// the vector-flattened file is still there and the raster result was
/// discarded.
async fn swap_in_raster(
    raster_output: TempPath,
    target: &std::path::Path,
    engines: &Engines,
) -> Result<Result<u64, FallbackError>, FlattenError> {
    match commit::commit(raster_output, target, engines).await {
        Ok(bytes) => Ok(Ok(bytes)),
        Err(FlattenError::ReplaceFailed { source, .. }) => Ok(Err(FallbackError::Replace {
            detail: source.to_string(),
        })),
        Err(FlattenError::FlattenFailed { .. }) => Ok(Err(FallbackError::EmptyAssembly)),
        Err(fatal) => Err(fatal),
    }
}

fn fallback_warning(
    request: &FlattenRequest,
    config: &FlattenConfig,
    error: FallbackError,
) -> RasterOutcome {
    let input = request.document.path();
    warn!(
        "Raster pass failed for {}, keeping the vector-flattened result: {}",
        input.display(),
        error
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_fallback_warning(input, &error.to_string());
    }
    RasterOutcome::Failed { error }
}
