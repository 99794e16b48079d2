//! Traversal driver: flatten one file or every PDF under a directory.
//!
//! Discovery runs to completion before the first document is touched, so
//! `_flattened.pdf` siblings written during the run are never picked up as
//! new input. Documents are processed one at a time in walk order (sorted by
//! file name within each directory).

use crate::config::{ErrorPolicy, FlattenConfig};
use crate::document::{is_pdf_path, Document, FlattenRequest};
use crate::engine::Engines;
use crate::error::FlattenError;
use crate::flatten::flatten_document;
use crate::output::{DocumentFailure, RunSummary};
use crate::pipeline::plan;
use crate::probe;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Collect the documents to flatten under `root`.
///
/// A file root must itself be a PDF. A directory root is walked
/// recursively and every non-directory entry ending in `.pdf` (any case) is
/// returned. An unreadable directory aborts discovery.
pub fn discover(root: &Path) -> Result<Vec<Document>, FlattenError> {
    let meta = std::fs::metadata(root).map_err(|e| FlattenError::InvalidTarget {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !meta.is_dir() {
        return Ok(vec![Document::open(root)?]);
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| {
            let path = source.path().unwrap_or(root).to_path_buf();
            FlattenError::Traversal { path, source }
        })?;
        if entry.file_type().is_dir() || !is_pdf_path(entry.path()) {
            continue;
        }
        debug!("Discovered {}", entry.path().display());
        documents.push(Document::open(entry.path())?);
    }
    Ok(documents)
}

/// Flatten `root`, a PDF file or a directory of PDFs.
///
/// Ghostscript is verified before anything else; if it is missing or not
/// genuine, no file is touched.
///
/// Under [`ErrorPolicy::Abort`] the first failed document ends the run with
/// its error. Under [`ErrorPolicy::Continue`] failures are collected in the
/// returned [`RunSummary`], except a failed commit that left a target path
/// without a file, which always ends the run.
pub async fn flatten_path(
    root: impl AsRef<Path>,
    config: &FlattenConfig,
) -> Result<RunSummary, FlattenError> {
    let start = Instant::now();
    let root = root.as_ref();

    // ── Gate: engines must be genuine ────────────────────────────────────
    let engines = Engines::resolve(config)?;
    let tools = probe::verify_engines(&engines).await?;
    info!(
        "Using Ghostscript {} at {}",
        tools.ghostscript_version,
        tools.ghostscript.display()
    );

    // ── Discover ─────────────────────────────────────────────────────────
    let documents = discover(root)?;
    let total = documents.len();
    info!("Found {} PDF file(s) under {}", total, root.display());

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut summary = RunSummary {
        root: root.to_path_buf(),
        discovered: total,
        ..Default::default()
    };

    // ── Flatten sequentially ─────────────────────────────────────────────
    for (i, document) in documents.into_iter().enumerate() {
        let index = i + 1;
        let request = FlattenRequest::new(document, config);
        let input = request.document.path().to_path_buf();

        if let Some(ref cb) = config.progress_callback {
            let target = plan::plan(&request.document, request.replace).final_output;
            cb.on_document_start(index, total, &input, &target);
        }

        match flatten_document(&request, &engines, config).await {
            Ok(report) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_complete(index, total, &report);
                }
                summary.documents.push(report);
            }
            Err(e) => {
                error!("[{}/{}] {}", index, total, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_error(index, total, &input, &e.to_string());
                }
                if config.error_policy == ErrorPolicy::Abort || e.is_destructive() {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_run_complete(index, summary.succeeded());
                    }
                    return Err(e);
                }
                summary.failures.push(DocumentFailure {
                    input,
                    error: e.to_string(),
                });
            }
        }
    }

    summary.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Run complete: {}/{} flattened, {} failed, {}ms total",
        summary.succeeded(),
        total,
        summary.failed(),
        summary.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, summary.succeeded());
    }

    Ok(summary)
}

/// Synchronous wrapper around [`flatten_path`].
///
/// Creates a temporary tokio runtime internally.
pub fn flatten_path_sync(
    root: impl AsRef<Path>,
    config: &FlattenConfig,
) -> Result<RunSummary, FlattenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlattenError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(flatten_path(root, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"%PDF-1.4").unwrap();
    }

    fn file_names(docs: &[Document]) -> Vec<String> {
        docs.iter()
            .map(|d| d.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn discovers_pdfs_recursively_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.pdf"));
        touch(&dir.path().join("a.PDF"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/c.pdf"));
        std::fs::create_dir(dir.path().join("folder.pdf")).unwrap();

        let docs = discover(dir.path()).unwrap();

        assert_eq!(file_names(&docs), ["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("only.pdf");
        touch(&file);
        let docs = discover(&file).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].path().ends_with("only.pdf"));
    }

    #[test]
    fn missing_or_non_pdf_root_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, FlattenError::InvalidTarget { .. }), "got: {err:?}");

        let txt = dir.path().join("readme.txt");
        std::fs::write(&txt, b"hi").unwrap();
        let err = discover(&txt).unwrap_err();
        assert!(matches!(err, FlattenError::InvalidTarget { .. }), "got: {err:?}");
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_aborts_discovery() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        touch(&locked.join("x.pdf"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to assert in that case.
        let readable = std::fs::read_dir(&locked).is_ok();
        let result = discover(dir.path());
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            assert!(matches!(result, Err(FlattenError::Traversal { .. })));
        }
    }
}
