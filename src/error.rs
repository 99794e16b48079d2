//! Error types for the pdf-flatten library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FlattenError`]: **Fatal**: the document (or the whole run) cannot be
//!   flattened. Missing engine, bad target, engine failure, or a replacement
//!   that could not be committed. Returned as `Err(FlattenError)` from the
//!   top-level `flatten_*` functions.
//!
//! * [`FallbackError`]: **Non-fatal**: the raster pass failed, but the
//!   vector-flattened result is already on disk and stays there. Stored in
//!   [`crate::output::RasterOutcome::Failed`] and reported as a warning.
//!
//! [`EngineError`] covers the mechanics of running a subprocess and is folded
//! into one of the two above by the stage that ran it.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the pdf-flatten library.
#[derive(Debug, Error)]
pub enum FlattenError {
    // ── Startup errors ────────────────────────────────────────────────────
    /// The flatten engine is missing or is not a genuine installation.
    #[error("{engine} is not installed or not working properly: {detail}\n{hint}")]
    EngineUnavailable {
        engine: String,
        detail: String,
        hint: String,
    },

    /// The target does not exist, or is neither a PDF nor a directory.
    #[error("Invalid target '{path}': {reason}")]
    InvalidTarget { path: PathBuf, reason: String },

    /// Walking the target directory failed (e.g. unreadable subdirectory).
    #[error("Failed to walk '{path}': {source}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    // ── Per-document errors ───────────────────────────────────────────────
    /// The flatten engine failed or produced a missing/empty artifact.
    /// The original document is untouched.
    #[error("Failed to flatten '{path}': {detail}")]
    FlattenFailed { path: PathBuf, detail: String },

    /// The original could not be removed to make room for the replacement.
    /// The original is untouched; the replacement has been discarded.
    #[error("Could not remove original '{path}' for replacement: {source}")]
    ReplaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The original was removed but the verified replacement could not be
    /// renamed into place. Nothing exists at `path`; the flattened content
    /// is still at `temp`.
    #[error(
        "Removed '{path}' but could not move the flattened file into place: {reason}\n\
The flattened content is preserved at '{temp}'. Rename it manually."
    )]
    CommitFailed {
        path: PathBuf,
        temp: PathBuf,
        reason: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlattenError {
    /// `true` when the error may have left the target path without a file.
    pub fn is_destructive(&self) -> bool {
        matches!(self, FlattenError::CommitFailed { .. })
    }
}

/// A non-fatal failure of the raster pass.
///
/// The document keeps its vector-flattened content whenever one of these is
/// returned.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FallbackError {
    /// The scratch directory for page images could not be created.
    #[error("could not create scratch directory: {detail}")]
    ScratchDir { detail: String },

    /// The rasterizer failed.
    #[error("rasterisation failed: {detail}")]
    Rasterize { detail: String },

    /// The rasterizer ran but produced no page images.
    #[error("rasterizer produced no page images")]
    NoPageImages,

    /// The image list file for list-file assembly could not be written.
    #[error("could not write image list file: {detail}")]
    ListFile { detail: String },

    /// Every assembly engine in the chain failed.
    #[error("reassembling page images failed: {detail}")]
    Assemble { detail: String },

    /// Assembly reported success but the output is missing or empty.
    #[error("reassembled PDF is missing or empty")]
    EmptyAssembly,

    /// The vector-flattened file could not be removed to make room for the
    /// rasterised one.
    #[error("could not replace the vector-flattened file: {detail}")]
    Replace { detail: String },
}

/// Failure to run an external engine at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The program could not be started.
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The program ran longer than the configured timeout and was killed.
    #[error("'{program}' timed out after {limit:?} and was killed")]
    TimedOut { program: PathBuf, limit: Duration },

    /// Waiting for the program failed.
    #[error("lost track of '{program}': {source}")]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
