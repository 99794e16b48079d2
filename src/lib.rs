//! # pdf-flatten
//!
//! Flatten PDF documents so that form fields, annotations and redaction
//! marks become static page content that cannot be lifted off by reopening
//! or editing the file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 0. Probe    verify Ghostscript answers --version with a real version
//!  ├─ 1. Plan     derive output / temporary / scratch paths (pure)
//!  ├─ 2. Vector   gs -sDEVICE=pdfwrite -dPrinted=true, output verified non-empty
//!  ├─ 3. Commit   replace mode only: remove original, rename temporary
//!  ├─ 4. Raster   optional: gs png16m per page → magick/convert/gs → PDF
//!  └─ 5. Commit   swap the rasterised PDF in; raster failures are warnings
//! ```
//!
//! Engines run as child processes, one at a time, with their output streamed
//! to the terminal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_flatten::{flatten_path, FlattenConfig, RasterPass};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlattenConfig::builder()
//!         .replace(false)
//!         .raster_pass(RasterPass::Always)
//!         .build()?;
//!     let summary = flatten_path("scans/", &config).await?;
//!     for doc in &summary.documents {
//!         println!("{} -> {}", doc.input.display(), doc.output.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfflatten` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-flatten = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Engines
//!
//! | Engine | Required | Used for |
//! |--------|----------|----------|
//! | Ghostscript (`gs`, `gswin64c`) | yes | vector flatten, rasterisation, list-file assembly |
//! | ImageMagick (`magick`, `convert`) | no | preferred page-image assembly |
//!
//! `FLATTEN_GS_PATH` and `FLATTEN_MAGICK_PATH` override the `PATH` search.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod traverse;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AssemblerSelection, ErrorPolicy, FlattenConfig, FlattenConfigBuilder, RasterPass};
pub use document::{Document, FlattenRequest};
pub use engine::{EngineCommand, EngineJob, EngineOutput, EngineRunner, Engines, SystemRunner};
pub use error::{EngineError, FallbackError, FlattenError};
pub use flatten::{flatten_document, flatten_file};
pub use output::{DocumentFailure, DocumentReport, RasterOutcome, RunSummary};
pub use probe::{verify, ToolAvailability};
pub use progress::{FlattenProgressCallback, NoopProgressCallback, ProgressCallback};
pub use traverse::{discover, flatten_path, flatten_path_sync};
