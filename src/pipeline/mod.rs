//! Pipeline stages for flattening one PDF.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own with a fake engine runner.
//!
//! ## Data Flow
//!
//! ```text
//! plan ──▶ vector ──▶ commit ──▶ raster ──▶ commit
//! (paths)  (gs pdfwrite) (replace)  (png16m + assemble)  (swap in)
//! ```
//!
//! 1. [`plan`]: derive the output, temporary and scratch paths; pure
//! 2. [`vector`]: Ghostscript print-oriented flatten, output verified non-empty
//! 3. [`commit`]: remove-then-rename of a verified artifact over its target;
//!    only in replace mode, and again after a successful raster pass
//! 4. [`raster`]: when enabled, rasterise every page and reassemble with
//!    ImageMagick or Ghostscript; failures are non-fatal

pub mod commit;
pub mod plan;
pub mod raster;
pub mod vector;
