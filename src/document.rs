//! Documents and per-document flatten requests.

use crate::config::FlattenConfig;
use crate::error::FlattenError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Is `path` named like a PDF (`.pdf`, any case)?
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// An existing PDF file eligible for flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    path: PathBuf,
    dir: PathBuf,
    stem: OsString,
    extension: OsString,
}

impl Document {
    /// Validate `path` and capture its parts.
    ///
    /// The file must exist, must not be a directory, and must carry a `.pdf`
    /// extension (case-insensitive).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlattenError> {
        let given = path.as_ref();
        let invalid = |reason: &str| FlattenError::InvalidTarget {
            path: given.to_path_buf(),
            reason: reason.to_string(),
        };

        let meta = std::fs::metadata(given).map_err(|e| invalid(&e.to_string()))?;
        if meta.is_dir() {
            return Err(invalid("is a directory, not a PDF file"));
        }
        if !is_pdf_path(given) {
            return Err(invalid("argument must be a PDF file or folder"));
        }

        let path = std::path::absolute(given).map_err(|e| invalid(&e.to_string()))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| invalid("has no parent directory"))?;
        let stem = path
            .file_stem()
            .map(OsStr::to_os_string)
            .ok_or_else(|| invalid("has no file name"))?;
        let extension = path
            .extension()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| OsString::from("pdf"));

        Ok(Self {
            path,
            dir,
            stem,
            extension,
        })
    }

    /// Absolute path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the document.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name without extension.
    pub fn stem(&self) -> &OsStr {
        &self.stem
    }

    /// Extension as written on disk (`pdf`, `PDF`, …), without the dot.
    pub fn extension(&self) -> &OsStr {
        &self.extension
    }
}

/// One unit of work: a document plus the policies that apply to it.
///
/// Built once per document and never mutated while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenRequest {
    pub document: Document,
    /// Overwrite the original instead of writing a `_flattened` sibling.
    pub replace: bool,
    /// Run the raster pass after a successful vector flatten.
    pub raster_pass: bool,
}

impl FlattenRequest {
    pub fn new(document: Document, config: &FlattenConfig) -> Self {
        Self {
            document,
            replace: config.replace,
            raster_pass: config.raster_pass.enabled(),
        }
    }
}
