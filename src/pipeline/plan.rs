//! Output planning: derive every path a request will touch.
//!
//! [`plan`] is pure: no filesystem access, no failure. Two modes:
//!
//! * **copy**: the vector flatten writes `<dir>/<name>_flattened.pdf`
//!   directly; the original is never opened for writing.
//! * **replace**: the vector flatten writes a temporary sibling named
//!   `<name>_temp_<random>.<ext>`; only after that artifact is verified is
//!   the original removed and the temporary renamed into its place.
//!
//! The raster pass writes to a `<name>_second_pass_<random>.<ext>` sibling
//! and keeps its page images in a scratch directory under `<dir>` whose name
//! starts with [`OutputPlan::scratch_prefix`].
//!
//! Temporaries are only named here. [`OutputPlan::reserve`] creates each one
//! exclusively when a stage needs it, so an existing file is never reused
//! or overwritten, whatever it is called.

use crate::document::Document;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tempfile::TempPath;

/// Name pattern of a temporary sibling file: `<prefix><random><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempName {
    pub prefix: OsString,
    pub suffix: OsString,
}

/// Paths derived for a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    /// Where the flattened document ends up.
    pub final_output: PathBuf,
    /// Temporary for the vector flatten. `None` in copy mode, where the
    /// vector flatten writes `final_output` directly.
    pub vector_temp: Option<TempName>,
    /// Temporary for the raster pass's reassembled document.
    pub raster_temp: TempName,
    /// Directory that holds every temporary and the scratch directory.
    pub work_dir: PathBuf,
    /// Name prefix of the scratch directory (a random suffix is appended).
    pub scratch_prefix: OsString,
}

impl OutputPlan {
    /// Does the vector output need to be committed over the original?
    pub fn needs_commit(&self) -> bool {
        self.vector_temp.is_some()
    }

    /// Create a new, empty, uniquely-named file for `name` in the work
    /// directory. The file is removed when the returned path is dropped.
    pub fn reserve(&self, name: &TempName) -> std::io::Result<TempPath> {
        let file = tempfile::Builder::new()
            .prefix(&name.prefix)
            .suffix(&name.suffix)
            .tempfile_in(&self.work_dir)?;
        Ok(file.into_temp_path())
    }
}

/// Compute the output plan for `doc`.
pub fn plan(doc: &Document, replace: bool) -> OutputPlan {
    let with_stem = |tail: &str| {
        let mut name = doc.stem().to_os_string();
        name.push(tail);
        name
    };
    let temp_name = |tail: &str| {
        let mut suffix = OsString::from(".");
        suffix.push(doc.extension());
        TempName {
            prefix: with_stem(tail),
            suffix,
        }
    };

    let mut flattened = with_stem("_flattened");
    flattened.push(".");
    flattened.push(OsStr::new("pdf"));

    let (final_output, vector_temp) = if replace {
        (doc.path().to_path_buf(), Some(temp_name("_temp_")))
    } else {
        (doc.dir().join(flattened), None)
    };

    let mut scratch_prefix = OsString::from("temp_png_");
    scratch_prefix.push(doc.stem());
    scratch_prefix.push("_");

    OutputPlan {
        final_output,
        vector_temp,
        raster_temp: temp_name("_second_pass_"),
        work_dir: doc.dir().to_path_buf(),
        scratch_prefix,
    }
}
