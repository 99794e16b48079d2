//! Vector flatten: one print-oriented Ghostscript pass.
//!
//! `-dPrinted=true` makes Ghostscript render annotations and form fields the
//! way they print, which burns them into the page content.

use crate::engine::{EngineJob, Engines};
use crate::error::FlattenError;
use crate::pipeline::commit::{discard, inspect_artifact, ArtifactState};
use std::path::Path;
use tracing::{debug, info};

/// Flatten `input` into `output`.
///
/// `output` is either a freshly reserved temporary or the copy-mode
/// `_flattened` path. On success exactly one non-empty file exists at
/// `output` and its size is returned. On any failure nothing is left at
/// `output`.
pub async fn run(input: &Path, output: &Path, engines: &Engines) -> Result<u64, FlattenError> {
    let failed = |detail: String| FlattenError::FlattenFailed {
        path: input.to_path_buf(),
        detail,
    };

    debug!("Vector flatten {} -> {}", input.display(), output.display());
    let result = engines
        .run_ghostscript(EngineJob::VectorFlatten {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        })
        .await;

    let run = match result {
        Ok(run) => run,
        Err(e) => {
            discard(output).await;
            return Err(failed(e.to_string()));
        }
    };
    if !run.success {
        discard(output).await;
        return Err(failed(format!("Ghostscript failed with {}", run.status_text())));
    }

    match inspect_artifact(output).await {
        ArtifactState::Ready(bytes) => {
            info!(bytes, "Vector flatten wrote {}", output.display());
            Ok(bytes)
        }
        state => {
            discard(output).await;
            Err(failed(format!(
                "Ghostscript reported success but the {}",
                state.describe()
            )))
        }
    }
}
