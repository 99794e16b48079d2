//! Artifact verification and the remove-then-rename replacement commit.
//!
//! Engines can exit 0 while writing nothing, so every artifact is checked
//! for existence and a non-zero size before anything relies on it.
//!
//! Temporaries arrive as [`TempPath`] guards: whatever path through
//! [`commit`] is taken, the temporary is either moved into place, removed,
//! or deliberately kept after a failed move.

use crate::engine::Engines;
use crate::error::FlattenError;
use std::io::ErrorKind;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};

/// What is on disk at an expected output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Missing,
    Empty,
    /// A regular file of this many bytes.
    Ready(u64),
}

impl ArtifactState {
    pub fn size(self) -> Option<u64> {
        match self {
            ArtifactState::Ready(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ArtifactState::Missing => "output file was not created",
            ArtifactState::Empty => "output file is empty",
            ArtifactState::Ready(_) => "output file is ready",
        }
    }
}

/// Inspect `path` without following any assumptions about the engine's exit
/// status.
pub async fn inspect_artifact(path: &Path) -> ArtifactState {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => ArtifactState::Ready(meta.len()),
        Ok(meta) if meta.is_file() => ArtifactState::Empty,
        _ => ArtifactState::Missing,
    }
}

/// Remove a temporary file, ignoring "not found".
pub async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove temporary file {}: {}", path.display(), e),
    }
}

/// Move the verified artifact at `temp` over `target`.
///
/// 1. `temp` must exist and be non-empty, otherwise it is discarded and the
///    commit fails with `target` untouched.
/// 2. `target` is removed. If that fails, `temp` is discarded and `target`
///    is left as it was ([`FlattenError::ReplaceFailed`]).
/// 3. `temp` is moved to `target` through the engine runner. If that fails,
///    nothing exists at `target` and `temp` is kept so its content can be
///    recovered ([`FlattenError::CommitFailed`]). No rollback is attempted.
///
/// Returns the size of the committed file.
pub async fn commit(temp: TempPath, target: &Path, engines: &Engines) -> Result<u64, FlattenError> {
    let failed = |detail: String| FlattenError::FlattenFailed {
        path: target.to_path_buf(),
        detail,
    };

    let bytes = match inspect_artifact(&temp).await {
        ArtifactState::Ready(bytes) => bytes,
        state => {
            return Err(failed(format!(
                "replacement {}: {}",
                state.describe(),
                temp.display()
            )))
        }
    };

    // From here on the temporary is managed by hand: it must survive a
    // failed move.
    let temp = temp
        .keep()
        .map_err(|e| failed(format!("could not keep replacement: {}", e.error)))?;

    match tokio::fs::remove_file(target).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            discard(&temp).await;
            return Err(FlattenError::ReplaceFailed {
                path: target.to_path_buf(),
                source,
            });
        }
    }

    engines
        .runner
        .move_into_place(&temp, target)
        .await
        .map_err(|e| FlattenError::CommitFailed {
            path: target.to_path_buf(),
            temp: temp.clone(),
            reason: e.to_string(),
        })?;

    debug!("Committed {} -> {}", temp.display(), target.display());
    Ok(bytes)
}
