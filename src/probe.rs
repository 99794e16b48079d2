//! Tool probe: prove the flatten engine is genuinely installed before any
//! document is touched.
//!
//! A zero exit status is not enough. A shell alias or stub binary named `gs`
//! can exit 0 without being Ghostscript, so the probe insists on a real
//! version string in the `--version` output.

use crate::config::FlattenConfig;
use crate::engine::{EngineJob, Engines};
use crate::error::FlattenError;
use crate::pipeline::raster::choose_assembler;
use engine_probe::Platform;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Engines available for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolAvailability {
    /// The verified Ghostscript executable.
    pub ghostscript: PathBuf,
    /// Its reported version, e.g. `10.02.1`.
    pub ghostscript_version: String,
    /// Name of the preferred image assembler, if one was found.
    pub assembler: Option<String>,
    /// Path of the preferred image assembler, if one was found.
    pub assembler_path: Option<PathBuf>,
}

/// Resolve the engines from `config` and verify them.
pub async fn verify(config: &FlattenConfig) -> Result<ToolAvailability, FlattenError> {
    let engines = Engines::resolve(config)?;
    let mut tools = verify_engines(&engines).await?;

    if let Some(assembler) = choose_assembler(&config.assembler) {
        tools.assembler = Some(assembler.label().to_string());
        tools.assembler_path = Some(assembler.program().to_path_buf());
    }

    info!(
        ghostscript = %tools.ghostscript.display(),
        version = %tools.ghostscript_version,
        assembler = tools.assembler.as_deref().unwrap_or("ghostscript list-file"),
        "Engines verified"
    );
    Ok(tools)
}

/// Run `--version` on the resolved Ghostscript and check the answer.
pub async fn verify_engines(engines: &Engines) -> Result<ToolAvailability, FlattenError> {
    let unavailable = |detail: String| FlattenError::EngineUnavailable {
        engine: "Ghostscript".into(),
        detail,
        hint: Platform::current().remediation(),
    };

    let out = engines
        .run_ghostscript(EngineJob::Version)
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    debug!("'{} --version' said: {:?}", engines.ghostscript.display(), out.output);

    if !out.success {
        return Err(unavailable(format!(
            "'{} --version' failed with {}",
            engines.ghostscript.display(),
            out.status_text()
        )));
    }

    let version = engine_probe::parse_version(&out.output).ok_or_else(|| {
        unavailable(format!(
            "'{} --version' did not print a version number (got {:?})",
            engines.ghostscript.display(),
            out.output.trim()
        ))
    })?;

    Ok(ToolAvailability {
        ghostscript: engines.ghostscript.clone(),
        ghostscript_version: version,
        assembler: None,
        assembler_path: None,
    })
}
